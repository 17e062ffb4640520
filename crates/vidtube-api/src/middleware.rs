use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};

use vidtube_db::models::UserRow;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_db};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// The caller resolved from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRow);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

/// Cookie first, then `Authorization: Bearer`.
fn access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

async fn resolve(state: &AppState, token: &str) -> ApiResult<AuthUser> {
    let claims = state.tokens.verify_access(token)?;
    let id = claims.sub.to_string();
    let user = run_db(state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;
    Ok(AuthUser(user))
}

/// Reject the request unless it carries a valid access token for an
/// existing user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = access_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
    let user = resolve(&state, &token).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Attach the caller when the token checks out; otherwise carry on anonymously.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = access_token(req.headers()) {
        match resolve(&state, &token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(ApiError::Internal(e)) => {
                tracing::error!("Optional auth lookup failed: {:#}", e);
            }
            Err(_) => {}
        }
    }
    next.run(req).await
}

/// The caller on routes behind [`optional_auth`], if any.
pub struct Viewer(pub Option<AuthUser>);

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(parts.extensions.get::<AuthUser>().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header};

    #[test]
    fn cookie_wins_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=from-cookie"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(access_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_is_used_without_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(access_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn no_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(access_token(&headers), None);
    }
}
