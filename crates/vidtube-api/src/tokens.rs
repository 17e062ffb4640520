use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;
use uuid::Uuid;

use vidtube_db::models::UserRow;
use vidtube_types::api::{AccessClaims, RefreshClaims, TokenPair};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, run_db};

/// Signs and verifies the two token kinds. Each kind has its own secret, so
/// an access token is never accepted as a refresh token and vice versa.
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

fn now_secs() -> usize {
    chrono::Utc::now().timestamp() as usize
}

impl TokenService {
    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn sign_access(&self, user: &UserRow) -> anyhow::Result<String> {
        let iat = now_secs();
        let claims = AccessClaims {
            sub: convert::uuid(&user.id),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            iat,
            exp: iat + self.access_ttl.as_secs() as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )?)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        let iat = now_secs();
        let claims = RefreshClaims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat,
            exp: iat + self.refresh_ttl.as_secs() as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )?)
    }

    /// Signature and expiry check only; the caller decides whether the user
    /// still exists.
    pub fn verify_access(&self, token: &str) -> ApiResult<AccessClaims> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected access token: {}", e);
            ApiError::unauthorized("Invalid access token")
        })
    }

    pub fn verify_refresh(&self, token: &str) -> ApiResult<RefreshClaims> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected refresh token: {}", e);
            ApiError::unauthorized("Invalid refresh token")
        })
    }
}

/// Mint an access/refresh pair and store the refresh token on the user,
/// replacing whatever was there.
pub async fn issue_token_pair(state: &AppState, user: &UserRow) -> ApiResult<TokenPair> {
    let access_token = state.tokens.sign_access(user)?;
    let refresh_token = state.tokens.sign_refresh(convert::uuid(&user.id))?;

    let id = user.id.clone();
    let stored = refresh_token.clone();
    let updated = run_db(state, move |db| db.set_refresh_token(&id, Some(&stored))).await?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Exchange a refresh token for a new pair. The presented token must be the
/// one currently stored on the user; anything older has been rotated out.
pub async fn rotate(state: &AppState, presented: &str) -> ApiResult<(UserRow, TokenPair)> {
    let claims = state.tokens.verify_refresh(presented)?;

    let id = claims.sub.to_string();
    let user = run_db(state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(presented) {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let pair = issue_token_pair(state, &user).await?;
    Ok((user, pair))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            "access-secret",
            "refresh-secret",
            Duration::from_secs(60),
            Duration::from_secs(600),
        )
    }

    fn user() -> UserRow {
        UserRow {
            id: Uuid::new_v4().to_string(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            avatar: "http://x/a.png".into(),
            cover_image: None,
            password: "hash".into(),
            refresh_token: None,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn access_token_carries_identity() {
        let svc = service();
        let user = user();
        let token = svc.sign_access(&user).unwrap();
        let claims = svc.verify_access(&token).unwrap();
        assert_eq!(claims.sub.to_string(), user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let svc = service();
        let user = user();
        let access = svc.sign_access(&user).unwrap();
        let refresh = svc.sign_refresh(convert::uuid(&user.id)).unwrap();
        assert!(svc.verify_refresh(&access).is_err());
        assert!(svc.verify_access(&refresh).is_err());
    }

    #[test]
    fn refresh_tokens_differ_within_one_second() {
        let svc = service();
        let id = Uuid::new_v4();
        assert_ne!(svc.sign_refresh(id).unwrap(), svc.sign_refresh(id).unwrap());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let svc = service();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            iat: 1_000,
            exp: 2_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();
        assert!(matches!(svc.verify_access(&token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn garbage_is_unauthorized() {
        assert!(matches!(
            service().verify_access("not.a.jwt"),
            Err(ApiError::Unauthorized(_))
        ));
    }
}
