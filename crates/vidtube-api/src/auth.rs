use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, body::Bytes, extract::State};
use axum_extra::extract::{CookieJar, cookie::Cookie};
use tracing::{info, warn};
use uuid::Uuid;

use vidtube_db::models::{NewUser, UserRow};
use vidtube_media::{MediaKind, UploadedMedia};
use vidtube_types::api::{LoginRequest, LoginResponse, RefreshTokenRequest, TokenPair};
use vidtube_types::models::User;

use crate::convert;
use crate::error::{ApiError, ApiResult, AppJson, AppMultipart};
use crate::middleware::{ACCESS_COOKIE, AuthUser, REFRESH_COOKIE};
use crate::response::ApiResponse;
use crate::state::{AppState, run_db};
use crate::tokens::{issue_token_pair, rotate};
use crate::uploads::{MultipartForm, discard, present, upload};

// -- Passwords --

pub(crate) async fn hash_password(password: String) -> ApiResult<String> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
    })
    .await?
    .map_err(|e| anyhow::anyhow!("hashing password: {}", e))?;
    Ok(hash)
}

/// False on mismatch. A stored hash that does not parse is an internal error.
pub(crate) async fn verify_password(password: String, hash: String) -> ApiResult<bool> {
    let ok = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)?;
        Ok::<_, argon2::password_hash::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await?
    .map_err(|e| anyhow::anyhow!("parsing stored password hash: {}", e))?;
    Ok(ok)
}

// -- Cookies --

fn with_auth_cookies(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    let cookie = |name: &'static str, value: &str| {
        Cookie::build((name, value.to_string()))
            .http_only(true)
            .secure(secure)
            .path("/")
    };
    jar.add(cookie(ACCESS_COOKIE, &pair.access_token))
        .add(cookie(REFRESH_COOKIE, &pair.refresh_token))
}

fn without_auth_cookies(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

// -- Handlers --

/// Multipart registration. Text fields plus a required `avatar` and an
/// optional `coverImage`.
pub async fn register(
    State(state): State<AppState>,
    AppMultipart(multipart): AppMultipart,
) -> ApiResult<ApiResponse<User>> {
    let mut form = MultipartForm::parse(multipart, &state.temp_dir).await?;

    let full_name = present(form.take_text("fullName"));
    let email = present(form.take_text("email"));
    let username = present(form.take_text("username"));
    let password = form.take_text("password").filter(|p| !p.trim().is_empty());

    let (Some(full_name), Some(email), Some(username), Some(password)) =
        (&full_name, &email, &username, &password)
    else {
        let missing: Vec<&str> = [
            ("fullName", full_name.is_none()),
            ("email", email.is_none()),
            ("username", username.is_none()),
            ("password", password.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        return Err(ApiError::missing_fields(&missing));
    };

    let email = email.to_lowercase();
    let username = username.to_lowercase();

    let (e, u) = (email.clone(), username.clone());
    if run_db(&state, move |db| db.find_user_by_email_or_username(&e, &u))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar_file = form
        .take_file("avatar")
        .ok_or_else(|| ApiError::validation("Avatar file is required"))?;
    let avatar = upload(&state, avatar_file, MediaKind::Image)
        .await
        .map_err(|e| {
            warn!("Avatar upload failed: {:#}", e);
            ApiError::validation("Failed to upload avatar")
        })?;

    let cover = match form.take_file("coverImage") {
        Some(file) => match upload(&state, file, MediaKind::Image).await {
            Ok(media) => Some(media),
            Err(e) => {
                warn!("Cover image upload failed, continuing without: {:#}", e);
                None
            }
        },
        None => None,
    };
    drop(form);

    let created = create_account(
        &state,
        full_name.clone(),
        email,
        username,
        password.clone(),
        &avatar,
        cover.as_ref(),
    )
    .await;

    match created {
        Ok(user) => {
            info!("Registered user {} ({})", user.username, user.id);
            Ok(ApiResponse::created(
                convert::user(user),
                "User registered successfully",
            ))
        }
        Err(err) => {
            warn!("Registration failed after upload, removing media: {}", err);
            discard(&state, &avatar).await;
            if let Some(cover) = &cover {
                discard(&state, cover).await;
            }
            Err(err)
        }
    }
}

async fn create_account(
    state: &AppState,
    full_name: String,
    email: String,
    username: String,
    password: String,
    avatar: &UploadedMedia,
    cover: Option<&UploadedMedia>,
) -> ApiResult<UserRow> {
    let password_hash = hash_password(password).await?;
    let id = Uuid::new_v4().to_string();
    let avatar_url = avatar.url.clone();
    let cover_url = cover.map(|c| c.url.clone());

    let user = run_db(state, move |db| {
        db.create_user(&NewUser {
            id: &id,
            username: &username,
            email: &email,
            full_name: &full_name,
            avatar: &avatar_url,
            cover_image: cover_url.as_deref(),
            password_hash: &password_hash,
        })?;
        db.get_user_by_id(&id)
    })
    .await?;

    user.ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after insert")))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> ApiResult<(CookieJar, ApiResponse<LoginResponse>)> {
    let email = present(req.email);
    let username = present(req.username);
    let (Some(email), Some(username)) = (email, username) else {
        return Err(ApiError::validation("Username and email are required"));
    };
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::missing_fields(&["password"]))?;

    let (e, u) = (email.to_lowercase(), username.to_lowercase());
    let user = run_db(&state, move |db| db.find_user_by_email_or_username(&e, &u))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid user credentials"))?;

    if !verify_password(password, user.password.clone()).await? {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let pair = issue_token_pair(&state, &user).await?;
    info!("User {} logged in", user.username);

    let jar = with_auth_cookies(jar, &pair, state.secure_cookies);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user: convert::user(user),
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, ApiResponse<serde_json::Value>)> {
    let id = user.id().to_string();
    run_db(&state, move |db| db.set_refresh_token(&id, None)).await?;
    info!("User {} logged out", user.0.username);

    Ok((
        without_auth_cookies(jar),
        ApiResponse::ok(serde_json::json!({}), "User logged out successfully"),
    ))
}

/// Rotate the session. The refresh token comes from the cookie or, for
/// clients without cookies, a JSON body.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<(CookieJar, ApiResponse<TokenPair>)> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshTokenRequest>(&body)
            .map_err(|e| ApiError::validation(format!("Invalid request body: {}", e)))?
            .refresh_token
    };

    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(from_body)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let (_, pair) = rotate(&state, &presented).await?;
    let jar = with_auth_cookies(jar, &pair, state.secure_cookies);
    Ok((jar, ApiResponse::ok(pair, "Access token refreshed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_password_verifies() {
        let hash = hash_password("correct horse".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn salts_differ_between_hashes() {
        let a = hash_password("same".into()).await.unwrap();
        let b = hash_password("same".into()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn corrupt_stored_hash_is_internal() {
        let err = verify_password("x".into(), "not-a-hash".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
