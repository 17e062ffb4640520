use axum::{Extension, extract::State};
use tracing::{info, warn};
use uuid::Uuid;

use vidtube_media::MediaKind;
use vidtube_types::api::{ChangePasswordRequest, SubscriptionStatus, UpdateAccountRequest};
use vidtube_types::models::{ChannelProfile, User, Video};

use crate::auth::{hash_password, verify_password};
use crate::convert;
use crate::error::{ApiError, ApiResult, AppJson, AppMultipart, AppPath};
use crate::middleware::{AuthUser, Viewer};
use crate::response::ApiResponse;
use crate::state::{AppState, run_db};
use crate::uploads::{MultipartForm, present, upload};

pub async fn current_user(Extension(user): Extension<AuthUser>) -> ApiResponse<User> {
    ApiResponse::ok(convert::user(user.0), "Current user fetched successfully")
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let missing: Vec<&str> = [
        ("oldPassword", req.old_password.is_empty()),
        ("newPassword", req.new_password.trim().is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, blank)| blank.then_some(name))
    .collect();
    if !missing.is_empty() {
        return Err(ApiError::missing_fields(&missing));
    }

    if !verify_password(req.old_password, user.0.password.clone()).await? {
        return Err(ApiError::unauthorized("Invalid old password"));
    }

    let hash = hash_password(req.new_password).await?;
    let id = user.id().to_string();
    run_db(&state, move |db| db.update_password(&id, &hash)).await?;
    info!("User {} changed password", user.0.username);

    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<UpdateAccountRequest>,
) -> ApiResult<ApiResponse<User>> {
    let full_name = present(Some(req.full_name));
    let email = present(Some(req.email));
    let (Some(full_name), Some(email)) = (full_name, email) else {
        return Err(ApiError::validation("Full name and email are required"));
    };
    let email = email.to_lowercase();

    let id = user.id().to_string();
    let updated = run_db(&state, move |db| {
        db.update_account(&id, &full_name, &email)?;
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::ok(
        convert::user(updated),
        "Account details updated successfully",
    ))
}

#[derive(Clone, Copy)]
enum ProfileImage {
    Avatar,
    Cover,
}

impl ProfileImage {
    fn field(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "avatar",
            ProfileImage::Cover => "coverImage",
        }
    }
}

/// The old asset is left in the media store.
async fn replace_image(
    state: AppState,
    user: AuthUser,
    multipart: axum::extract::Multipart,
    which: ProfileImage,
) -> ApiResult<User> {
    let mut form = MultipartForm::parse(multipart, &state.temp_dir).await?;
    let file = form
        .take_file(which.field())
        .ok_or_else(|| ApiError::validation(format!("{} file is missing", which.field())))?;

    let media = upload(&state, file, MediaKind::Image).await.map_err(|e| {
        warn!("{} upload failed: {:#}", which.field(), e);
        ApiError::validation(format!("Error while uploading {}", which.field()))
    })?;

    let id = user.id().to_string();
    let updated = run_db(&state, move |db| {
        match which {
            ProfileImage::Avatar => db.update_avatar(&id, &media.url)?,
            ProfileImage::Cover => db.update_cover_image(&id, &media.url)?,
        };
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(convert::user(updated))
}

pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppMultipart(multipart): AppMultipart,
) -> ApiResult<ApiResponse<User>> {
    let user = replace_image(state, user, multipart, ProfileImage::Avatar).await?;
    Ok(ApiResponse::ok(user, "Avatar image updated successfully"))
}

pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppMultipart(multipart): AppMultipart,
) -> ApiResult<ApiResponse<User>> {
    let user = replace_image(state, user, multipart, ProfileImage::Cover).await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}

pub async fn channel_profile(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    AppPath(username): AppPath<String>,
) -> ApiResult<ApiResponse<ChannelProfile>> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::validation("Username is missing"));
    }

    let viewer_id = viewer.map(|v| v.0.id);
    let channel = run_db(&state, move |db| {
        db.get_channel_profile(&username, viewer_id.as_deref())
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;

    Ok(ApiResponse::ok(
        convert::channel(channel),
        "User channel fetched successfully",
    ))
}

pub async fn watch_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<ApiResponse<Vec<Video>>> {
    let id = user.id().to_string();
    let rows = run_db(&state, move |db| db.get_watch_history(&id)).await?;
    Ok(ApiResponse::ok(
        rows.into_iter().map(convert::video).collect(),
        "Watch history fetched successfully",
    ))
}

pub async fn toggle_subscription(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(channel_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<SubscriptionStatus>> {
    let channel = channel_id.to_string();
    if channel == user.id() {
        return Err(ApiError::validation("You cannot subscribe to your own channel"));
    }

    let subscriber = user.id().to_string();
    let subscribed = run_db(&state, move |db| {
        if db.get_user_by_id(&channel)?.is_none() {
            return Ok(None);
        }
        db.toggle_subscription(&subscriber, &channel).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Channel not found"))?;

    let message = if subscribed {
        "Subscribed successfully"
    } else {
        "Unsubscribed successfully"
    };
    Ok(ApiResponse::ok(
        SubscriptionStatus {
            channel_id,
            subscribed,
        },
        message,
    ))
}
