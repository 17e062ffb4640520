use axum::{
    Extension, Json,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
};
use tracing::info;
use uuid::Uuid;

use vidtube_db::models::NewVideo;
use vidtube_media::MediaKind;
use vidtube_types::api::{ListQuery, Paginated, UpdateVideoRequest};
use vidtube_types::models::Video;

use crate::convert;
use crate::error::{ApiError, ApiResult, AppMultipart, AppPath, AppQuery};
use crate::listing::{list_filter, paginate};
use crate::middleware::{AuthUser, Viewer};
use crate::ownership::authorize_owner;
use crate::response::ApiResponse;
use crate::state::{AppState, run_db};
use crate::uploads::{MultipartForm, present, upload};

async fn owned_video(state: &AppState, id: Uuid, caller: &AuthUser) -> ApiResult<()> {
    let id = id.to_string();
    let video = run_db(state, move |db| db.get_video(&id)).await?;
    authorize_owner(video, caller.id(), "Video")?;
    Ok(())
}

async fn fetch_video(state: &AppState, id: String) -> ApiResult<Video> {
    run_db(state, move |db| db.get_video(&id))
        .await?
        .map(convert::video)
        .ok_or_else(|| ApiError::not_found("Video not found"))
}

pub async fn list_videos(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListQuery>,
) -> ApiResult<ApiResponse<Paginated<Video>>> {
    let filter = list_filter(query, state.default_page_size, false)?;
    let f = filter.clone();
    let page = run_db(&state, move |db| db.list_videos(&f)).await?;
    Ok(ApiResponse::ok(
        paginate(page, &filter, convert::video),
        "Videos retrieved successfully",
    ))
}

/// Multipart: `title`, `description`, `video`, `thumbnail`.
pub async fn publish_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppMultipart(multipart): AppMultipart,
) -> ApiResult<ApiResponse<Video>> {
    let mut form = MultipartForm::parse(multipart, &state.temp_dir).await?;

    let title = present(form.take_text("title"));
    let description = present(form.take_text("description"));
    let (Some(title), Some(description)) = (title, description) else {
        return Err(ApiError::validation("Title and description are required"));
    };

    let (Some(video_file), Some(thumbnail)) = (form.take_file("video"), form.take_file("thumbnail")) else {
        return Err(ApiError::validation("Video and thumbnail are required"));
    };

    let video = upload(&state, video_file, MediaKind::Video)
        .await
        .map_err(|e| ApiError::Internal(e.context("Video upload failed")))?;
    let thumbnail = upload(&state, thumbnail, MediaKind::Image)
        .await
        .map_err(|e| ApiError::Internal(e.context("Thumbnail upload failed")))?;

    let id = Uuid::new_v4().to_string();
    let owner_id = user.id().to_string();
    let video_id = id.clone();
    run_db(&state, move |db| {
        db.insert_video(&NewVideo {
            id: &video_id,
            owner_id: &owner_id,
            video_file: &video.url,
            thumbnail: &thumbnail.url,
            title: &title,
            description: &description,
        })
    })
    .await?;
    info!("User {} published video {}", user.0.username, id);

    let video = fetch_video(&state, id).await?;
    Ok(ApiResponse::created(video, "Video published successfully"))
}

/// Counts a view; signed-in viewers also get it in their watch history.
pub async fn get_video(
    State(state): State<AppState>,
    Viewer(viewer): Viewer,
    AppPath(video_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Video>> {
    let id = video_id.to_string();
    let viewer_id = viewer.map(|v| v.0.id);
    let row = run_db(&state, move |db| {
        if !db.increment_video_views(&id)? {
            return Ok(None);
        }
        if let Some(viewer_id) = viewer_id {
            db.record_watch(&viewer_id, &id)?;
        }
        db.get_video(&id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Video not found"))?;

    Ok(ApiResponse::ok(convert::video(row), "Video retrieved successfully"))
}

/// A field the client sent must not be blank; an absent one is left alone.
fn changed(value: Option<String>, name: &str) -> ApiResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Err(ApiError::validation(format!("{} cannot be empty", name))),
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

/// JSON `{title?, description?, thumbnail?}` or multipart with the same text
/// fields and an optional `thumbnail` file. The previous thumbnail stays in
/// the media store.
pub async fn update_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(video_id): AppPath<Uuid>,
    req: Request,
) -> ApiResult<ApiResponse<Video>> {
    owned_video(&state, video_id, &user).await?;

    let (title, description, thumbnail_url, thumbnail_file) = if is_multipart(&req) {
        let multipart = Multipart::from_request(req, &state).await?;
        let mut form = MultipartForm::parse(multipart, &state.temp_dir).await?;
        (
            changed(form.take_text("title"), "Title")?,
            changed(form.take_text("description"), "Description")?,
            None,
            form.take_file("thumbnail"),
        )
    } else {
        let Json(body) = Json::<UpdateVideoRequest>::from_request(req, &state).await?;
        (
            changed(body.title, "Title")?,
            changed(body.description, "Description")?,
            changed(body.thumbnail, "Thumbnail")?,
            None,
        )
    };

    let thumbnail = match thumbnail_file {
        Some(file) => Some(
            upload(&state, file, MediaKind::Image)
                .await
                .map_err(|e| ApiError::Internal(e.context("Thumbnail upload failed")))?
                .url,
        ),
        None => thumbnail_url,
    };

    if title.is_none() && description.is_none() && thumbnail.is_none() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let id = video_id.to_string();
    let updated = run_db(&state, move |db| {
        db.update_video(&id, title.as_deref(), description.as_deref(), thumbnail.as_deref())
    })
    .await?;
    if !updated {
        return Err(ApiError::not_found("Video not found"));
    }

    let video = fetch_video(&state, video_id.to_string()).await?;
    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

pub async fn delete_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(video_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Option<()>>> {
    owned_video(&state, video_id, &user).await?;

    let id = video_id.to_string();
    if !run_db(&state, move |db| db.delete_video(&id)).await? {
        return Err(ApiError::not_found("Video not found"));
    }
    info!("User {} deleted video {}", user.0.username, video_id);
    Ok(ApiResponse::ok(None, "Video deleted successfully"))
}

pub async fn toggle_publish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(video_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Video>> {
    owned_video(&state, video_id, &user).await?;

    let id = video_id.to_string();
    run_db(&state, move |db| db.toggle_video_published(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found"))?;

    let video = fetch_video(&state, video_id.to_string()).await?;
    Ok(ApiResponse::ok(video, "Video publish status updated successfully"))
}
