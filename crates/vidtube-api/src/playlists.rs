use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use uuid::Uuid;

use vidtube_types::api::{CreatePlaylistRequest, ListQuery, Paginated, UpdatePlaylistRequest};
use vidtube_types::models::Playlist;

use crate::convert;
use crate::error::{ApiError, ApiResult, AppJson, AppPath, AppQuery};
use crate::listing::{list_filter, paginate};
use crate::middleware::AuthUser;
use crate::ownership::authorize_owner;
use crate::response::ApiResponse;
use crate::state::{AppState, run_db};

async fn owned_playlist(state: &AppState, id: Uuid, caller: &AuthUser) -> ApiResult<()> {
    let id = id.to_string();
    let playlist = run_db(state, move |db| db.get_playlist(&id)).await?;
    authorize_owner(playlist, caller.id(), "Playlist")?;
    Ok(())
}

async fn fetch_playlist(state: &AppState, id: Uuid) -> ApiResult<Playlist> {
    let id = id.to_string();
    run_db(state, move |db| db.get_playlist(&id))
        .await?
        .map(convert::playlist)
        .ok_or_else(|| ApiError::not_found("Playlist not found"))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<CreatePlaylistRequest>,
) -> ApiResult<ApiResponse<Playlist>> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::missing_fields(&["name"]));
    }
    let description = req.description.trim().to_string();

    let id = Uuid::new_v4();
    let (pid, owner) = (id.to_string(), user.id().to_string());
    run_db(&state, move |db| db.insert_playlist(&pid, &owner, &name, &description)).await?;

    let playlist = fetch_playlist(&state, id).await?;
    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

/// All playlists, or one user's with `userId`.
pub async fn list_playlists(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ListQuery>,
) -> ApiResult<ApiResponse<Paginated<Playlist>>> {
    let filter = list_filter(query, state.default_page_size, false)?;
    let f = filter.clone();
    let page = run_db(&state, move |db| db.list_playlists(&f)).await?;
    Ok(ApiResponse::ok(
        paginate(page, &filter, convert::playlist),
        "Playlists fetched successfully",
    ))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    AppPath(playlist_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = fetch_playlist(&state, playlist_id).await?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

/// Either field may be omitted; a present name must not be blank.
pub async fn update_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(playlist_id): AppPath<Uuid>,
    body: Result<Json<UpdatePlaylistRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Playlist>> {
    owned_playlist(&state, playlist_id, &user).await?;

    let Json(req) = body?;
    let name = req.name.map(|n| n.trim().to_string());
    if name.as_deref() == Some("") {
        return Err(ApiError::validation("Name cannot be empty"));
    }
    let description = req.description.map(|d| d.trim().to_string());
    if name.is_none() && description.is_none() {
        return Err(ApiError::validation("Nothing to update"));
    }

    let id = playlist_id.to_string();
    run_db(&state, move |db| {
        db.update_playlist(&id, name.as_deref(), description.as_deref())
    })
    .await?;

    let playlist = fetch_playlist(&state, playlist_id).await?;
    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(playlist_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Option<()>>> {
    owned_playlist(&state, playlist_id, &user).await?;

    let id = playlist_id.to_string();
    if !run_db(&state, move |db| db.delete_playlist(&id)).await? {
        return Err(ApiError::not_found("Playlist not found"));
    }
    Ok(ApiResponse::ok(None, "Playlist deleted successfully"))
}

/// Appends; the same video may appear more than once.
pub async fn add_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath((video_id, playlist_id)): AppPath<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Playlist>> {
    owned_playlist(&state, playlist_id, &user).await?;

    let (vid, pid) = (video_id.to_string(), playlist_id.to_string());
    run_db(&state, move |db| {
        if db.get_video(&vid)?.is_none() {
            return Ok(false);
        }
        db.add_playlist_video(&pid, &vid)?;
        Ok(true)
    })
    .await?
    .then_some(())
    .ok_or_else(|| ApiError::not_found("Video not found"))?;

    let playlist = fetch_playlist(&state, playlist_id).await?;
    Ok(ApiResponse::ok(playlist, "Video added to playlist"))
}

/// Removes every occurrence of the video.
pub async fn remove_video(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath((video_id, playlist_id)): AppPath<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Playlist>> {
    owned_playlist(&state, playlist_id, &user).await?;

    let (vid, pid) = (video_id.to_string(), playlist_id.to_string());
    let removed = run_db(&state, move |db| db.remove_playlist_video(&pid, &vid)).await?;
    if removed == 0 {
        return Err(ApiError::not_found("Video is not in this playlist"));
    }

    let playlist = fetch_playlist(&state, playlist_id).await?;
    Ok(ApiResponse::ok(playlist, "Video removed from playlist"))
}
