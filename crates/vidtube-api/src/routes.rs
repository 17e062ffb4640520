use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
};

use crate::error::ApiError;
use crate::middleware::{optional_auth, require_auth};
use crate::response::ApiResponse;
use crate::state::AppState;
use crate::{auth, playlists, tweets, users, videos};

/// Every API route, mounted under `/api/v1`.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/users/register", post(auth::register))
        .route("/users/login", post(auth::login))
        .route("/users/refresh-token", post(auth::refresh_token))
        .route("/videos/allvideos", get(videos::list_videos))
        .route("/tweets/{id}", get(tweets::user_tweets))
        .route("/playlists", get(playlists::list_playlists))
        .route("/playlists/{playlist_id}", get(playlists::get_playlist));

    let viewer_aware = Router::new()
        .route("/users/channel/{username}", get(users::channel_profile))
        .route("/videos/{video_id}", get(videos::get_video))
        .route_layer(from_fn_with_state(state.clone(), optional_auth));

    let protected = Router::new()
        .route("/users/logout", post(auth::logout))
        .route("/users/change-password", post(users::change_password))
        .route("/users/current-user", get(users::current_user))
        .route("/users/update-account", patch(users::update_account))
        .route("/users/avatar", patch(users::update_avatar))
        .route("/users/cover-image", patch(users::update_cover_image))
        .route("/users/history", get(users::watch_history))
        .route("/subscriptions/c/{channel_id}", post(users::toggle_subscription))
        .route("/tweets", post(tweets::create_tweet))
        .route("/tweets/{id}", put(tweets::update_tweet).delete(tweets::delete_tweet))
        .route("/videos/publish", post(videos::publish_video))
        .route("/videos/update/{video_id}", put(videos::update_video))
        .route("/videos/delete/{video_id}", delete(videos::delete_video))
        .route("/videos/toggle/publish/{video_id}", patch(videos::toggle_publish))
        .route("/playlists", post(playlists::create_playlist))
        .route(
            "/playlists/{playlist_id}",
            patch(playlists::update_playlist).delete(playlists::delete_playlist),
        )
        .route("/playlists/add/{video_id}/{playlist_id}", patch(playlists::add_video))
        .route("/playlists/remove/{video_id}/{playlist_id}", patch(playlists::remove_video))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = Router::new()
        .merge(public)
        .merge(viewer_aware)
        .merge(protected)
        .method_not_allowed_fallback(method_not_allowed);

    Router::new()
        .nest("/api/v1", api)
        .fallback(route_not_found)
        .with_state(state)
}

async fn healthcheck() -> ApiResponse<&'static str> {
    ApiResponse::ok("OK", "Health check passed")
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
