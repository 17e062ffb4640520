use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use uuid::Uuid;

use vidtube_types::api::{ListQuery, Paginated, TweetRequest};
use vidtube_types::models::Tweet;

use crate::convert;
use crate::error::{ApiError, ApiResult, AppJson, AppPath, AppQuery};
use crate::listing::{list_filter, paginate};
use crate::middleware::AuthUser;
use crate::ownership::authorize_owner;
use crate::response::ApiResponse;
use crate::state::{AppState, run_db};

fn content(req: TweetRequest) -> ApiResult<String> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Content is required"));
    }
    Ok(content.to_string())
}

async fn owned_tweet(state: &AppState, id: Uuid, caller: &AuthUser) -> ApiResult<()> {
    let id = id.to_string();
    let tweet = run_db(state, move |db| db.get_tweet(&id)).await?;
    authorize_owner(tweet, caller.id(), "Tweet")?;
    Ok(())
}

pub async fn create_tweet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<TweetRequest>,
) -> ApiResult<ApiResponse<Tweet>> {
    let content = content(req)?;
    let id = Uuid::new_v4().to_string();
    let owner = user.id().to_string();

    let tweet = run_db(&state, move |db| {
        db.insert_tweet(&id, &owner, &content)?;
        db.get_tweet(&id)
    })
    .await?
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("tweet vanished after insert")))?;

    Ok(ApiResponse::created(convert::tweet(tweet), "Tweet created successfully"))
}

/// A user's tweets, newest first unless `sortType` says otherwise. An
/// unknown user simply has none.
pub async fn user_tweets(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<ListQuery>,
) -> ApiResult<ApiResponse<Paginated<Tweet>>> {
    let mut filter = list_filter(query, state.default_page_size, true)?;
    filter.owner_id = Some(user_id.to_string());

    let f = filter.clone();
    let page = run_db(&state, move |db| db.list_tweets(&f)).await?;

    Ok(ApiResponse::ok(
        paginate(page, &filter, convert::tweet),
        "Tweets fetched successfully",
    ))
}

pub async fn update_tweet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(tweet_id): AppPath<Uuid>,
    body: Result<Json<TweetRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<Tweet>> {
    owned_tweet(&state, tweet_id, &user).await?;

    let Json(req) = body?;
    let content = content(req)?;

    let id = tweet_id.to_string();
    let tweet = run_db(&state, move |db| {
        db.update_tweet(&id, &content)?;
        db.get_tweet(&id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Tweet not found"))?;

    Ok(ApiResponse::ok(convert::tweet(tweet), "Tweet updated successfully"))
}

pub async fn delete_tweet(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppPath(tweet_id): AppPath<Uuid>,
) -> ApiResult<ApiResponse<Option<()>>> {
    owned_tweet(&state, tweet_id, &user).await?;

    let id = tweet_id.to_string();
    if !run_db(&state, move |db| db.delete_tweet(&id)).await? {
        return Err(ApiError::not_found("Tweet not found"));
    }
    Ok(ApiResponse::ok(None, "Tweet deleted successfully"))
}
