use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Multipart, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use vidtube_db::{ConstraintViolation, constraint_violation};

/// Whether 500 responses carry the underlying error chain. Off in production.
static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

pub fn expose_error_details(enabled: bool) {
    EXPOSE_DETAILS.store(enabled, Ordering::Relaxed);
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String, errors: Vec<String> },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    /// 400 naming every required field that was missing or blank.
    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::Validation {
            message: "All fields are required".into(),
            errors: fields.iter().map(|f| format!("{} is required", f)).collect(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    status_code: u16,
    message: String,
    success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let (errors, detail) = match self {
            Self::Validation { errors, .. } => (errors, None),
            Self::Internal(err) => {
                error!("Internal error: {:#}", err);
                let detail = EXPOSE_DETAILS
                    .load(Ordering::Relaxed)
                    .then(|| format!("{:#}", err));
                (Vec::new(), detail)
            }
            _ => (Vec::new(), None),
        };

        let body = ErrorEnvelope {
            status_code: status.as_u16(),
            message,
            success: false,
            errors,
            detail,
        };
        (status, Json(body)).into_response()
    }
}

/// Store and media errors arrive as `anyhow`; constraint failures keep their meaning.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match constraint_violation(&err) {
            Some(ConstraintViolation::Unique) => Self::Conflict("Resource already exists".into()),
            Some(ConstraintViolation::Invalid) => {
                warn!("Store rejected a write: {:#}", err);
                Self::validation("Invalid field value")
            }
            None => Self::Internal(err),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("spawn_blocking join error: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::validation(err.body_text())
    }
}

// Extractors whose rejections come back inside the error envelope.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

pub struct AppMultipart(pub Multipart);

impl<S: Send + Sync> FromRequest<S> for AppMultipart {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Multipart::from_request(req, state).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn typed_errors_keep_their_status() {
        let (status, body) = body_json(ApiError::forbidden("Not the owner")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["statusCode"], 403);
        assert_eq!(body["message"], "Not the owner");
        assert_eq!(body["success"], false);
        assert!(body.get("errors").is_none());
    }

    #[tokio::test]
    async fn missing_fields_are_listed() {
        let (status, body) = body_json(ApiError::missing_fields(&["email", "password"])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0], "email is required");
        assert_eq!(body["errors"][1], "password is required");
    }

    #[tokio::test]
    async fn untyped_errors_become_internal() {
        let err: ApiError = anyhow::anyhow!("disk on fire").into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["success"], false);
    }

    // The only test that touches the process-wide flag.
    #[tokio::test]
    async fn detail_follows_the_diagnostics_flag() {
        expose_error_details(true);
        let (_, body) = body_json(anyhow::anyhow!("boom").into()).await;
        assert_eq!(body["detail"], "boom");
        assert_eq!(body["message"], "Internal server error");

        expose_error_details(false);
        let (_, body) = body_json(anyhow::anyhow!("boom").into()).await;
        assert!(body.get("detail").is_none());
    }

    fn db_with_user() -> vidtube_db::Database {
        let db = vidtube_db::Database::open_in_memory().unwrap();
        db.create_user(&vidtube_db::models::NewUser {
            id: "u1",
            username: "alice",
            email: "alice@example.com",
            full_name: "Alice",
            avatar: "a",
            cover_image: None,
            password_hash: "h",
        })
        .unwrap();
        db
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let db = db_with_user();
        let err: ApiError = db
            .create_user(&vidtube_db::models::NewUser {
                id: "u2",
                username: "alice",
                email: "other@example.com",
                full_name: "Alice",
                avatar: "a",
                cover_image: None,
                password_hash: "h",
            })
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn check_violations_hide_the_store_message() {
        let db = db_with_user();
        let err: ApiError = db.insert_tweet("t1", "u1", "   ").unwrap_err().into();
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid field value");
        assert!(!body.to_string().contains("constraint"));
    }

    #[tokio::test]
    async fn method_not_allowed_is_enveloped() {
        let (status, body) = body_json(ApiError::MethodNotAllowed).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["statusCode"], 405);
        assert_eq!(body["success"], false);
    }
}
