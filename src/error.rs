use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::feed::{FeedError, IngestError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Feed(#[from] FeedError),
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Decode(e) => AppError::BadRequest(e.to_string()),
            closed @ IngestError::Closed => AppError::Unavailable(closed.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rebuild rate limit exceeded".to_string(),
            ),
            AppError::Unavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone())
            }
            AppError::Feed(FeedError::Following(e)) => {
                tracing::error!("Relationship lookup failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Relationship service unavailable".to_string(),
                )
            }
            AppError::Feed(e) => {
                tracing::error!("Feed error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StoreError;
    use crate::feed::RepositoryError;
    use crate::gateway::GatewayError;

    fn response_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn rate_limited_returns_429() {
        assert_eq!(
            response_status(AppError::TooManyRequests),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn following_failure_returns_502() {
        let err = AppError::from(FeedError::Following(GatewayError::Status {
            status: 503,
            body: String::new(),
        }));
        assert_eq!(response_status(err), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn store_failure_returns_500() {
        let err = AppError::from(FeedError::Repository(RepositoryError::Store(
            StoreError::WrongType("k".into()),
        )));
        assert_eq!(response_status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ingest_errors_map_to_400_and_503() {
        let decode = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            response_status(IngestError::Decode(decode).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(IngestError::Closed.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
