use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::types::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequestWithHint(String, String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request_with_hint(msg: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::BadRequestWithHint(msg.into(), hint.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Busy => ApiError::Conflict(e.to_string()),
            PipelineError::Feed(err) => {
                tracing::error!("Feed failure: {}", err);
                ApiError::Upstream("Failed to fetch messages.".into())
            }
            PipelineError::Reply(err) => ApiError::Upstream(err.to_string()),
            PipelineError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, hint) = match &self {
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                msg.clone(),
                Some("Another processing pass is running, try again later"),
            ),
            ApiError::BadRequestWithHint(msg, hint) => {
                (StatusCode::BAD_REQUEST, msg.clone(), Some(hint.as_str()))
            }
            ApiError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                msg.clone(),
                Some("The social platform could not be reached"),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
                Some("Please try again later or contact support"),
            ),
        };

        let body = if let Some(h) = hint {
            ApiResponse::<()>::error_with_hint(message, h)
        } else {
            ApiResponse::<()>::error(message)
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Storage layer failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ApiError::bad_request_with_hint("x", "y"),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        let err: ApiError = PipelineError::Busy.into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
