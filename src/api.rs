use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::*;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & stats
        .route("/health", get(health))
        .route("/statistics", get(statistics))
        // Registry
        .route("/parties", get(parties))
        .route("/blocked", get(blocked))
        // Processing passes
        .route("/process-messages", get(process_messages).post(process_messages))
        .route("/process-todo", get(process_todo).post(process_todo))
        // Single messages
        .route("/message", get(get_message))
        .route("/todo", post(add_todo))
        .with_state(state)
}

// ============ Validation ============

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

/// Validate the `id` query argument
pub fn validate_message_id(id: Option<&str>) -> Result<MessageId, &'static str> {
    let id = id.map(str::trim).filter(|s| !s.is_empty());
    let Some(id) = id else {
        return Err("Missing id argument in the request");
    };
    if !id.chars().all(|c| c.is_ascii_digit()) {
        return Err("id argument must contain digits only");
    }
    id.parse().map_err(|_| "id argument is out of range")
}

fn message_id(query: &IdQuery) -> ApiResult<MessageId> {
    validate_message_id(query.id.as_deref()).map_err(|e| {
        ApiError::bad_request_with_hint(e, "Pass the numeric message id, e.g. ?id=1234567890")
    })
}

// ============ Health Endpoints ============

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.health().await))
}

async fn statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.statistics().await))
}

// ============ Registry Endpoints ============

async fn parties(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.parties().await))
}

async fn blocked(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(state.blocked().await))
}

// ============ Processing Endpoints ============

async fn process_messages(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.process_messages().await?;
    Ok(Json(ApiResponse::success(summary)))
}

async fn process_todo(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let summary = state.process_todo().await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ============ Message Endpoints ============

async fn get_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = message_id(&query)?;
    let resp = state.lookup_message(id).await?;
    Ok(Json(ApiResponse::success(resp)))
}

async fn add_todo(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IdQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let id = message_id(&query)?;
    let resp = state.enqueue(id).await?;
    Ok(Json(ApiResponse::success(resp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_message_id() {
        assert_eq!(validate_message_id(Some("1234")), Ok(1234));
        assert_eq!(validate_message_id(Some(" 77 ")), Ok(77));
        assert_eq!(
            validate_message_id(None),
            Err("Missing id argument in the request")
        );
        assert_eq!(
            validate_message_id(Some("")),
            Err("Missing id argument in the request")
        );
        assert_eq!(
            validate_message_id(Some("12a")),
            Err("id argument must contain digits only")
        );
        assert_eq!(
            validate_message_id(Some("-5")),
            Err("id argument must contain digits only")
        );
        assert!(validate_message_id(Some("99999999999999999999999")).is_err());
    }
}
