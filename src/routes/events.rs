use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events/posts", post(publish))
}

/// HTTP sink for post events. Accepted events are ingested by the consumer task.
async fn publish(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<Value>)> {
    state.events.submit_raw(&body).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
