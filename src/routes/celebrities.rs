use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::Caller;
use crate::feed::FeedEntry;
use crate::routes::{Items, PageQuery};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/celebrities", get(list))
        .route("/celebrities/{user_id}", post(promote).delete(demote))
        .route("/celebrities/{user_id}/feed", get(celebrity_feed))
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Items<String>>> {
    Ok(Json(state.feed.list_celebrities().await?.into()))
}

async fn celebrity_feed(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Items<FeedEntry>>> {
    let limit = state.pages.resolve(page.limit);
    let entries = state
        .feed
        .get_celebrity_feed(&user_id, limit, page.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries.into()))
}

async fn promote(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    tracing::debug!("{} promoting {}", caller.user_id, user_id);
    state.feed.promote_celebrity(&user_id).await?;
    Ok(Json(json!({ "status": "promoted", "user_id": user_id })))
}

async fn demote(
    State(state): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    tracing::debug!("{} demoting {}", caller.user_id, user_id);
    state.feed.demote_celebrity(&user_id).await?;
    Ok(Json(json!({ "status": "demoted", "user_id": user_id })))
}
