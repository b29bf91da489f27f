use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::Caller;
use crate::feed::FeedEntry;
use crate::routes::{Items, PageQuery};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RebuildQuery {
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{user_id}/feed", get(author_feed))
        .route("/feed", get(home_feed))
        .route("/feed/rebuild", post(rebuild))
}

async fn author_feed(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Items<FeedEntry>>> {
    let limit = state.pages.resolve(page.limit);
    let entries = state
        .feed
        .get_author_feed(&user_id, limit, page.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries.into()))
}

async fn home_feed(
    State(state): State<AppState>,
    caller: Caller,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<Items<FeedEntry>>> {
    let limit = state.pages.resolve(page.limit);
    let entries = state
        .feed
        .get_home_feed(&caller.user_id, limit, page.offset.unwrap_or(0))
        .await?;
    Ok(Json(entries.into()))
}

/// Rebuilds hit both collaborators, so each caller gets a small allowance per window.
async fn rebuild(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<RebuildQuery>,
) -> AppResult<Json<Value>> {
    if !state.rebuild_limiter.check(&caller.user_id).await {
        tracing::info!("Rebuild for {} rate limited", caller.user_id);
        return Err(AppError::TooManyRequests);
    }

    state
        .feed
        .rebuild_home_feed(&caller.user_id, &caller.credential, query.limit.unwrap_or(0))
        .await?;
    Ok(Json(json!({ "status": "rebuilt" })))
}
