pub mod celebrities;
pub mod events;
pub mod feed;
pub mod health;

use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// `?limit=&offset=` on every feed read.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response envelope for every list.
#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(feed::router())
        .merge(celebrities::router())
        .merge(events::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
