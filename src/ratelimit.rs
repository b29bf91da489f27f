use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStore;

/// Fixed-window limiter kept in the cache store, so every instance sharing the
/// store shares the allowance.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    scope: &'static str,
    allowance: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn CacheStore>,
        scope: &'static str,
        allowance: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            scope,
            allowance,
            window,
        }
    }

    /// Counts one hit for `subject`; false once the window's allowance is spent.
    /// A store failure lets the request through.
    pub async fn check(&self, subject: &str) -> bool {
        let key = format!("ratelimit:{}:{}", self.scope, subject);
        match self.store.incr(&key, self.window).await {
            Ok(hits) => hits <= self.allowance,
            Err(e) => {
                tracing::warn!("Rate limiter unavailable for {}: {}", key, e);
                true
            }
        }
    }
}
