use std::sync::Arc;

use crate::feed::{EventSink, FeedService};
use crate::ratelimit::RateLimiter;

/// Page size policy for feed reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default: usize,
    pub max: usize,
}

impl PageLimits {
    /// Missing or zero means the default; anything else is capped at `max`.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        match requested {
            None | Some(0) => self.default,
            Some(n) => n,
        }
        .min(self.max)
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default: 50,
            max: 1000,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<FeedService>,
    pub events: EventSink,
    pub rebuild_limiter: RateLimiter,
    pub pages: PageLimits,
}
