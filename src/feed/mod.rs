pub mod domain;
pub mod ingest;
pub mod repository;
pub mod scorer;
pub mod service;

pub use domain::{FeedEntry, PostEvent};
pub use ingest::{decode_post_event, run_consumer, EventSink, IngestError};
pub use repository::{RepositoryError, TimelineLimits, TimelineRepository};
pub use scorer::Scorer;
pub use service::{FeedError, FeedResult, FeedService, FeedSettings, IngestOutcome};
