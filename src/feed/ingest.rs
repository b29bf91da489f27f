use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::feed::domain::PostEvent;
use crate::feed::service::{FeedService, IngestOutcome};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed post event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Event consumer has stopped")]
    Closed,
}

pub fn decode_post_event(payload: &[u8]) -> Result<PostEvent, IngestError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Sending side of the ingestion queue. Cheap to clone; every transport that
/// delivers post events holds one.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<PostEvent>,
}

/// A bounded queue of events and the sink feeding it.
pub fn channel(capacity: usize) -> (EventSink, mpsc::Receiver<PostEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, rx)
}

impl EventSink {
    /// Waits for queue space, so a slow consumer pushes back on producers.
    pub async fn submit(&self, event: PostEvent) -> Result<(), IngestError> {
        self.tx.send(event).await.map_err(|_| IngestError::Closed)
    }

    /// Decode a raw payload and enqueue it. Malformed payloads are dropped here.
    pub async fn submit_raw(&self, payload: &[u8]) -> Result<(), IngestError> {
        let event = decode_post_event(payload).inspect_err(|e| {
            tracing::warn!("Dropping post event: {}", e);
        })?;
        self.submit(event).await
    }
}

/// Feed queued events into the service one at a time until every sink is dropped.
/// A failed ingestion is logged and skipped; redelivery is up to the source.
pub async fn run_consumer(mut events: mpsc::Receiver<PostEvent>, service: Arc<FeedService>) {
    let mut ingested = 0u64;
    while let Some(event) = events.recv().await {
        let (post_id, author_id) = (event.id, event.user_id.clone());
        match service.handle_post_event(event).await {
            Ok(IngestOutcome::Stored { .. }) => ingested += 1,
            Ok(IngestOutcome::Duplicate) => {}
            Err(e) => {
                tracing::warn!("Failed to ingest post {} by {}: {}", post_id, author_id, e);
            }
        }
    }
    tracing::info!("Event consumer stopped after {} posts", ingested);
}
