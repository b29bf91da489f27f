// Repository - owns key naming and capacity/TTL policy on top of the cache store
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CacheStore, Op, StoreError};
use crate::feed::domain::FeedEntry;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

const CELEBRITIES_KEY: &str = "feed:celebrities";

fn author_key(author_id: &str) -> String {
    format!("feed:author:{author_id}")
}

fn celebrity_key(author_id: &str) -> String {
    format!("feed:celebrity:{author_id}")
}

fn home_key(user_id: &str) -> String {
    format!("feed:home:{user_id}")
}

fn seen_key(author_id: &str, post_id: i64) -> String {
    format!("feed:seen:{author_id}:{post_id}")
}

/// Capacity and expiry policy for every cached sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineLimits {
    pub author_capacity: usize,
    pub celebrity_capacity: usize,
    pub home_capacity: usize,
    pub home_ttl: Duration,
}

impl Default for TimelineLimits {
    fn default() -> Self {
        Self {
            author_capacity: 500,
            celebrity_capacity: 500,
            home_capacity: 1000,
            home_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Author timelines, celebrity timelines, home feeds and the celebrity set.
#[derive(Clone)]
pub struct TimelineRepository {
    store: Arc<dyn CacheStore>,
    limits: TimelineLimits,
}

impl TimelineRepository {
    pub fn new(store: Arc<dyn CacheStore>, limits: TimelineLimits) -> Self {
        Self { store, limits }
    }

    pub async fn append_to_author_timeline(
        &self,
        author_id: &str,
        entry: &FeedEntry,
    ) -> RepositoryResult<()> {
        self.push_capped(author_key(author_id), entry, self.limits.author_capacity)
            .await
    }

    pub async fn append_to_celebrity_timeline(
        &self,
        author_id: &str,
        entry: &FeedEntry,
    ) -> RepositoryResult<()> {
        self.push_capped(celebrity_key(author_id), entry, self.limits.celebrity_capacity)
            .await
    }

    pub async fn read_author_timeline(
        &self,
        author_id: &str,
        limit: usize,
        offset: usize,
    ) -> RepositoryResult<Vec<FeedEntry>> {
        self.read(&author_key(author_id), limit, offset).await
    }

    pub async fn read_celebrity_timeline(
        &self,
        author_id: &str,
        limit: usize,
        offset: usize,
    ) -> RepositoryResult<Vec<FeedEntry>> {
        self.read(&celebrity_key(author_id), limit, offset).await
    }

    /// Sort by descending score, cap, and swap in as the user's home feed with a
    /// fresh TTL. The old feed is deleted in the same batch, so no tail from a
    /// longer previous feed can survive.
    pub async fn replace_home_feed(
        &self,
        user_id: &str,
        mut entries: Vec<FeedEntry>,
    ) -> RepositoryResult<()> {
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(self.limits.home_capacity);

        let key = home_key(user_id);
        let values = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut ops = vec![Op::Delete { key: key.clone() }];
        if !values.is_empty() {
            ops.push(Op::PushBack {
                key: key.clone(),
                values,
            });
            ops.push(Op::Expire {
                key,
                ttl: self.limits.home_ttl,
            });
        }
        self.store.atomic(ops).await?;
        Ok(())
    }

    pub async fn read_home_feed(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> RepositoryResult<Vec<FeedEntry>> {
        self.read(&home_key(user_id), limit, offset).await
    }

    /// Returns true if membership changed.
    pub async fn set_celebrity(&self, author_id: &str, is_celebrity: bool) -> RepositoryResult<bool> {
        let changed = if is_celebrity {
            self.store.set_add(CELEBRITIES_KEY, author_id).await?
        } else {
            self.store.set_remove(CELEBRITIES_KEY, author_id).await?
        };
        Ok(changed)
    }

    pub async fn is_celebrity(&self, author_id: &str) -> RepositoryResult<bool> {
        Ok(self.store.set_contains(CELEBRITIES_KEY, author_id).await?)
    }

    pub async fn list_celebrities(&self) -> RepositoryResult<Vec<String>> {
        Ok(self.store.set_members(CELEBRITIES_KEY).await?)
    }

    /// Records a post as ingested for `window`. Returns false when it was
    /// already recorded inside the current window.
    pub async fn mark_seen(
        &self,
        author_id: &str,
        post_id: i64,
        window: Duration,
    ) -> RepositoryResult<bool> {
        let hits = self.store.incr(&seen_key(author_id, post_id), window).await?;
        Ok(hits == 1)
    }

    /// Drops the marker written by [`mark_seen`](Self::mark_seen).
    pub async fn forget_seen(&self, author_id: &str, post_id: i64) -> RepositoryResult<()> {
        self.store
            .atomic(vec![Op::Delete {
                key: seen_key(author_id, post_id),
            }])
            .await?;
        Ok(())
    }

    async fn push_capped(&self, key: String, entry: &FeedEntry, capacity: usize) -> RepositoryResult<()> {
        let value = serde_json::to_string(entry)?;
        self.store
            .atomic(vec![
                Op::PushFront {
                    key: key.clone(),
                    value,
                },
                Op::Trim {
                    key,
                    keep: capacity,
                },
            ])
            .await?;
        Ok(())
    }

    async fn read(&self, key: &str, limit: usize, offset: usize) -> RepositoryResult<Vec<FeedEntry>> {
        let raw = self.store.range(key, offset, limit).await?;
        let entries = raw
            .iter()
            .filter_map(|value| match serde_json::from_str::<FeedEntry>(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping undecodable entry in {}: {}", key, e);
                    None
                }
            })
            .collect();
        Ok(entries)
    }
}
