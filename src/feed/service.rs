use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::feed::domain::{FeedEntry, PostEvent};
use crate::feed::repository::{RepositoryError, TimelineRepository};
use crate::feed::scorer::Scorer;
use crate::gateway::{CatalogPost, Credential, GatewayError, PostCatalog, Relationships};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not fetch followed authors: {0}")]
    Following(#[source] GatewayError),
}

pub type FeedResult<T> = Result<T, FeedError>;

/// Knobs for ingestion and rebuilds.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Home feed size used when a rebuild asks for zero entries.
    pub default_rebuild_limit: usize,
    /// Page size of the "following" lookup.
    pub following_page: usize,
    /// Followees fetched in parallel during a rebuild.
    pub backfill_concurrency: usize,
    /// Deadline for each collaborator call.
    pub collaborator_timeout: Duration,
    /// When set, a post id seen again for the same author inside this window is
    /// not ingested a second time.
    pub dedupe_window: Option<Duration>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            default_rebuild_limit: 100,
            following_page: 5000,
            backfill_concurrency: 8,
            collaborator_timeout: Duration::from_secs(5),
            dedupe_window: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { celebrity: bool },
    Duplicate,
}

/// Entries requested from each followee: a fifth of the feed, between 10 and 100,
/// so a few prolific authors cannot crowd out everyone else.
pub fn per_author_quota(limit: usize) -> usize {
    (limit / 5).clamp(10, 100)
}

/// Hybrid fan-out feed assembly: events are written into author timelines as they
/// arrive, and home feeds are pulled together from those timelines on request.
pub struct FeedService {
    repo: TimelineRepository,
    scorer: Scorer,
    relationships: Arc<dyn Relationships>,
    catalog: Arc<dyn PostCatalog>,
    settings: FeedSettings,
}

impl FeedService {
    pub fn new(
        repo: TimelineRepository,
        scorer: Scorer,
        relationships: Arc<dyn Relationships>,
        catalog: Arc<dyn PostCatalog>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            repo,
            scorer,
            relationships,
            catalog,
            settings,
        }
    }

    pub fn repository(&self) -> &TimelineRepository {
        &self.repo
    }

    /// Fan-out-on-write. Appends the post to its author's timeline, and to the
    /// celebrity timeline if the author is a celebrity right now. Follower home
    /// feeds are left alone.
    pub async fn handle_post_event(&self, event: PostEvent) -> FeedResult<IngestOutcome> {
        let (post_id, author_id) = (event.id, event.user_id.clone());

        if let Some(window) = self.settings.dedupe_window {
            if !self.repo.mark_seen(&author_id, post_id, window).await? {
                tracing::debug!("Skipping redelivered post {} by {}", post_id, author_id);
                return Ok(IngestOutcome::Duplicate);
            }
        }

        let score = self.scorer.score(event.created_at, event.likes, event.views);
        let entry = FeedEntry::from_event(event, score);

        let celebrity = match self.append(&author_id, &entry).await {
            Ok(celebrity) => celebrity,
            Err(e) => {
                // A redelivery has to be ingested again, so the claim is released.
                if self.settings.dedupe_window.is_some() {
                    if let Err(release) = self.repo.forget_seen(&author_id, post_id).await {
                        tracing::warn!(
                            "Could not release dedupe marker for post {} by {}: {}",
                            post_id,
                            author_id,
                            release
                        );
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Ingested post {} by {} (score {:.1}, celebrity: {})",
            entry.post_id,
            author_id,
            score,
            celebrity
        );
        Ok(IngestOutcome::Stored { celebrity })
    }

    /// Writes the entry to the author timeline, and to the celebrity timeline when
    /// the author is one. Returns whether the author is a celebrity.
    async fn append(&self, author_id: &str, entry: &FeedEntry) -> FeedResult<bool> {
        self.repo.append_to_author_timeline(author_id, entry).await?;

        let celebrity = self.repo.is_celebrity(author_id).await?;
        if celebrity {
            self.repo
                .append_to_celebrity_timeline(author_id, entry)
                .await?;
        }
        Ok(celebrity)
    }

    /// Fan-out-on-read. Pulls entries from every followee's cached timeline,
    /// backfills sparse ones from the post catalog, and replaces the user's home
    /// feed with the best `limit` entries. Only the initial followee lookup is
    /// fatal; a followee whose reads fail just contributes nothing.
    pub async fn rebuild_home_feed(
        &self,
        user_id: &str,
        credential: &Credential,
        limit: usize,
    ) -> FeedResult<()> {
        let limit = if limit == 0 {
            self.settings.default_rebuild_limit
        } else {
            limit
        };
        let timeout = self.settings.collaborator_timeout;

        let followees = tokio::time::timeout(
            timeout,
            self.relationships
                .following(credential, self.settings.following_page),
        )
        .await
        .map_err(|_| GatewayError::Timeout(timeout))
        .and_then(|result| result)
        .map_err(FeedError::Following)?;

        let mut unique = HashSet::new();
        let followees: Vec<String> = followees
            .into_iter()
            .filter(|id| unique.insert(id.clone()))
            .collect();

        let per_author = per_author_quota(limit);

        // `buffered` keeps followee order, so equal scores merge the same way on
        // every rebuild.
        let mut entries: Vec<FeedEntry> = stream::iter(followees.iter().cloned())
            .map(|author_id| async move {
                self.collect_followee(&author_id, per_author, credential)
                    .await
            })
            .buffered(self.settings.backfill_concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(limit);
        let count = entries.len();

        self.repo.replace_home_feed(user_id, entries).await?;

        tracing::info!(
            "Rebuilt home feed for {} from {} followees ({} entries)",
            user_id,
            followees.len(),
            count
        );
        Ok(())
    }

    /// Up to `quota` entries for one followee: cached first, then the newest
    /// catalog posts not already cached.
    async fn collect_followee(
        &self,
        author_id: &str,
        quota: usize,
        credential: &Credential,
    ) -> Vec<FeedEntry> {
        let mut entries = match self.repo.read_author_timeline(author_id, quota, 0).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cache read for followee {} failed: {}", author_id, e);
                Vec::new()
            }
        };

        let shortfall = quota.saturating_sub(entries.len());
        if shortfall == 0 {
            return entries;
        }

        let timeout = self.settings.collaborator_timeout;
        let backfill = tokio::time::timeout(
            timeout,
            self.catalog
                .recent_posts(author_id, shortfall, Some(credential)),
        )
        .await
        .map_err(|_| GatewayError::Timeout(timeout))
        .and_then(|result| result);

        match backfill {
            Ok(posts) => {
                let cached: HashSet<i64> = entries.iter().map(|e| e.post_id).collect();
                entries.extend(
                    posts
                        .into_iter()
                        .filter(|post| !cached.contains(&post.id))
                        .take(shortfall)
                        .map(|post| self.backfilled_entry(author_id, post)),
                );
            }
            Err(e) => {
                tracing::warn!("Backfill for followee {} failed: {}", author_id, e);
            }
        }
        entries
    }

    fn backfilled_entry(&self, author_id: &str, post: CatalogPost) -> FeedEntry {
        let author_id = if post.user_id.is_empty() {
            author_id.to_string()
        } else {
            post.user_id
        };
        FeedEntry {
            post_id: post.id,
            author_id,
            media_url: post.media.unwrap_or_default(),
            snippet: post.description.unwrap_or_default(),
            tags: Vec::new(),
            created_at: post.created_at,
            score: self.scorer.recency(post.created_at),
        }
    }

    pub async fn get_author_feed(
        &self,
        author_id: &str,
        limit: usize,
        offset: usize,
    ) -> FeedResult<Vec<FeedEntry>> {
        Ok(self.repo.read_author_timeline(author_id, limit, offset).await?)
    }

    pub async fn get_home_feed(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> FeedResult<Vec<FeedEntry>> {
        Ok(self.repo.read_home_feed(user_id, limit, offset).await?)
    }

    /// Celebrity feeds are the same for every reader, so they are pulled straight
    /// from the celebrity timeline.
    pub async fn get_celebrity_feed(
        &self,
        author_id: &str,
        limit: usize,
        offset: usize,
    ) -> FeedResult<Vec<FeedEntry>> {
        Ok(self
            .repo
            .read_celebrity_timeline(author_id, limit, offset)
            .await?)
    }

    pub async fn list_celebrities(&self) -> FeedResult<Vec<String>> {
        Ok(self.repo.list_celebrities().await?)
    }

    /// Affects future ingestion only; existing history is not copied over.
    pub async fn promote_celebrity(&self, author_id: &str) -> FeedResult<()> {
        if self.repo.set_celebrity(author_id, true).await? {
            tracing::info!("Promoted {} to celebrity", author_id);
        }
        Ok(())
    }

    /// Affects future ingestion only; the celebrity timeline is kept.
    pub async fn demote_celebrity(&self, author_id: &str) -> FeedResult<()> {
        if self.repo.set_celebrity(author_id, false).await? {
            tracing::info!("Demoted celebrity {}", author_id);
        }
        Ok(())
    }
}
