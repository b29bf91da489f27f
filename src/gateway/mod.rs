//! Clients for the two upstream services the feed reads from: the relationship
//! API (who does this user follow?) and the post catalog (an author's recent
//! posts, used to backfill a sparse cache).

mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::feed::domain::id_string;

pub use self::http::{HttpPostCatalog, HttpRelationships};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The caller's bearer credential, forwarded verbatim to collaborators.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// A post as listed by the post catalog. Engagement counters are not part of
/// this listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogPost {
    pub id: i64,
    #[serde(deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Relationships: Send + Sync {
    /// Ids of the authors the credential's owner follows.
    async fn following(&self, credential: &Credential, limit: usize) -> GatewayResult<Vec<String>>;
}

#[async_trait]
pub trait PostCatalog: Send + Sync {
    /// The author's most recent posts, newest first.
    async fn recent_posts(
        &self,
        author_id: &str,
        limit: usize,
        credential: Option<&Credential>,
    ) -> GatewayResult<Vec<CatalogPost>>;
}

/// Stand-in used when no collaborator URL is configured. Every call fails, so
/// rebuilds report the missing configuration instead of silently producing
/// empty feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl Relationships for Unconfigured {
    async fn following(&self, _credential: &Credential, _limit: usize) -> GatewayResult<Vec<String>> {
        Err(GatewayError::NotConfigured("relationship service"))
    }
}

#[async_trait]
impl PostCatalog for Unconfigured {
    async fn recent_posts(
        &self,
        _author_id: &str,
        _limit: usize,
        _credential: Option<&Credential>,
    ) -> GatewayResult<Vec<CatalogPost>> {
        Err(GatewayError::NotConfigured("post catalog"))
    }
}
