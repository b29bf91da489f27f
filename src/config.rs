use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use url::Url;

use crate::feed::{FeedSettings, Scorer, TimelineLimits};

#[derive(Parser, Debug)]
#[command(name = "feedline", about = "Hybrid fan-out news feed service")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub scoring: ScoringConfig,
    pub feed: FeedConfig,
    pub collaborators: CollaboratorConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub path: Option<PathBuf>,
    pub author_capacity: usize,
    pub celebrity_capacity: usize,
    pub home_capacity: usize,
    pub home_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub like_weight: f64,
    pub view_weight: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub default_rebuild_limit: usize,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    pub following_page: usize,
    pub backfill_concurrency: usize,
    pub ingest_queue: usize,
    pub dedupe_window_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub users_url: Option<String>,
    pub posts_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    pub rebuilds_per_window: u64,
    pub window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let limits = TimelineLimits::default();
        Self {
            backend: CacheBackend::Memory,
            path: None,
            author_capacity: limits.author_capacity,
            celebrity_capacity: limits.celebrity_capacity,
            home_capacity: limits.home_capacity,
            home_ttl_secs: limits.home_ttl.as_secs(),
            sweep_interval_secs: 60,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let scorer = Scorer::default();
        Self {
            like_weight: scorer.like_weight,
            view_weight: scorer.view_weight,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        let settings = FeedSettings::default();
        Self {
            default_rebuild_limit: settings.default_rebuild_limit,
            default_page_limit: 50,
            max_page_limit: 1000,
            following_page: settings.following_page,
            backfill_concurrency: settings.backfill_concurrency,
            ingest_queue: 1024,
            dedupe_window_secs: None,
        }
    }
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            users_url: None,
            posts_url: None,
            timeout_secs: 5,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rebuilds_per_window: 1,
            window_secs: 60,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.cache.path.is_none() {
            config.cache.path = Some(data_dir.join("feedline.db"));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match &cli.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".feedline")),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.feed.max_page_limit == 0 {
            anyhow::bail!("feed.max_page_limit must be positive");
        }
        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("rate_limit.window_secs must be positive");
        }
        if self.cache.sweep_interval_secs == 0 {
            anyhow::bail!("cache.sweep_interval_secs must be positive");
        }
        self.collaborators.users_url()?;
        self.collaborators.posts_url()?;
        Ok(())
    }

    pub fn limits(&self) -> TimelineLimits {
        TimelineLimits {
            author_capacity: self.cache.author_capacity,
            celebrity_capacity: self.cache.celebrity_capacity,
            home_capacity: self.cache.home_capacity,
            home_ttl: Duration::from_secs(self.cache.home_ttl_secs),
        }
    }

    pub fn scorer(&self) -> Scorer {
        Scorer::new(self.scoring.like_weight, self.scoring.view_weight)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            default_rebuild_limit: self.feed.default_rebuild_limit,
            following_page: self.feed.following_page,
            backfill_concurrency: self.feed.backfill_concurrency,
            collaborator_timeout: self.collaborators.timeout(),
            dedupe_window: self.feed.dedupe_window_secs.map(Duration::from_secs),
        }
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.cache.path.as_ref()
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn users_url(&self) -> anyhow::Result<Option<Url>> {
        parse_base(self.users_url.as_deref(), "collaborators.users_url")
    }

    pub fn posts_url(&self) -> anyhow::Result<Option<Url>> {
        parse_base(self.posts_url.as_deref(), "collaborators.posts_url")
    }
}

fn parse_base(raw: Option<&str>, field: &str) -> anyhow::Result<Option<Url>> {
    raw.map(|s| Url::parse(s).with_context(|| format!("{} is not a valid URL", field)))
        .transpose()
}
