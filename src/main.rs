use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use feedline::cache::{self, CacheStore, MemoryStore, SqliteStore};
use feedline::config::{CacheBackend, Cli, Config};
use feedline::db;
use feedline::feed::{self, FeedService, TimelineRepository};
use feedline::gateway::{HttpPostCatalog, HttpRelationships, PostCatalog, Relationships, Unconfigured};
use feedline::ratelimit::RateLimiter;
use feedline::routes;
use feedline::state::{AppState, PageLimits};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    let store = open_store(&config, &cli)?;
    let (relationships, catalog) = gateways(&config)?;

    let feed = Arc::new(FeedService::new(
        TimelineRepository::new(store.clone(), config.limits()),
        config.scorer(),
        relationships,
        catalog,
        config.feed_settings(),
    ));

    let (events, queue) = feed::ingest::channel(config.feed.ingest_queue);
    let consumer = tokio::spawn(feed::run_consumer(queue, feed.clone()));
    let sweep = cache::spawn_expiry_sweep(
        store.clone(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );

    let state = AppState {
        feed,
        events,
        rebuild_limiter: RateLimiter::new(
            store,
            "rebuild",
            config.rate_limit.rebuilds_per_window,
            Duration::from_secs(config.rate_limit.window_secs),
        ),
        pages: PageLimits {
            default: config.feed.default_page_limit,
            max: config.feed.max_page_limit,
        },
    };
    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last event sink, so the consumer drains what is queued and exits.
    sweep.abort();
    if let Err(e) = consumer.await {
        tracing::error!("Event consumer panicked: {}", e);
    }
    Ok(())
}

fn open_store(config: &Config, cli: &Cli) -> anyhow::Result<Arc<dyn CacheStore>> {
    match config.cache.backend {
        CacheBackend::Memory => {
            tracing::info!("Using in-memory cache store");
            Ok(Arc::new(MemoryStore::new()))
        }
        CacheBackend::Sqlite => {
            let data_dir = Config::data_dir(cli)?;
            std::fs::create_dir_all(&data_dir)?;
            let path = config
                .db_path()
                .cloned()
                .unwrap_or_else(|| data_dir.join("feedline.db"));
            tracing::info!("Using SQLite cache store at {}", path.display());

            let pool = db::create_pool(&path)?;
            db::run_migrations(&pool)?;
            Ok(Arc::new(SqliteStore::new(pool)))
        }
    }
}

fn gateways(config: &Config) -> anyhow::Result<(Arc<dyn Relationships>, Arc<dyn PostCatalog>)> {
    let timeout = config.collaborators.timeout();

    let relationships: Arc<dyn Relationships> = match config.collaborators.users_url()? {
        Some(base) => Arc::new(HttpRelationships::new(base, timeout)?),
        None => {
            tracing::warn!("collaborators.users_url not set; home feed rebuilds will fail");
            Arc::new(Unconfigured)
        }
    };
    let catalog: Arc<dyn PostCatalog> = match config.collaborators.posts_url()? {
        Some(base) => Arc::new(HttpPostCatalog::new(base, timeout)?),
        None => {
            tracing::warn!("collaborators.posts_url not set; sparse timelines will not be backfilled");
            Arc::new(Unconfigured)
        }
    };
    Ok((relationships, catalog))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
