//! Habitat - Houses and people registry
//!
//! A REST service for houses and their residents with a bounded,
//! policy-driven cache in front of the database.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - Repositories (MongoDB and in-memory) and models
//! - `cache` - Bounded LRU/LFU stores and the caching repository decorator
//! - `api` - axum routes

mod api;
mod cache;
mod config;
mod database;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::AppState;
use cache::{CacheRegistry, CachedRepository};
use config::{Config, ConfigError, StorageKind};
use database::{Database, House, MemoryRepository, MongoRepository, Person};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("habitat=info,mongodb=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Habitat...");

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Storage: {}", config.storage);

    let registry = CacheRegistry::new(config.cache.clone());

    let (state, database) = match config.storage {
        StorageKind::Mongo => {
            let uri = config
                .mongodb_uri
                .as_deref()
                .ok_or(ConfigError::MissingMongoUri)?;

            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            info!("Database connected");

            let people = Arc::new(CachedRepository::new(
                MongoRepository::<Person>::new(&db, "people"),
                &registry,
                "people",
            )?);
            let state = AppState {
                houses: Arc::new(CachedRepository::new(
                    MongoRepository::<House>::new(&db, "houses"),
                    &registry,
                    "houses",
                )?),
                people: people.clone(),
                residents: people,
                registry: registry.clone(),
            };
            (state, Some(db))
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage, data is lost on exit");

            let people = Arc::new(CachedRepository::new(
                MemoryRepository::<Person>::new(),
                &registry,
                "people",
            )?);
            let state = AppState {
                houses: Arc::new(CachedRepository::new(
                    MemoryRepository::<House>::new(),
                    &registry,
                    "houses",
                )?),
                people: people.clone(),
                residents: people,
                registry: registry.clone(),
            };
            (state, None)
        }
    };

    let app = api::router(state);

    let listener = TcpListener::bind(config.http_addr).await?;
    info!("Listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(db) = database {
        db.client().clone().shutdown().await;
        info!("Database connection closed");
    }

    info!("Habitat stopped");
    Ok(())
}

/// Resolve on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
