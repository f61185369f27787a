use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use citypass_server::config::{Config, StorageBackend};
use citypass_server::routes::create_routes;
use citypass_server::services::{PassEngine, RandomCredentialGenerator, SystemClock};
use citypass_server::state::AppState;
use citypass_server::store::memory::CatalogSeed;
use citypass_server::store::{InMemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("citypass_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let credentials = Arc::new(RandomCredentialGenerator::new(config.pin_length));
    let clock = Arc::new(SystemClock);

    let engine = match config.storage {
        StorageBackend::Postgres => {
            let store = PgStore::connect(&config.database_url, config.database_max_connections)
                .await
                .context("failed to connect to database")?;
            store.migrate().await.context("failed to run migrations")?;
            PassEngine::with_store(Arc::new(store), credentials, clock, config.engine_settings())
        }
        StorageBackend::Memory => {
            let seed = match &config.catalog_seed_path {
                Some(path) => CatalogSeed::from_file(path)
                    .with_context(|| format!("failed to load catalog seed from {}", path))?,
                None => CatalogSeed::default(),
            };
            tracing::info!(
                passes = seed.passes.len(),
                discount_codes = seed.discount_codes.len(),
                "Using in-memory store"
            );
            PassEngine::with_store(
                Arc::new(InMemoryStore::from_seed(seed)),
                credentials,
                clock,
                config.engine_settings(),
            )
        }
    };

    let app = create_routes(AppState::new(engine), &config);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server running at http://{}", addr);

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
