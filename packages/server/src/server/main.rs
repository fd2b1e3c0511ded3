// Main entry point for the crawl API server

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawler::{CrawlEngine, HttpFetcher, PlanTier};
use server_core::http::{build_router, AppState};
use server_core::{
    discovery_channel, Config, CrawlService, LocalStore, PostgresStore, RefreshHandler, Store,
    StoreResolver,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,crawler=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Leadgrid crawl API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Primary store (optional - local-only deployments run without it)
    let primary: Option<Arc<dyn Store>> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;

            Some(Arc::new(PostgresStore::new(pool)))
        }
        None => {
            tracing::info!("DATABASE_URL not set - running on local storage only");
            None
        }
    };

    let fallback = Arc::new(LocalStore::new(config.data_dir.clone()));
    let resolver = Arc::new(StoreResolver::new(primary, fallback));
    resolver
        .resolve()
        .await
        .context("No storage backend available")?;

    // Crawl service
    let fetcher = HttpFetcher::new().context("Failed to create HTTP fetcher")?;
    let service = CrawlService::new(resolver.clone(), CrawlEngine::new(fetcher));

    // Discovery worker: single consumer, one re-discovery at a time
    let (queue, worker) = discovery_channel();
    let handler = RefreshHandler::new(service.clone(), resolver.clone(), PlanTier::Starter);
    tokio::spawn(worker.run(handler));

    // Monthly snapshot refresh
    let _scheduler = server_core::scheduler::start_scheduler(resolver.clone(), queue.clone())
        .await
        .context("Failed to start scheduler")?;

    // HTTP surface
    let app = build_router(AppState {
        service,
        resolver: resolver.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
