use anyhow::Result;
use clap::Parser;
use library_service::api;
use library_service::catalog::CatalogClient;
use library_service::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::parse();

    // Run migrations first
    info!("Running database migrations...");
    library_service::run_migrations(&config.database_url)?;
    info!("Migrations completed successfully");

    let pool = library_service::connect_pool(&config.database_url, config.max_db_connections).await?;
    let catalog = CatalogClient::new(config.catalog_url.clone(), config.catalog_timeout())?;
    let app_state = api::AppState::new(pool, catalog);

    if config.sync_on_startup {
        match app_state.inventory.sync_catalog(&app_state.catalog).await {
            Ok(summary) => info!("Startup catalog sync loaded {} books", summary.fetched),
            Err(e) => error!("Startup catalog sync failed: {}", e),
        }
    }

    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("Library service started on port {}", config.port);
    info!("Catalog source: {}", config.catalog_url);

    axum::serve(listener, app).await?;

    Ok(())
}
