//! Marigold - A date-archived blogging engine

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marigold::{
    api::{self, AppState},
    config::Config,
    db,
};

/// Configuration file read when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marigold=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Marigold {}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load_with_env(&config_path)?;
    tracing::info!("Configuration loaded from {:?}", config_path);

    if config.admin.password_hash.is_empty() {
        tracing::warn!("No administrator password hash configured, the admin is disabled");
    }
    if config.site.secret_key.is_empty() {
        tracing::warn!("site.secret_key is empty, password cookies can be forged");
    }

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Theme: {}", config.theme.active);

    // Build application state and router
    let state = AppState::new(config, pool)?;
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
