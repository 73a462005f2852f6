use clap::Parser;
use listing_scout::config::Config;
use listing_scout::server::{self, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    info!("🏠 Listing Scout - realtor.ca webhook scraper");
    info!(
        concurrency = config.concurrency,
        nav_timeout_ms = config.nav_timeout_ms,
        browserless = config.browserless_token().is_some(),
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)?;
    server::start(config.port, state).await
}
