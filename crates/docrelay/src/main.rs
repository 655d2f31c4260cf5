//! Relay server binary

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docrelay::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docrelay=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting docrelay server...");

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Using default configuration: {}", e);
        Config::default()
    });

    docrelay::run_server(config).await?;

    Ok(())
}
