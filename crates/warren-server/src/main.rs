//! # Warren Server
//!
//! AMQP 0-8, 0-9 and 0-9-1 broker front end.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! warren
//!
//! # Run with a custom config file
//! WARREN_CONFIG=/path/to/warren.toml warren
//!
//! # Run with environment overrides
//! WARREN_PORT=5673 WARREN_LIMITS__FRAME_MAX=65536 warren
//! ```

mod config;
mod metrics;
mod server;
mod session;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warren_server=debug,warren_core=debug,warren_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Warren on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    server::run_server(config).await?;

    Ok(())
}
