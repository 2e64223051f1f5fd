//! # botmeta-server
//!
//! HTTP server for SwitchBot Bot metadata.
//!
//! This binary provides:
//! - REST API for operation mode and battery level queries
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package botmeta-server
//!
//! # Production
//! BOTMETA_ENV=production ./botmeta-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use botmeta_core::BotmetaConfig;
use botmeta_server::api::create_router;
use botmeta_server::logging::{self, LogMode};
use botmeta_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogMode::from_env())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting botmeta-server");

    let config = BotmetaConfig::load()?;
    let bind_address = config.server.bind_address.clone();

    let state = AppState::new(config).await?;
    if !state.bluetooth_available() {
        warn!("No Bluetooth adapter; queries will answer with defaults");
    }

    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c, shutting down");
    }
}
