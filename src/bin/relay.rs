//! facesync relay
//!
//! Forwards sync messages between a companion and a wearable process.
//!
//! # Configuration
//!
//! Reads the same config file as `facesync`. Environment variables:
//! - `FACESYNC_RELAY_BIND`: Address to listen on (default: 127.0.0.1:8787)
//! - `FACESYNC_CONFIG`: Path to config file (default: ~/.config/facesync/config.yaml)
//! - `RUST_LOG`: Log filter (default: facesync=info,tower_http=info)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint
//! - `GET /relay`: WebSocket endpoint for devices

use std::path::PathBuf;

use facesync::config::Config;

#[tokio::main]
async fn main() {
    facesync::init_logging("facesync=info,facesync_core=info,tower_http=info");

    let config_path = std::env::var("FACESYNC_CONFIG").ok().map(PathBuf::from);
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &config.config_file {
        tracing::info!("Config file: {}", path.display());
    }

    if let Err(e) = facesync::relay::serve(config.relay_bind.value).await {
        tracing::error!("Relay failed on {}: {}", config.relay_bind.value, e);
        std::process::exit(1);
    }
}
