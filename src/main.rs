//! scpi-switch-sim: a simulated switch matrix controller
//!
//! Emulates a device with two switches of four paths each, driven over a
//! newline-terminated SCPI-like text protocol:
//! - `SWITCH:SELECT <sw> <p>` selects a path on a switch
//! - `PATH:SELECT <n>` selects by legacy path index 1..8
//! - `STATE?` reports the current selection as JSON
//!
//! Features:
//! - Concurrent client connections sharing one device
//! - Fixed actuation delay during which selections serialize
//! - Idle connection timeout
//! - Configuration via CLI arguments or TOML file

mod config;
mod device;
mod protocols;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        actuation_delay_ms = config.actuation_delay.as_millis() as u64,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        "Starting scpi-switch-sim"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = Server::new(config);
        server.run().await
    })
}
