//! hello-gate: a TCP server with a tiny session protocol
//!
//! Clients must open with `hello`, may then send `hello` or `negotiate`,
//! and end the session with `bye`:
//!
//! ```text
//! client: hello       server: hello
//! client: negotiate   server: negotiate back
//! client: foo         server: message not recognised
//! client: bye         server: bye   (connection closed)
//! ```
//!
//! Each accepted connection runs in its own task.
//! Configuration via CLI arguments or TOML file.

mod config;
mod protocol;
mod server;
mod session;

use config::Config;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

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
        backlog = config.backlog,
        buffer_size = config.buffer_size,
        max_receive_errors = ?config.max_receive_errors,
        "Starting hello-gate server"
    );

    match server::serve(&config).await {
        Ok(()) => {
            info!("Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server failed to start");
            ExitCode::FAILURE
        }
    }
}
