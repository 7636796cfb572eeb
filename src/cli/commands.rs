//! CLI command implementations
//!
//! `serve` boots in a fixed order: configuration, logging, database,
//! relay, HTTP server. Any failure before the listener is bound aborts
//! the process.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::args::Command;
use super::config::{redact_url, Config};
use super::errors::{CliError, CliResult};
use crate::db;
use crate::http_server::HttpServer;
use crate::observability::init_logging;
use crate::relay::{PgNotificationPool, Relay};

/// Main entry point for CLI
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(config.as_deref(), port),
        Command::Config { config } => show_config(config.as_deref()),
    }
}

/// Serve the relay until Ctrl-C
pub fn serve(config_path: Option<&Path>, port: Option<u16>) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?.with_port(port);
    init_logging(&config.logging);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(serve_async(config))
}

async fn serve_async(config: Config) -> CliResult<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting telemetry relay");

    let pool = db::connect(&config.database)
        .await
        .map_err(|e| CliError::database_error(e.to_string()))?;

    let notifications = Arc::new(PgNotificationPool::new(pool.clone()));
    let relay = Relay::new(config.relay.clone(), notifications)
        .map_err(|e| CliError::config_error(e.to_string()))?;

    let server = HttpServer::with_config(config.server.clone(), Arc::new(relay), Some(pool.clone()));
    let served = server
        .start()
        .await
        .map_err(|e| CliError::serve_failed(format!("HTTP server failed: {}", e)));

    pool.close().await;
    served
}

/// Print the effective configuration as JSON
pub fn show_config(config_path: Option<&Path>) -> CliResult<()> {
    let config = effective_config(config_path, std::env::var("DATABASE_URL").ok())?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn effective_config(config_path: Option<&Path>, env_url: Option<String>) -> CliResult<Config> {
    let mut config = Config::load_or_default(config_path)?;
    let url = config.database.resolve_url(env_url);
    config.database.url = Some(redact_url(&url));
    Ok(config)
}
