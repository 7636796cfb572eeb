//! CLI module for the telemetry relay
//!
//! Provides command-line interface for:
//! - serve: connect to the database and serve WebSocket streams
//! - config: print the effective configuration

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, Command};
pub use commands::{run, run_command, serve, show_config};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
