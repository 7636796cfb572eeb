//! CLI argument definitions using clap
//!
//! Commands:
//! - telemetry-relay serve [--config <path>] [--port <port>]
//! - telemetry-relay config [--config <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Telemetry relay: Postgres notifications to filtered WebSocket streams
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the database and serve the relay
    Serve {
        /// Path to a JSON configuration file; defaults apply without one
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on, overriding the configuration
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and exit
    Config {
        /// Path to a JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
