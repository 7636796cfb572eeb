//! Configuration file
//!
//! One JSON document with a section per subsystem. Every field has a
//! default, so a missing file section (or no file at all) is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::db::DatabaseConfig;
use crate::http_server::HttpServerConfig;
use crate::observability::LoggingConfig;
use crate::relay::RelayConfig;

/// Full service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Validate every section
    pub fn validate(&self) -> CliResult<()> {
        self.relay
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))?;

        if self.database.max_connections == 0 {
            return Err(CliError::config_error("database.max_connections must be > 0"));
        }
        if self.database.acquire_timeout_secs == 0 || self.database.connect_timeout_secs == 0 {
            return Err(CliError::config_error("database timeouts must be > 0"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(CliError::config_error("logging.level must not be empty"));
        }

        Ok(())
    }

    /// Apply command-line overrides
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }
}

/// Hide the password in a connection URL
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &url[authority_start..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..authority_start],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}
