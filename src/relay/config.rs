//! Relay configuration
//!
//! Passed into [`Relay::new`](super::Relay::new); nothing here is global.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{RelayError, RelayResult};

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Notification channel to `LISTEN` on
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Interval between liveness pings, in seconds
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Deadline for writing a ping, in seconds
    #[serde(default = "default_ping_write_timeout_secs")]
    pub ping_write_timeout_secs: u64,

    /// Client silence after which the session is dead, in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Deadline for writing a data frame, in seconds
    #[serde(default = "default_point_write_timeout_secs")]
    pub point_write_timeout_secs: u64,

    /// Largest inbound message accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Origins allowed to open a stream; empty allows any
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Send an error frame for each malformed upstream payload instead of
    /// skipping it silently
    #[serde(default)]
    pub notify_malformed_payloads: bool,
}

fn default_channel() -> String {
    "telemetry_channel".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_ping_write_timeout_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_point_write_timeout_secs() -> u64 {
    5
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_max_frame_size() -> usize {
    16 * 1024
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            ping_write_timeout_secs: default_ping_write_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            point_write_timeout_secs: default_point_write_timeout_secs(),
            max_message_size: default_max_message_size(),
            max_frame_size: default_max_frame_size(),
            allowed_origins: Vec::new(),
            notify_malformed_payloads: false,
        }
    }
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn ping_write_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn point_write_timeout(&self) -> Duration {
        Duration::from_secs(self.point_write_timeout_secs)
    }

    /// Whether a request from `origin` may open a stream
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed_origins.iter().any(|o| o == origin),
            // non-browser clients send no Origin
            None => true,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> RelayResult<()> {
        if self.channel.is_empty() {
            return Err(RelayError::ConfigError("channel must not be empty".into()));
        }
        let durations = [
            ("heartbeat_interval_secs", self.heartbeat_interval_secs),
            ("ping_write_timeout_secs", self.ping_write_timeout_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("point_write_timeout_secs", self.point_write_timeout_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(RelayError::ConfigError(format!("{} must be > 0", name)));
            }
        }
        if self.idle_timeout_secs < self.heartbeat_interval_secs {
            return Err(RelayError::ConfigError(
                "idle_timeout_secs must be >= heartbeat_interval_secs".into(),
            ));
        }
        if self.max_message_size == 0 || self.max_frame_size == 0 {
            return Err(RelayError::ConfigError("message and frame sizes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.channel, "telemetry_channel");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.point_write_timeout(), Duration::from_secs(5));
        assert!(!config.notify_malformed_payloads);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig = serde_json::from_str(r#"{"idle_timeout_secs": 90}"#).unwrap();
        assert_eq!(config.idle_timeout_secs, 90);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_timings() {
        let config = RelayConfig {
            point_write_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            idle_timeout_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_policy() {
        let open = RelayConfig::default();
        assert!(open.origin_allowed(Some("http://evil.example")));

        let locked = RelayConfig {
            allowed_origins: vec!["http://localhost:3000".into()],
            ..Default::default()
        };
        assert!(locked.origin_allowed(Some("http://localhost:3000")));
        assert!(!locked.origin_allowed(Some("http://evil.example")));
        assert!(locked.origin_allowed(None));
    }
}
