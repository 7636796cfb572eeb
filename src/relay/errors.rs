//! # Relay Errors
//!
//! Error taxonomy for the telemetry relay.
//!
//! Errors fall into four groups:
//! - admission (rejected before the upgrade, no session exists)
//! - acquisition (no upstream lease, one error frame then close)
//! - transient payload (skipped, session stays active)
//! - fatal I/O (session closes, nothing is retried)

use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    // ==================
    // Admission Errors
    // ==================
    /// Requested metric is not one of the supported set
    #[error("unsupported metric: {0}")]
    UnsupportedMetric(String),

    /// Origin header not in the allowed list
    #[error("origin not allowed: {0}")]
    OriginRejected(String),

    // ==================
    // Acquisition Errors
    // ==================
    /// Could not lease a connection from the upstream pool
    #[error("failed to acquire upstream connection: {0}")]
    Acquire(String),

    /// Leased a connection but LISTEN failed
    #[error("failed to subscribe to channel {channel}: {reason}")]
    Subscribe { channel: String, reason: String },

    // ==================
    // Upstream Errors
    // ==================
    /// Waiting for the next notification failed
    #[error("upstream listen error: {0}")]
    Upstream(String),

    /// Upstream connection went away
    #[error("upstream connection lost")]
    UpstreamClosed,

    /// Payload could not be decoded as a telemetry event
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),

    // ==================
    // Transport Errors
    // ==================
    /// A write did not complete before its deadline
    #[error("write deadline exceeded")]
    WriteTimeout,

    /// A write failed
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Reading from the client failed
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// Client transport has already been closed
    #[error("transport closed")]
    TransportClosed,

    /// Encoding an outbound frame failed
    #[error("encode error: {0}")]
    Encode(String),

    // ==================
    // Internal Errors
    // ==================
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RelayError {
    /// Returns the close code for WebSocket
    pub fn close_code(&self) -> u16 {
        match self {
            RelayError::UnsupportedMetric(_) => 4000,
            RelayError::OriginRejected(_) => 4003,
            RelayError::Acquire(_) => 1011,
            RelayError::Subscribe { .. } => 1011,
            RelayError::Upstream(_) => 1011,
            RelayError::UpstreamClosed => 1011,
            RelayError::MalformedPayload(_) => 1007,
            RelayError::WriteTimeout => 1001,
            RelayError::WriteFailed(_) => 1001,
            RelayError::ReadFailed(_) => 1002,
            RelayError::TransportClosed => 1000,
            RelayError::Encode(_) => 1011,
            RelayError::ConfigError(_) => 1011,
        }
    }

    /// Text sent to the client in an error frame
    pub fn client_message(&self) -> String {
        match self {
            RelayError::UnsupportedMetric(m) => format!("unsupported metric: {}", m),
            RelayError::OriginRejected(_) => "origin not allowed".to_string(),
            RelayError::Acquire(_) => "database connection failed".to_string(),
            RelayError::Subscribe { .. } => "failed to subscribe to updates".to_string(),
            RelayError::Upstream(_) | RelayError::UpstreamClosed => {
                "database listen error".to_string()
            }
            RelayError::MalformedPayload(_) => "invalid telemetry data received".to_string(),
            other => other.to_string(),
        }
    }

    /// Admission errors are reported as HTTP responses, never over the socket
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            RelayError::UnsupportedMetric(_) | RelayError::OriginRejected(_)
        )
    }
}
