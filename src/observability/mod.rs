//! Observability subsystem
//!
//! - Structured logging through `tracing` (JSON or pretty)
//! - Relay counters exposed at `/relay/stats`

mod logger;
mod metrics;

pub use logger::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{MetricsSnapshot, RelayMetrics};
