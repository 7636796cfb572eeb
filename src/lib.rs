//! telemetry-relay - real-time telemetry distribution
//!
//! Relays rows announced on a Postgres notification channel to WebSocket
//! clients, each filtered to one vehicle and one metric.

pub mod cli;
pub mod db;
pub mod http_server;
pub mod observability;
pub mod relay;
