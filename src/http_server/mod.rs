//! # HTTP Server Module
//!
//! axum front end of the relay.
//!
//! # Endpoints
//!
//! - `/live-trend` - WebSocket telemetry stream
//! - `/relay/stats` - Relay sessions and counters
//! - `/stats` - Telemetry row count (when a database is configured)
//! - `/kpis`, `/trend`, `/distribution` - Per-vehicle aggregates over a
//!   time window (when a database is configured)
//! - `/health` - Health check

pub mod analytics_routes;
pub mod config;
pub mod live_trend_routes;
pub mod observability_routes;
pub mod server;
pub mod stats_routes;

pub use config::HttpServerConfig;
pub use server::HttpServer;
