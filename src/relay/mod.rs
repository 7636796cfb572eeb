//! # Telemetry Relay
//!
//! Bridges one upstream change-notification channel to any number of
//! streaming clients, each with its own filter and lifecycle.
//!
//! ## Architecture
//!
//! - **Source**: leases one upstream connection per session and yields raw payloads
//! - **Filter**: projects a decoded event onto a session's vehicle and metric
//! - **Heartbeat**: periodic ping with a write deadline
//! - **Detector**: reads client frames only to notice closure or silence
//! - **Dispatcher**: the session state machine and sole writer of data frames
//! - **Session**: runs the three tasks under one cancellation scope
//!
//! Sessions share nothing mutable with each other. The pool bounds how
//! many can be active at once.

pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod filter;
pub mod heartbeat;
pub mod lifecycle;
pub mod message;
pub mod metric;
pub mod session;
pub mod source;
pub mod transport;

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, Stream, StreamExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub use config::RelayConfig;
pub use errors::{RelayError, RelayResult};
pub use event::UpstreamEvent;
pub use filter::{LiveTrendParams, SessionFilter};
pub use lifecycle::{CancelScope, CloseReason, SessionState};
pub use message::OutboundMessage;
pub use metric::Metric;
pub use session::SessionOutcome;
pub use source::{LocalFeed, NotificationLease, NotificationPool, PgNotificationPool, Upstream};

use crate::observability::{MetricsSnapshot, RelayMetrics};
use session::SessionContext;

/// Live relay state, as served by `/relay/stats`
#[derive(Debug, Clone, Serialize)]
pub struct RelayStats {
    pub channel: String,
    pub started_at: DateTime<Utc>,
    pub active_sessions: u64,
    pub leases_in_use: usize,
    pub shutting_down: bool,
    pub metrics: MetricsSnapshot,
}

/// The relay
pub struct Relay {
    config: RelayConfig,
    pool: Arc<dyn NotificationPool>,
    metrics: Arc<RelayMetrics>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
    started_at: DateTime<Utc>,
}

impl Relay {
    /// Create a relay over an upstream pool
    pub fn new(config: RelayConfig, pool: Arc<dyn NotificationPool>) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool,
            metrics: Arc::new(RelayMetrics::new()),
            shutdown: CancellationToken::new(),
            sessions: TaskTracker::new(),
            started_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Upstream connections currently leased by sessions
    pub fn leases_in_use(&self) -> usize {
        self.pool.leases_in_use()
    }

    /// Validate a streaming request before the upgrade.
    ///
    /// Nothing is allocated for the session until this succeeds.
    pub fn admit(&self, params: &LiveTrendParams, origin: Option<&str>) -> RelayResult<SessionFilter> {
        let admitted = if self.config.origin_allowed(origin) {
            SessionFilter::from_params(params)
        } else {
            Err(RelayError::OriginRejected(origin.unwrap_or_default().to_string()))
        };

        if let Err(e) = &admitted {
            self.metrics.increment_sessions_rejected();
            warn!(error = %e, "stream request rejected");
        }
        admitted
    }

    /// Serve one upgraded WebSocket
    pub async fn serve_socket(&self, socket: WebSocket, filter: SessionFilter) -> SessionOutcome {
        let (sink, inbound) = socket.split();
        self.serve_session(filter, sink, inbound).await
    }

    /// Serve one session over any frame sink and stream
    pub async fn serve_session<S, E, R, F>(
        &self,
        filter: SessionFilter,
        sink: S,
        inbound: R,
    ) -> SessionOutcome
    where
        S: Sink<Message, Error = E> + Unpin,
        E: Display,
        R: Stream<Item = Result<Message, F>> + Unpin,
        F: Display,
    {
        let id = Uuid::new_v4();
        let span = info_span!(
            "session",
            id = %id,
            vehicle = %filter.vehicle_label(),
            metric = %filter.metric,
        );
        let scope = CancelScope::child_of(&self.shutdown);
        let ctx = SessionContext {
            pool: self.pool.as_ref(),
            config: &self.config,
            metrics: &self.metrics,
        };

        let session = async move {
            info!("client connected");
            session::run(id, filter, sink, inbound, scope, ctx).await
        };
        self.sessions.track_future(session.instrument(span)).await
    }

    /// Cancel every session; new sessions close immediately
    pub fn shutdown(&self) {
        info!("relay shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait for running sessions to finish closing.
    ///
    /// Returns false if some were still running when `grace` ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.sessions.close();
        let drained = tokio::time::timeout(grace, self.sessions.wait()).await.is_ok();
        if !drained {
            warn!(remaining = self.sessions.len(), "sessions still closing after grace period");
        }
        drained
    }

    /// Snapshot of relay state
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            channel: self.config.channel.clone(),
            started_at: self.started_at,
            active_sessions: self.metrics.active_sessions(),
            leases_in_use: self.leases_in_use(),
            shutting_down: self.is_shutting_down(),
            metrics: self.metrics.snapshot(),
        }
    }
}
