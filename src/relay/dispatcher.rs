//! # Session Dispatcher
//!
//! The per-session state machine and the only task that consumes upstream
//! events and writes data frames:
//!
//! ```text
//! CONNECTING --lease+subscribe+connected frame--> ACTIVE
//!     |                                             |
//!     +--------------failure------------+   cancellation / fatal error
//!                                       v           v
//!                                     CLOSING ----> CLOSED
//! ```
//!
//! Points are written in the order the upstream delivered their events;
//! there is one consumer and no buffering between it and the socket.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::Sink;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::RelayConfig;
use super::event::UpstreamEvent;
use super::filter::SessionFilter;
use super::lifecycle::{CancelScope, CloseReason, SessionState};
use super::message::OutboundMessage;
use super::source::{NotificationLease, NotificationPool, Upstream};
use super::transport::ClientWriter;
use crate::observability::RelayMetrics;

/// What a finished dispatcher reports back to the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Whether the session ever reached ACTIVE
    pub reached_active: bool,
    /// Point frames written
    pub points_sent: u64,
}

/// Per-session dispatcher
pub struct Dispatcher<'a, S> {
    filter: &'a SessionFilter,
    writer: &'a ClientWriter<S>,
    scope: &'a CancelScope,
    pool: &'a dyn NotificationPool,
    config: &'a RelayConfig,
    metrics: &'a RelayMetrics,
    state: SessionState,
    summary: DispatchSummary,
}

impl<'a, S, E> Dispatcher<'a, S>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    pub fn new(
        filter: &'a SessionFilter,
        writer: &'a ClientWriter<S>,
        scope: &'a CancelScope,
        pool: &'a dyn NotificationPool,
        config: &'a RelayConfig,
        metrics: &'a RelayMetrics,
    ) -> Self {
        Self {
            filter,
            writer,
            scope,
            pool,
            config,
            metrics,
            state: SessionState::Connecting,
            summary: DispatchSummary::default(),
        }
    }

    /// Drive the session from CONNECTING to CLOSED
    pub async fn run(mut self) -> DispatchSummary {
        if let Some(mut lease) = self.connect().await {
            self.stream(lease.as_mut()).await;
            self.advance(SessionState::Closing);
            self.release(lease).await;
        } else {
            self.advance(SessionState::Closing);
        }

        self.close().await;
        self.summary
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }

    /// CONNECTING: lease, subscribe, announce
    async fn connect(&mut self) -> Option<Box<dyn NotificationLease>> {
        let subscribed = tokio::select! {
            biased;
            _ = self.scope.cancelled() => return None,
            subscribed = self.pool.subscribe(&self.config.channel) => subscribed,
        };

        let lease = match subscribed {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "upstream acquisition failed");
                self.scope.cancel(CloseReason::Upstream(e));
                return None;
            }
        };

        // cancelled while subscribing: never announce
        if self.scope.is_cancelled() {
            self.release(lease).await;
            return None;
        }

        let connected = OutboundMessage::connected(self.filter);
        if let Err(e) = self
            .writer
            .send(&connected, self.config.point_write_timeout())
            .await
        {
            self.scope.cancel(CloseReason::Transport(e));
            self.release(lease).await;
            return None;
        }

        self.advance(SessionState::Active);
        self.summary.reached_active = true;
        self.metrics.increment_sessions_opened();
        info!("session active");
        Some(lease)
    }

    /// Hand the lease back, dropping it if the upstream stops answering
    async fn release(&self, lease: Box<dyn NotificationLease>) {
        let deadline = self.config.point_write_timeout();
        if timeout(deadline, lease.release()).await.is_err() {
            warn!(timeout = ?deadline, "lease release timed out, dropping connection");
        }
    }

    /// ACTIVE: relay events until cancelled or a fatal error
    async fn stream(&mut self, lease: &mut dyn NotificationLease) {
        loop {
            let payload = match lease.next(self.scope).await {
                Ok(Upstream::Notification(payload)) => payload,
                Ok(Upstream::Cancelled) => return,
                Err(e) => {
                    warn!(error = %e, "upstream wait failed");
                    self.scope.cancel(CloseReason::Upstream(e));
                    return;
                }
            };

            let event = match UpstreamEvent::decode(&payload) {
                Ok(event) => event,
                Err(e) => {
                    self.metrics.increment_payloads_malformed();
                    warn!(payload = %payload, error = %e, "skipping malformed payload");
                    if self.config.notify_malformed_payloads
                        && !self.write(&OutboundMessage::error(&e)).await
                    {
                        return;
                    }
                    continue;
                }
            };

            let Some(point) = self.filter.project(&event) else {
                self.metrics.increment_events_filtered();
                continue;
            };

            if !self.write(&OutboundMessage::point(point)).await {
                return;
            }
            self.summary.points_sent += 1;
            self.metrics.increment_points_sent();
        }
    }

    /// Write one frame; on failure cancel the scope and return false
    async fn write(&mut self, message: &OutboundMessage) -> bool {
        if self.scope.is_cancelled() {
            return false;
        }
        match self
            .writer
            .send(message, self.config.point_write_timeout())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "client write failed");
                self.scope.cancel(CloseReason::Transport(e));
                false
            }
        }
    }

    /// CLOSING: report, close the transport, reach CLOSED
    async fn close(&mut self) {
        // every path here has cancelled already; this only guards new ones
        self.scope.cancel(CloseReason::Shutdown);
        let reason = self.scope.reason().unwrap_or(CloseReason::Shutdown);
        let deadline = self.config.point_write_timeout();

        if let Some(frame) = reason.error_frame() {
            let _ = self.writer.send(&frame, deadline).await;
        }
        self.writer
            .close(reason.close_code(), reason.as_str(), deadline)
            .await;

        self.advance(SessionState::Closed);
        if reason.is_client_side() || matches!(reason, CloseReason::Shutdown) {
            info!(reason = %reason, points = self.summary.points_sent, "session closed");
        } else {
            warn!(reason = %reason, points = self.summary.points_sent, "session closed");
        }
    }
}
