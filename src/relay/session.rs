//! # Session Coordinator
//!
//! Runs the three tasks of one session (dispatcher, heartbeat, disconnect
//! detector) concurrently under one cancellation scope and joins them
//! before returning. Nothing outlives the session: when this future
//! completes, the lease is back in its pool and the transport is closed.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::{Sink, Stream};
use uuid::Uuid;

use super::config::RelayConfig;
use super::detector;
use super::dispatcher::Dispatcher;
use super::filter::SessionFilter;
use super::heartbeat::{self, HeartbeatTiming};
use super::lifecycle::{CancelScope, CloseReason, Liveness};
use super::source::NotificationPool;
use super::transport::ClientWriter;
use crate::observability::RelayMetrics;

/// How a session ended
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub id: Uuid,
    pub reason: CloseReason,
    pub reached_active: bool,
    pub points_sent: u64,
}

/// Everything a session borrows from its relay
pub(crate) struct SessionContext<'a> {
    pub pool: &'a dyn NotificationPool,
    pub config: &'a RelayConfig,
    pub metrics: &'a RelayMetrics,
}

/// Run one session to completion
pub(crate) async fn run<S, E, R, F>(
    id: Uuid,
    filter: SessionFilter,
    sink: S,
    mut inbound: R,
    scope: CancelScope,
    ctx: SessionContext<'_>,
) -> SessionOutcome
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
    R: Stream<Item = Result<Message, F>> + Unpin,
    F: Display,
{
    let writer = ClientWriter::new(sink);
    let liveness = Liveness::new();
    let timing = HeartbeatTiming {
        interval: ctx.config.heartbeat_interval(),
        write_timeout: ctx.config.ping_write_timeout(),
    };

    ctx.metrics.session_started();

    let dispatcher = Dispatcher::new(
        &filter,
        &writer,
        &scope,
        ctx.pool,
        ctx.config,
        ctx.metrics,
    );

    let (summary, (), ()) = tokio::join!(
        dispatcher.run(),
        heartbeat::supervise(&writer, &scope, timing),
        detector::watch(&mut inbound, &scope, &liveness, ctx.config.idle_timeout()),
    );

    let reason = scope.reason().unwrap_or(CloseReason::Shutdown);
    // the dispatcher closed it already; this is a no-op unless it could not
    writer
        .close(reason.close_code(), reason.as_str(), ctx.config.point_write_timeout())
        .await;

    ctx.metrics.session_finished(&reason);

    SessionOutcome {
        id,
        reason,
        reached_active: summary.reached_active,
        points_sent: summary.points_sent,
    }
}
