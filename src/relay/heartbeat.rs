//! # Heartbeat Supervisor
//!
//! Sends a ping every `heartbeat_interval` while the session runs. A ping
//! that cannot be written within `ping_write_timeout` cancels the session.
//! Acknowledgments are observed by the disconnect detector, which owns the
//! idle-read deadline.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::Sink;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::lifecycle::{CancelScope, CloseReason};
use super::transport::ClientWriter;

/// Ping timing
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatTiming {
    pub interval: Duration,
    pub write_timeout: Duration,
}

/// Run until the scope is cancelled; cancels it on ping failure
pub async fn supervise<S, E>(writer: &ClientWriter<S>, scope: &CancelScope, timing: HeartbeatTiming)
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut ticker = interval_at(Instant::now() + timing.interval, timing.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            _ = ticker.tick() => {
                // a ping stuck behind a slow client must not hold up close
                let sent = tokio::select! {
                    biased;
                    _ = scope.cancelled() => return,
                    sent = writer.ping(timing.write_timeout) => sent,
                };
                match sent {
                    Ok(()) => debug!("heartbeat sent"),
                    Err(e) => {
                        warn!(error = %e, "heartbeat failed");
                        scope.cancel(CloseReason::Heartbeat(e));
                        return;
                    }
                }
            }
        }
    }
}
