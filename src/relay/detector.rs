//! # Disconnect Detector
//!
//! Reads inbound frames only to learn that the client is alive or gone.
//! Data frames are ignored. Every frame counts as activity and pushes the
//! idle-read deadline forward; silence past the deadline, a close frame,
//! end of stream, or a read error cancels the session.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use tokio::time::timeout_at;
use tracing::{debug, trace};

use super::errors::RelayError;
use super::lifecycle::{CancelScope, CloseReason, Liveness};

/// Run until the scope is cancelled or the client is found gone
pub async fn watch<R, E>(
    inbound: &mut R,
    scope: &CancelScope,
    liveness: &Liveness,
    idle_timeout: Duration,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let deadline = liveness.deadline(idle_timeout);

        let frame = tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            frame = timeout_at(deadline, inbound.next()) => frame,
        };

        let reason = match frame {
            Err(_) => {
                debug!(idle_secs = idle_timeout.as_secs(), "client idle, closing");
                CloseReason::IdleTimeout
            }
            Ok(None) => CloseReason::ClientClosed,
            Ok(Some(Err(e))) => CloseReason::Transport(RelayError::ReadFailed(e.to_string())),
            Ok(Some(Ok(Message::Close(frame)))) => {
                debug!(code = frame.as_ref().map(|f| f.code), "client sent close");
                CloseReason::ClientClosed
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                trace!("heartbeat acknowledged");
                liveness.touch();
                continue;
            }
            Ok(Some(Ok(_))) => {
                // pings and stray data frames still prove the client is there
                liveness.touch();
                continue;
            }
        };

        scope.cancel(reason);
        return;
    }
}
