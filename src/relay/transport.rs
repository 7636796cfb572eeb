//! # Client Transport
//!
//! Write half of a client connection, shared by the dispatcher (data
//! frames) and the heartbeat supervisor (pings).
//!
//! Every write carries a deadline; a slow client is dropped rather than
//! buffered for. The sink lives in a `Mutex<Option<_>>` and `close` takes
//! it out, so the transport is released exactly once however many tasks
//! race to close it.

use std::borrow::Cow;
use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::errors::{RelayError, RelayResult};
use super::message::OutboundMessage;

/// Deadline-bounded, close-once writer over a frame sink
pub struct ClientWriter<S> {
    sink: Mutex<Option<S>>,
}

impl<S, E> ClientWriter<S>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    /// Write one outbound message
    pub async fn send(&self, message: &OutboundMessage, deadline: Duration) -> RelayResult<()> {
        let frame = message.to_frame()?;
        self.write(frame, deadline).await
    }

    /// Write a liveness ping
    pub async fn ping(&self, deadline: Duration) -> RelayResult<()> {
        self.write(Message::Ping(Vec::new()), deadline).await
    }

    async fn write(&self, frame: Message, deadline: Duration) -> RelayResult<()> {
        // the lock wait counts against the deadline too
        let write = async {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(RelayError::TransportClosed)?;
            sink.send(frame)
                .await
                .map_err(|e| RelayError::WriteFailed(e.to_string()))
        };

        match timeout(deadline, write).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::WriteTimeout),
        }
    }

    /// Send a close frame and release the sink.
    ///
    /// Returns true for the one call that released it; every other call
    /// is a no-op.
    pub async fn close(&self, code: u16, reason: &str, deadline: Duration) -> bool {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return false;
        };

        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        }));
        // best effort, the peer may already be gone
        let _ = timeout(deadline, sink.send(frame)).await;
        let _ = timeout(deadline, sink.close()).await;
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.sink.lock().await.is_none()
    }
}
