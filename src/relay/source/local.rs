//! In-process notification feed.
//!
//! Payloads published here reach every subscribed lease, exactly like a
//! `NOTIFY` reaches every connection that ran `LISTEN`. Leases are
//! semaphore permits, so the pool bounds concurrent sessions the same way
//! a database pool does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use super::{NotificationLease, NotificationPool, Upstream};
use crate::relay::errors::{RelayError, RelayResult};
use crate::relay::lifecycle::CancelScope;

const DEFAULT_CAPACITY: usize = 1024;

/// In-process feed with a bounded number of leases
#[derive(Debug, Clone)]
pub struct LocalFeed {
    channel: String,
    tx: broadcast::Sender<String>,
    leases: Arc<Semaphore>,
    max_leases: usize,
    acquire_timeout: Duration,
}

impl LocalFeed {
    /// Create a feed for `channel` allowing `max_leases` concurrent subscribers
    pub fn new(channel: impl Into<String>, max_leases: usize, acquire_timeout: Duration) -> Self {
        let (tx, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self {
            channel: channel.into(),
            tx,
            leases: Arc::new(Semaphore::new(max_leases)),
            max_leases,
            acquire_timeout,
        }
    }

    /// Publish a payload; returns how many leases will see it
    pub fn publish(&self, payload: impl Into<String>) -> usize {
        self.tx.send(payload.into()).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationPool for LocalFeed {
    async fn subscribe(&self, channel: &str) -> RelayResult<Box<dyn NotificationLease>> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.leases).acquire_owned(),
        )
        .await
        .map_err(|_| RelayError::Acquire("timed out waiting for a free lease".to_string()))?
        .map_err(|e| RelayError::Acquire(e.to_string()))?;

        if channel != self.channel {
            return Err(RelayError::Subscribe {
                channel: channel.to_string(),
                reason: format!("feed only carries {}", self.channel),
            });
        }

        Ok(Box::new(LocalLease {
            rx: self.tx.subscribe(),
            _permit: permit,
        }))
    }

    fn leases_in_use(&self) -> usize {
        self.max_leases - self.leases.available_permits()
    }
}

struct LocalLease {
    rx: broadcast::Receiver<String>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl NotificationLease for LocalLease {
    async fn next(&mut self, scope: &CancelScope) -> RelayResult<Upstream> {
        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => return Ok(Upstream::Cancelled),
                received = self.rx.recv() => match received {
                    Ok(payload) => return Ok(Upstream::Notification(payload)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "local feed lagged, notifications dropped");
                    }
                    Err(RecvError::Closed) => return Err(RelayError::UpstreamClosed),
                },
            }
        }
    }

    async fn release(self: Box<Self>) {
        // dropping the permit returns the lease
    }
}
