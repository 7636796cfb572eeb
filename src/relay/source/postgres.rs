//! Postgres `LISTEN`/`NOTIFY` source.
//!
//! Each lease is a `PgListener` holding one connection taken from the
//! shared pool. `try_recv` is used instead of `recv` because `recv`
//! silently reconnects; a lost connection must end the session.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool};
use tracing::debug;

use super::{NotificationLease, NotificationPool, Upstream};
use crate::relay::errors::{RelayError, RelayResult};
use crate::relay::lifecycle::CancelScope;

/// Notification pool backed by a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgNotificationPool {
    pool: PgPool,
}

impl PgNotificationPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationPool for PgNotificationPool {
    async fn subscribe(&self, channel: &str) -> RelayResult<Box<dyn NotificationLease>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| RelayError::Acquire(e.to_string()))?;

        listener
            .listen(channel)
            .await
            .map_err(|e| RelayError::Subscribe {
                channel: channel.to_string(),
                reason: e.to_string(),
            })?;

        debug!(channel, "upstream lease subscribed");
        Ok(Box::new(PgLease { listener }))
    }

    fn leases_in_use(&self) -> usize {
        let size = self.pool.size() as usize;
        size.saturating_sub(self.pool.num_idle())
    }
}

struct PgLease {
    listener: PgListener,
}

#[async_trait]
impl NotificationLease for PgLease {
    async fn next(&mut self, scope: &CancelScope) -> RelayResult<Upstream> {
        tokio::select! {
            biased;
            _ = scope.cancelled() => Ok(Upstream::Cancelled),
            received = self.listener.try_recv() => match received {
                Ok(Some(notification)) => {
                    Ok(Upstream::Notification(notification.payload().to_string()))
                }
                Ok(None) => Err(RelayError::UpstreamClosed),
                Err(e) => Err(RelayError::Upstream(e.to_string())),
            },
        }
    }

    async fn release(mut self: Box<Self>) {
        if let Err(e) = self.listener.unlisten_all().await {
            debug!(error = %e, "unlisten failed, connection returned as-is");
        }
    }
}
