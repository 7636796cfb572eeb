//! # Event Source Adapter
//!
//! A session leases one exclusive upstream connection, subscribes it to
//! the notification channel, and pulls raw payloads from it until the
//! session's scope is cancelled. The lease is owned by the session
//! dispatcher alone and goes back to the pool when it is released or
//! dropped.
//!
//! - [`postgres`]: `LISTEN`/`NOTIFY` over a `sqlx` Postgres pool
//! - [`local`]: in-process feed with the same leasing semantics

pub mod local;
pub mod postgres;

use async_trait::async_trait;

use super::errors::RelayResult;
use super::lifecycle::CancelScope;

pub use local::LocalFeed;
pub use postgres::PgNotificationPool;

/// Outcome of waiting on a lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    /// A raw payload, not yet decoded
    Notification(String),
    /// The session's scope was cancelled while waiting
    Cancelled,
}

/// Pool of upstream connections that can be subscribed to a channel
#[async_trait]
pub trait NotificationPool: Send + Sync {
    /// Lease one connection and `LISTEN` on `channel`
    async fn subscribe(&self, channel: &str) -> RelayResult<Box<dyn NotificationLease>>;

    /// Connections currently leased out
    fn leases_in_use(&self) -> usize;
}

/// One exclusively leased, subscribed upstream connection
#[async_trait]
pub trait NotificationLease: Send {
    /// Wait for the next payload or for cancellation, whichever is first
    async fn next(&mut self, scope: &CancelScope) -> RelayResult<Upstream>;

    /// Unsubscribe and return the connection to its pool
    async fn release(self: Box<Self>);
}
