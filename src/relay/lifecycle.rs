//! # Session Lifecycle
//!
//! Shared cancellation scope, close reasons, and session state.
//!
//! A session's three tasks share one [`CancelScope`]. The first task to
//! cancel it records the [`CloseReason`]; later attempts are no-ops. The
//! scope is a child of the relay's root token, so relay shutdown cancels
//! every session without any task having to notice first.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::errors::RelayError;
use super::message::OutboundMessage;

/// Session state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Closing)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Active, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Client sent a close frame or the stream ended
    ClientClosed,
    /// No client activity within the idle window
    IdleTimeout,
    /// Relay is shutting down
    Shutdown,
    /// Liveness ping could not be written
    Heartbeat(RelayError),
    /// Read or write on the client transport failed
    Transport(RelayError),
    /// Leasing, subscribing, or listening upstream failed
    Upstream(RelayError),
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Heartbeat(_) => "heartbeat_failed",
            CloseReason::Transport(_) => "transport_failed",
            CloseReason::Upstream(_) => "upstream_failed",
        }
    }

    /// Close code carried by the close frame
    pub fn close_code(&self) -> u16 {
        match self {
            CloseReason::ClientClosed => 1000,
            CloseReason::IdleTimeout | CloseReason::Shutdown => 1001,
            CloseReason::Heartbeat(e) | CloseReason::Transport(e) | CloseReason::Upstream(e) => {
                e.close_code()
            }
        }
    }

    /// Error frame owed to the client before closing, if any.
    ///
    /// Only upstream failures are reported. Client-side failures have
    /// no healthy transport left to report on.
    pub fn error_frame(&self) -> Option<OutboundMessage> {
        match self {
            CloseReason::Upstream(e) => Some(OutboundMessage::error(e)),
            _ => None,
        }
    }

    /// Whether the client caused the close
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            CloseReason::ClientClosed
                | CloseReason::IdleTimeout
                | CloseReason::Heartbeat(_)
                | CloseReason::Transport(_)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Heartbeat(e) | CloseReason::Transport(e) | CloseReason::Upstream(e) => {
                write!(f, "{}: {}", self.as_str(), e)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Cancellation scope shared by the tasks of one session
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
    reason: Arc<OnceLock<CloseReason>>,
}

impl CancelScope {
    /// Create a root scope
    pub fn new() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Create a scope cancelled together with `parent`
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self::from_token(parent.child_token())
    }

    fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Cancel the scope.
    ///
    /// Returns true for the call that actually recorded the reason.
    pub fn cancel(&self, reason: CloseReason) -> bool {
        if self.token.is_cancelled() {
            // parent shutdown got here first without recording anything
            let _ = self.reason.set(CloseReason::Shutdown);
        }
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Recorded reason, `Shutdown` if only the parent was cancelled
    pub fn reason(&self) -> Option<CloseReason> {
        match self.reason.get() {
            Some(reason) => Some(reason.clone()),
            None if self.token.is_cancelled() => Some(CloseReason::Shutdown),
            None => None,
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Time of the last client activity, shared between the detector and
/// whoever wants to inspect it
#[derive(Debug, Clone)]
pub struct Liveness {
    last_seen: Arc<Mutex<Instant>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            last_seen: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record client activity
    pub fn touch(&self) {
        let mut last = self.last_seen.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Instant after which the client counts as dead
    pub fn deadline(&self, idle_timeout: Duration) -> Instant {
        self.last_seen() + idle_timeout
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_are_forward_only() {
        assert!(SessionState::Connecting.can_advance_to(SessionState::Active));
        assert!(SessionState::Connecting.can_advance_to(SessionState::Closed));
        assert!(SessionState::Active.can_advance_to(SessionState::Closing));
        assert!(SessionState::Closing.can_advance_to(SessionState::Closed));

        assert!(!SessionState::Active.can_advance_to(SessionState::Connecting));
        assert!(!SessionState::Closed.can_advance_to(SessionState::Active));
        assert!(!SessionState::Active.can_advance_to(SessionState::Closed));
    }

    #[test]
    fn test_first_cancel_wins() {
        let scope = CancelScope::new();
        let other = scope.clone();

        assert!(scope.cancel(CloseReason::ClientClosed));
        assert!(!other.cancel(CloseReason::IdleTimeout));
        assert!(!scope.cancel(CloseReason::Transport(RelayError::WriteTimeout)));

        assert!(other.is_cancelled());
        assert!(matches!(scope.reason(), Some(CloseReason::ClientClosed)));
    }

    #[test]
    fn test_parent_cancel_reads_as_shutdown() {
        let root = CancellationToken::new();
        let scope = CancelScope::child_of(&root);
        assert!(scope.reason().is_none());

        root.cancel();
        assert!(scope.is_cancelled());
        assert!(matches!(scope.reason(), Some(CloseReason::Shutdown)));

        // a late client close does not rewrite history
        assert!(!scope.cancel(CloseReason::ClientClosed));
        assert!(matches!(scope.reason(), Some(CloseReason::Shutdown)));
    }

    #[test]
    fn test_child_cancel_leaves_parent_alone() {
        let root = CancellationToken::new();
        let a = CancelScope::child_of(&root);
        let b = CancelScope::child_of(&root);

        a.cancel(CloseReason::ClientClosed);
        assert!(!root.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_only_upstream_failures_produce_error_frames() {
        let upstream = CloseReason::Upstream(RelayError::Acquire("x".into()));
        assert!(upstream.error_frame().is_some());
        assert_eq!(upstream.close_code(), 1011);

        assert!(CloseReason::ClientClosed.error_frame().is_none());
        assert!(CloseReason::IdleTimeout.error_frame().is_none());
        assert!(CloseReason::Transport(RelayError::WriteTimeout).error_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_deadline_moves_on_touch() {
        let liveness = Liveness::new();
        let idle = Duration::from_secs(60);
        let first = liveness.deadline(idle);

        tokio::time::advance(Duration::from_secs(25)).await;
        liveness.touch();

        assert_eq!(liveness.deadline(idle) - first, Duration::from_secs(25));
    }
}
