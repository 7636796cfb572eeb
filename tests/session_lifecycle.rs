//! Session Lifecycle Tests
//!
//! Drives whole sessions through `Relay::serve_session` over in-memory
//! transports and the in-process feed:
//! - every session returns its lease, however it ends
//! - acknowledged heartbeats keep a session alive; silence ends it
//! - points arrive filtered and in upstream order
//! - malformed payloads are skipped without ending the session
//! - acquisition failure, slow clients, and shutdown close cleanly

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use telemetry_relay::relay::{
    CancelScope, CloseReason, LiveTrendParams, LocalFeed, NotificationLease, NotificationPool,
    Relay, RelayConfig, RelayError, RelayResult, SessionOutcome, Upstream,
};

// =============================================================================
// Test Utilities
// =============================================================================

const CHANNEL: &str = "telemetry_channel";

fn relay_with(max_leases: usize, config: RelayConfig) -> (Arc<Relay>, Arc<LocalFeed>) {
    let feed = Arc::new(LocalFeed::new(CHANNEL, max_leases, Duration::from_secs(5)));
    let relay = Relay::new(config, feed.clone()).unwrap();
    (Arc::new(relay), feed)
}

fn relay(max_leases: usize) -> (Arc<Relay>, Arc<LocalFeed>) {
    relay_with(max_leases, RelayConfig::default())
}

fn event(vehicle: &str, time: &str, field: &str, value: f64) -> String {
    let mut event = json!({"vehicle_id": vehicle, "time_iso": time});
    event[field] = json!(value);
    event.to_string()
}

struct TestClient {
    frames: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Result<Message, String>>,
    session: JoinHandle<SessionOutcome>,
}

fn connect(relay: &Arc<Relay>, vehicle: Option<&str>, metric: &str) -> TestClient {
    let params = LiveTrendParams {
        vehicle_id: vehicle.map(String::from),
        metric: Some(metric.to_string()),
    };
    let filter = relay.admit(&params, None).unwrap();

    let (sink, frames) = mpsc::unbounded();
    let (inbound, stream) = mpsc::unbounded();
    let relay = relay.clone();
    let session = tokio::spawn(async move { relay.serve_session(filter, sink, stream).await });

    TestClient {
        frames,
        inbound,
        session,
    }
}

impl TestClient {
    /// Next frame that is not a heartbeat
    async fn next_frame(&mut self) -> Option<Message> {
        loop {
            match self.frames.next().await {
                Some(Message::Ping(_)) => continue,
                other => return other,
            }
        }
    }

    async fn next_json(&mut self) -> Value {
        match self.next_frame().await {
            Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    async fn expect_close(&mut self) -> u16 {
        match self.next_frame().await {
            Some(Message::Close(Some(frame))) => frame.code,
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    async fn expect_connected(&mut self) {
        assert_eq!(self.next_json().await["type"], "connected");
    }

    /// Hang up and wait for the session to finish
    async fn hang_up(self) -> SessionOutcome {
        drop(self.inbound);
        self.session.await.unwrap()
    }
}

/// Upstream whose connections never acknowledge `UNLISTEN`
struct UnresponsivePool {
    leased: Arc<AtomicUsize>,
}

struct UnresponsiveLease {
    leased: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationPool for UnresponsivePool {
    async fn subscribe(&self, _channel: &str) -> RelayResult<Box<dyn NotificationLease>> {
        self.leased.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(UnresponsiveLease {
            leased: self.leased.clone(),
        }))
    }

    fn leases_in_use(&self) -> usize {
        self.leased.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationLease for UnresponsiveLease {
    async fn next(&mut self, scope: &CancelScope) -> RelayResult<Upstream> {
        scope.cancelled().await;
        Ok(Upstream::Cancelled)
    }

    async fn release(self: Box<Self>) {
        std::future::pending::<()>().await;
    }
}

impl Drop for UnresponsiveLease {
    fn drop(&mut self) {
        self.leased.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn wait_for_leases(relay: &Relay, expected: usize) {
    while relay.leases_in_use() != expected {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Resource Accounting
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_each_active_session_holds_one_lease() {
    let (relay, _feed) = relay(4);

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = connect(&relay, Some("B183"), "speed");
        client.expect_connected().await;
        clients.push(client);
    }
    assert_eq!(relay.leases_in_use(), 3);
    assert_eq!(relay.stats().active_sessions, 3);

    let outcome = clients.pop().unwrap().hang_up().await;
    assert!(matches!(outcome.reason, CloseReason::ClientClosed));
    assert!(outcome.reached_active);
    assert_eq!(relay.leases_in_use(), 2);

    for client in clients {
        client.hang_up().await;
    }
    assert_eq!(relay.leases_in_use(), 0);
    assert_eq!(relay.stats().active_sessions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cancellation_leaks_nothing() {
    let (relay, feed) = relay(20);

    let mut clients = Vec::new();
    for i in 0..20 {
        let vehicle = format!("B{}", i);
        let mut client = connect(&relay, Some(&vehicle), "speed");
        client.expect_connected().await;
        clients.push(client);
    }
    assert_eq!(relay.leases_in_use(), 20);

    // half hang up while traffic flows and the relay shuts down
    let mut sessions = Vec::new();
    let mut still_open = Vec::new();
    for (i, client) in clients.into_iter().enumerate() {
        if i % 2 == 0 {
            drop(client.inbound);
        } else {
            still_open.push(client.inbound);
        }
        sessions.push(client.session);
    }
    feed.publish(event("B1", "t0", "speed", 1.0));
    relay.shutdown();

    for session in sessions {
        session.await.unwrap();
    }

    let stats = relay.stats();
    assert_eq!(stats.leases_in_use, 0);
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.metrics.sessions_opened, 20);
    assert_eq!(stats.metrics.sessions_closed, 20);
}

// =============================================================================
// Heartbeat and Idle Detection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_acknowledged_heartbeats_keep_session_alive() {
    let (relay, _feed) = relay(1);
    let TestClient {
        mut frames,
        inbound,
        session,
    } = connect(&relay, None, "speed");

    let pings = Arc::new(AtomicUsize::new(0));
    let counter = pings.clone();
    let responder = tokio::spawn(async move {
        while let Some(frame) = frames.next().await {
            if let Message::Ping(payload) = frame {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = inbound.unbounded_send(Ok(Message::Pong(payload)));
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert!(!session.is_finished());
    assert!(pings.load(Ordering::SeqCst) >= 9);

    relay.shutdown();
    let outcome = session.await.unwrap();
    assert!(matches!(outcome.reason, CloseReason::Shutdown));
    responder.await.unwrap();
    assert_eq!(relay.leases_in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_client_is_dropped_after_idle_window() {
    let (relay, _feed) = relay(1);
    let start = Instant::now();
    let mut client = connect(&relay, Some("B183"), "speed");
    client.expect_connected().await;

    // inbound stays open but nothing is ever sent on it
    let outcome = (&mut client.session).await.unwrap();

    assert!(matches!(outcome.reason, CloseReason::IdleTimeout));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(60) && elapsed < Duration::from_secs(61));
    assert_eq!(client.expect_close().await, 1001);
    assert!(client.next_frame().await.is_none());
    assert_eq!(relay.leases_in_use(), 0);
    assert_eq!(relay.metrics().snapshot().idle_timeouts, 1);
}

// =============================================================================
// Filtering and Ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sessions_only_see_their_vehicle_and_metric() {
    let (relay, feed) = relay(2);
    let mut speed = connect(&relay, Some("B183"), "speed");
    let mut temp = connect(&relay, Some("B999"), "temp");
    speed.expect_connected().await;
    temp.expect_connected().await;

    feed.publish(event("B999", "t1", "temp", 81.0));
    feed.publish(event("B183", "t2", "temp", 70.0));
    feed.publish(event("B183", "t3", "speed", 30.2));

    assert_eq!(
        speed.next_json().await,
        json!({"type": "point", "timestamp": "t3", "value": 30.2})
    );
    assert_eq!(
        temp.next_json().await,
        json!({"type": "point", "timestamp": "t1", "value": 81.0})
    );

    relay.shutdown();
    assert_eq!(speed.expect_close().await, 1001);
    assert_eq!(temp.expect_close().await, 1001);
    assert_eq!(speed.hang_up().await.points_sent, 1);
    assert_eq!(temp.hang_up().await.points_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_points_arrive_in_upstream_order() {
    let (relay, feed) = relay(1);
    let mut client = connect(&relay, None, "power");
    client.expect_connected().await;

    for i in 0..50 {
        feed.publish(event("B183", &format!("t{}", i), "power", i as f64));
    }

    for i in 0..50 {
        let point = client.next_json().await;
        assert_eq!(point["timestamp"], format!("t{}", i));
        assert_eq!(point["value"], i as f64);
    }

    let outcome = client.hang_up().await;
    assert_eq!(outcome.points_sent, 50);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_is_skipped() {
    let (relay, feed) = relay(1);
    let mut client = connect(&relay, Some("B183"), "speed");
    client.expect_connected().await;

    feed.publish("{\"vehicle_id\": ");
    feed.publish(r#"{"vehicle_id":"B183","time_iso":"2024-01-01T00:00:00Z","speed":42.5}"#);

    assert_eq!(
        client.next_json().await,
        json!({"type": "point", "timestamp": "2024-01-01T00:00:00Z", "value": 42.5})
    );

    relay.shutdown();
    assert_eq!(client.expect_close().await, 1001);
    assert!(client.next_frame().await.is_none());
    assert_eq!(relay.metrics().snapshot().payloads_malformed, 1);
}

// =============================================================================
// Failure Paths
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_reports_and_closes() {
    let (relay, _feed) = relay(1);
    let mut holder = connect(&relay, Some("B183"), "speed");
    holder.expect_connected().await;

    let start = Instant::now();
    let mut starved = connect(&relay, Some("B183"), "speed");
    assert_eq!(
        starved.next_json().await,
        json!({"type": "error", "error": "database connection failed"})
    );
    assert_eq!(starved.expect_close().await, 1011);
    assert!(start.elapsed() >= Duration::from_secs(5));

    let outcome = starved.hang_up().await;
    assert!(!outcome.reached_active);
    assert!(matches!(
        outcome.reason,
        CloseReason::Upstream(RelayError::Acquire(_))
    ));
    assert_eq!(relay.leases_in_use(), 1);
    assert_eq!(relay.metrics().snapshot().acquisition_failures, 1);

    holder.hang_up().await;
    assert_eq!(relay.leases_in_use(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_client_is_dropped_on_write_deadline() {
    let (relay, feed) = relay(1);
    let params = LiveTrendParams {
        vehicle_id: Some("B183".into()),
        metric: None,
    };
    let filter = relay.admit(&params, None).unwrap();

    // bounded and never drained
    let (sink, _frames) = mpsc::channel::<Message>(1);
    let (_inbound, stream) = mpsc::unbounded::<Result<Message, String>>();
    let session = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.serve_session(filter, sink, stream).await })
    };

    wait_for_leases(&relay, 1).await;
    for i in 0..3 {
        feed.publish(event("B183", &format!("t{}", i), "speed", 1.0));
    }

    let outcome = session.await.unwrap();
    assert!(matches!(
        outcome.reason,
        CloseReason::Transport(RelayError::WriteTimeout)
    ));
    assert_eq!(relay.leases_in_use(), 0);
    assert_eq!(relay.metrics().snapshot().write_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_upstream_does_not_block_close() {
    let leased = Arc::new(AtomicUsize::new(0));
    let pool = UnresponsivePool {
        leased: leased.clone(),
    };
    let relay = Arc::new(Relay::new(RelayConfig::default(), Arc::new(pool)).unwrap());

    let mut client = connect(&relay, Some("B183"), "speed");
    client.expect_connected().await;

    let start = Instant::now();
    client.inbound.close_channel();
    assert_eq!(client.expect_close().await, 1000);
    assert!(start.elapsed() <= Duration::from_secs(5));

    let outcome = client.hang_up().await;
    assert!(matches!(outcome.reason, CloseReason::ClientClosed));
    assert_eq!(leased.load(Ordering::SeqCst), 0);
    assert_eq!(relay.stats().active_sessions, 0);
    assert!(relay.drain(Duration::from_secs(1)).await);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_every_session_going_away() {
    let (relay, _feed) = relay(3);

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = connect(&relay, None, "brake");
        client.expect_connected().await;
        clients.push(client);
    }

    relay.shutdown();
    for mut client in clients {
        assert_eq!(client.expect_close().await, 1001);
        let outcome = client.hang_up().await;
        assert!(matches!(outcome.reason, CloseReason::Shutdown));
    }
    assert_eq!(relay.leases_in_use(), 0);
    assert!(relay.drain(Duration::from_secs(1)).await);
}

#[tokio::test(start_paused = true)]
async fn test_session_after_shutdown_never_leases() {
    let (relay, _feed) = relay(1);
    relay.shutdown();

    let mut client = connect(&relay, None, "traction");
    assert_eq!(client.expect_close().await, 1001);

    let outcome = client.hang_up().await;
    assert!(!outcome.reached_active);
    assert_eq!(relay.metrics().snapshot().sessions_opened, 0);
    assert_eq!(relay.leases_in_use(), 0);
}
