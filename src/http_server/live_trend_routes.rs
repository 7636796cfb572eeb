//! Live Trend Routes
//!
//! The streaming endpoint and the relay's own stats.
//!
//! `GET /live-trend?vehicle_id=..&metric=..` is admitted before the
//! WebSocket upgrade: an unsupported metric is a 400, a disallowed origin
//! a 403, and neither ever reaches the relay's upstream pool.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::relay::{LiveTrendParams, Relay, RelayError, RelayStats};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the streaming routes
pub fn live_trend_routes(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/live-trend", get(live_trend_handler))
        .route("/relay/stats", get(relay_stats_handler))
        .with_state(relay)
}

// ==================
// WebSocket Handler
// ==================

async fn live_trend_handler(
    State(relay): State<Arc<Relay>>,
    Query(params): Query<LiveTrendParams>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    let filter = match relay.admit(&params, origin) {
        Ok(filter) => filter,
        Err(e) => return admission_error(&e),
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let config = relay.config();
    ws.max_message_size(config.max_message_size)
        .max_frame_size(config.max_frame_size)
        .on_upgrade(move |socket| async move {
            relay.serve_socket(socket, filter).await;
        })
}

fn admission_error(err: &RelayError) -> Response {
    let status = match err {
        RelayError::OriginRejected(_) => StatusCode::FORBIDDEN,
        e if e.is_admission() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ==================
// HTTP Handlers
// ==================

async fn relay_stats_handler(State(relay): State<Arc<Relay>>) -> Json<RelayStats> {
    Json(relay.stats())
}
