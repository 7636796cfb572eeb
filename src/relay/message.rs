//! Outbound frames, server to client.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use super::errors::{RelayError, RelayResult};
use super::filter::{ProjectedPoint, SessionFilter};
use super::metric::Metric;

/// Message sent to a streaming client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// First frame of every admitted session
    Connected { vehicle: String, metric: Metric },

    /// One projected sample
    Point { timestamp: String, value: f64 },

    /// Fatal condition, sent before the close
    Error {
        #[serde(rename = "error")]
        message: String,
    },
}

impl OutboundMessage {
    pub fn connected(filter: &SessionFilter) -> Self {
        OutboundMessage::Connected {
            vehicle: filter.vehicle_label().to_string(),
            metric: filter.metric,
        }
    }

    pub fn point(point: ProjectedPoint) -> Self {
        OutboundMessage::Point {
            timestamp: point.timestamp,
            value: point.value,
        }
    }

    pub fn error(err: &RelayError) -> Self {
        OutboundMessage::Error {
            message: err.client_message(),
        }
    }

    /// Encode as a JSON text frame
    pub fn to_frame(&self) -> RelayResult<Message> {
        let json = serde_json::to_string(self).map_err(|e| RelayError::Encode(e.to_string()))?;
        Ok(Message::Text(json))
    }
}
