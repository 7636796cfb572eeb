//! # Upstream Events
//!
//! One telemetry sample for one vehicle, as published on the notification
//! channel. Payloads come from an external pipeline and are decoded
//! defensively: anything that does not match this shape is rejected here
//! and never reaches the filter.

use serde::{Deserialize, Serialize};

use super::errors::{RelayError, RelayResult};
use super::metric::Metric;

/// A decoded change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamEvent {
    /// Vehicle the sample belongs to
    pub vehicle_id: String,

    /// Sample time, ISO-8601, passed through untouched
    pub time_iso: String,

    #[serde(default)]
    pub speed: Option<f64>,

    #[serde(default)]
    pub temp: Option<f64>,

    #[serde(default)]
    pub power: Option<f64>,

    #[serde(default)]
    pub traction: Option<f64>,

    #[serde(default)]
    pub brake: Option<f64>,
}

impl UpstreamEvent {
    /// Decode a raw notification payload
    pub fn decode(payload: &str) -> RelayResult<Self> {
        serde_json::from_str(payload).map_err(|e| RelayError::MalformedPayload(e.to_string()))
    }

    /// Value of the given metric, `None` when absent or null
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Speed => self.speed,
            Metric::Temp => self.temp,
            Metric::Power => self.power,
            Metric::Traction => self.traction,
            Metric::Brake => self.brake,
        }
    }
}
