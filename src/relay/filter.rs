//! # Metric Filter & Projector
//!
//! Maps an upstream event plus a session's filter to a point, or to
//! nothing. Pure; called once per event by the session dispatcher.

use serde::{Deserialize, Serialize};

use super::errors::RelayResult;
use super::event::UpstreamEvent;
use super::metric::Metric;

/// Query parameters of the streaming endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiveTrendParams {
    /// Vehicle to follow; empty or missing follows every vehicle
    #[serde(default)]
    pub vehicle_id: Option<String>,

    /// Metric name; missing defaults to speed
    #[serde(default)]
    pub metric: Option<String>,
}

/// Per-session filter, fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFilter {
    pub vehicle_id: Option<String>,
    pub metric: Metric,
}

/// A projected sample ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPoint {
    pub timestamp: String,
    pub value: f64,
}

impl SessionFilter {
    /// Create a filter
    pub fn new(vehicle_id: Option<String>, metric: Metric) -> Self {
        // compared verbatim; only an empty id means "every vehicle"
        let vehicle_id = vehicle_id.filter(|v| !v.is_empty());
        Self { vehicle_id, metric }
    }

    /// Validate query parameters into a filter
    pub fn from_params(params: &LiveTrendParams) -> RelayResult<Self> {
        let metric = match params.metric.as_deref() {
            None => Metric::default(),
            Some(m) => m.parse()?,
        };
        Ok(Self::new(params.vehicle_id.clone(), metric))
    }

    /// Vehicle as reported in the connected frame
    pub fn vehicle_label(&self) -> &str {
        self.vehicle_id.as_deref().unwrap_or("")
    }

    /// Whether the event's vehicle passes the filter
    pub fn matches_vehicle(&self, event: &UpstreamEvent) -> bool {
        match &self.vehicle_id {
            Some(vehicle) => vehicle == &event.vehicle_id,
            None => true,
        }
    }

    /// Project an event onto this filter
    pub fn project(&self, event: &UpstreamEvent) -> Option<ProjectedPoint> {
        if !self.matches_vehicle(event) {
            return None;
        }

        let value = event.value(self.metric)?;
        Some(ProjectedPoint {
            timestamp: event.time_iso.clone(),
            value,
        })
    }
}
