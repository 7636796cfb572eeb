//! Selectable telemetry metrics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::RelayError;

/// A metric a live session can stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Speed,
    Temp,
    Power,
    Traction,
    Brake,
}

impl Metric {
    /// Every supported metric, in wire order
    pub const ALL: [Metric; 5] = [
        Metric::Speed,
        Metric::Temp,
        Metric::Power,
        Metric::Traction,
        Metric::Brake,
    ];

    /// Wire name, also the payload key upstream
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Speed => "speed",
            Metric::Temp => "temp",
            Metric::Power => "power",
            Metric::Traction => "traction",
            Metric::Brake => "brake",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| RelayError::UnsupportedMetric(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_supported() {
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), metric);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "rpm".parse::<Metric>().unwrap_err();
        assert!(matches!(err, RelayError::UnsupportedMetric(ref m) if m == "rpm"));
        // case-sensitive, like the query parameter
        assert!("Speed".parse::<Metric>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Metric::Traction).unwrap(), "\"traction\"");
    }
}
