//! Hot-spot aggregation over `@typescript/analyze-trace --json` output
//!
//! The analyzer emits either a single result object or, for project
//! references, an array of per-project entries whose `result` field holds the
//! report (sometimes as an embedded JSON string). Only top-level hot spots are
//! counted; nested children are part of their parent's time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Summary of the analyzer's hot-spot report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotSpotMetrics {
    pub num_hot_spots: u64,
    pub duration_ms_hot_spots: f64,
    /// Size of `analyze.json` in bytes
    pub analyze_file_size: u64,
}

/// Parsed analyzer output, reduced to its hot spots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotSpotReport {
    /// `timeMs` of each top-level hot spot
    durations_ms: Vec<f64>,
}

impl HotSpotReport {
    /// Parse analyzer stdout. Malformed or empty input yields an empty report.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                debug!("Analyzer output is not JSON: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let mut durations_ms = Vec::new();
        match value {
            Value::Array(entries) => {
                for entry in entries {
                    match entry.get("result") {
                        Some(result) => collect_result(result, &mut durations_ms),
                        None => collect_hot_spots(entry, &mut durations_ms),
                    }
                }
            }
            Value::Object(_) => collect_hot_spots(value, &mut durations_ms),
            _ => {}
        }
        Self { durations_ms }
    }

    pub fn len(&self) -> usize {
        self.durations_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations_ms.is_empty()
    }

    pub fn total_ms(&self) -> f64 {
        self.durations_ms.iter().sum()
    }

    pub fn metrics(&self, analyze_file_size: u64) -> HotSpotMetrics {
        HotSpotMetrics {
            num_hot_spots: self.len() as u64,
            duration_ms_hot_spots: self.total_ms(),
            analyze_file_size,
        }
    }
}

fn collect_result(result: &Value, out: &mut Vec<f64>) {
    match result {
        Value::String(embedded) => {
            if let Ok(inner) = serde_json::from_str::<Value>(embedded) {
                collect_hot_spots(&inner, out);
            }
        }
        other => collect_hot_spots(other, out),
    }
}

fn collect_hot_spots(report: &Value, out: &mut Vec<f64>) {
    let Some(spots) = report.get("hotSpots").and_then(Value::as_array) else {
        return;
    };
    out.extend(
        spots
            .iter()
            .map(|spot| spot.get("timeMs").and_then(Value::as_f64).unwrap_or(0.0)),
    );
}
