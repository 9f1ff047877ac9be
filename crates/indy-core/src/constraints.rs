//! Typed view over a task's free-form `constraints` document.
//!
//! The document is user-authored JSON. Every lookup tolerates a missing
//! document, a non-object document, a JSON object serialised into a string,
//! numbers written as strings, and values of the wrong type; anything it
//! cannot read falls back to "absent".

use serde_json::{Map, Value};

/// Hints consumed by the scheduler, the blueprint gate and the stock
/// allocator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskConstraints {
    pub blueprint_type_id: Option<i64>,
    pub blueprint_location_id: Option<i64>,
    pub preferred_location_id: Option<i64>,
    pub duration_per_run_seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub cost_per_run_isk: Option<f64>,
    pub cost_isk: Option<f64>,
}

impl TaskConstraints {
    pub fn from_json(doc: &Value) -> Self {
        let parsed;
        let map = match doc {
            Value::Object(map) => map,
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => {
                    parsed = map;
                    &parsed
                }
                _ => return Self::default(),
            },
            _ => return Self::default(),
        };

        Self {
            blueprint_type_id: id_field(map, &["blueprint_type_id", "bp_type_id"]),
            blueprint_location_id: id_field(map, &["blueprint_location_id", "bp_location_id"]),
            preferred_location_id: id_field(
                map,
                &["location_id", "warehouse_location_id", "preferred_location_id"],
            ),
            duration_per_run_seconds: amount_field(
                map,
                &["duration_per_run_seconds", "per_run_duration_seconds"],
            ),
            duration_seconds: amount_field(map, &["duration_seconds"]),
            cost_per_run_isk: amount_field(map, &["cost_per_run_isk", "per_run_cost_isk"]),
            cost_isk: amount_field(map, &["cost_isk"]),
        }
    }

    /// Per-run duration: the explicit hint, else the total spread over
    /// `runs`.
    pub fn per_run_duration(&self, runs: i64) -> Option<f64> {
        self.duration_per_run_seconds
            .or_else(|| spread(self.duration_seconds, runs))
    }

    /// Per-run cost: the explicit hint, else the total spread over `runs`.
    pub fn per_run_cost(&self, runs: i64) -> Option<f64> {
        self.cost_per_run_isk.or_else(|| spread(self.cost_isk, runs))
    }
}

fn spread(total: Option<f64>, runs: i64) -> Option<f64> {
    match total {
        Some(total) if runs > 0 => Some(total / runs as f64),
        _ => None,
    }
}

/// First key that holds a positive integer id.
fn id_field(map: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(as_i64)
        .filter(|id| *id > 0)
}

/// First key that holds a finite, non-negative number.
fn amount_field(map: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
