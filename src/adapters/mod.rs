//! Activity payload adapters
//!
//! This module provides adapters that parse raw activity JSON, as deposited by
//! the ingestion side, and map it to normalized run records.

mod strava;

pub use strava::{parse_start_local, StravaAdapter, RUN_ACTIVITY_TYPE};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::RunRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for activity payload adapters
pub trait ActivityAdapter {
    /// Parse one raw activity into a run record.
    ///
    /// Returns `Ok(None)` when the activity is not a run or has no usable
    /// start timestamp; such records are dropped rather than stored.
    fn to_run(
        &self,
        raw_json: &str,
        config: &PipelineConfig,
    ) -> Result<Option<RunRecord>, PipelineError>;
}

/// Raw activity as kept in `activities_raw`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActivity {
    pub activity_id: i64,
    pub start_date_utc: String,
    pub activity_type: String,
    pub raw_json: String,
}

impl RawActivity {
    /// Build a raw row from a decoded activity object; `id` is required
    pub fn from_value(value: &Value) -> Result<Self, PipelineError> {
        let activity_id = value
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| PipelineError::ParseError("activity has no integer id".to_string()))?;

        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            activity_id,
            start_date_utc: text("start_date"),
            activity_type: text("type"),
            raw_json: serde_json::to_string(value)?,
        })
    }
}

/// Parse a JSON array of activity objects
pub fn parse_array(json: &str) -> Result<Vec<Value>, PipelineError> {
    let activities: Vec<Value> = serde_json::from_str(json)?;
    Ok(activities)
}

/// Parse NDJSON (one activity object per line)
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Value>, PipelineError> {
    let mut activities = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(activity) => activities.push(activity),
            Err(e) => {
                return Err(PipelineError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(activities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_activity_from_value() {
        let value = json!({
            "id": 9001,
            "type": "Run",
            "start_date": "2024-03-04T06:00:00Z",
            "start_date_local": "2024-03-04T07:00:00Z",
            "distance": 5000.0
        });

        let raw = RawActivity::from_value(&value).unwrap();
        assert_eq!(raw.activity_id, 9001);
        assert_eq!(raw.activity_type, "Run");
        assert_eq!(raw.start_date_utc, "2024-03-04T06:00:00Z");

        let back: Value = serde_json::from_str(&raw.raw_json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_raw_activity_requires_id() {
        let value = json!({"type": "Run"});
        assert!(matches!(
            RawActivity::from_value(&value),
            Err(PipelineError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_array_and_ndjson() {
        let array = r#"[{"id": 1, "type": "Run"}, {"id": 2, "type": "Ride"}]"#;
        assert_eq!(parse_array(array).unwrap().len(), 2);

        let ndjson = "{\"id\": 1}\n\n   \n{\"id\": 2}\n";
        assert_eq!(parse_ndjson(ndjson).unwrap().len(), 2);

        let err = parse_ndjson("{\"id\": 1}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
