use chrono::{DateTime, Utc};
use serde_json::Value;

use super::timestamp_to_datetime;

/// Recorded result of a one-shot call.
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotRecord {
    pub run_id: String,
    pub call_id: String,
    pub result: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneShotRow {
    pub run_id: String,
    pub call_id: String,
    pub result: String,
    pub recorded_at: i64,
}

impl OneShotRow {
    pub fn into_domain(self) -> OneShotRecord {
        OneShotRecord {
            run_id: self.run_id,
            call_id: self.call_id,
            result: serde_json::from_str(&self.result).unwrap_or(Value::Null),
            recorded_at: timestamp_to_datetime(self.recorded_at),
        }
    }
}
