use chrono::{DateTime, Utc};
use migrator_core::RunRequest;
use std::fmt;

use super::timestamp_to_datetime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable run or child invocation as kept in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub request: RunRequest,
    pub status: RunStatus,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub run_id: String,
    pub parent_run_id: Option<String>,
    pub request: String,
    pub status: String,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RunRow {
    pub fn into_domain(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            parent_run_id: self.parent_run_id,
            request: serde_json::from_str(&self.request).unwrap_or_default(),
            status: RunStatus::parse(&self.status).unwrap_or_default(),
            attempts: self.attempts,
            error: self.error,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("paused"), None);
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_row_into_domain() {
        let row = RunRow {
            run_id: "R_app::A".to_string(),
            parent_run_id: Some("R".to_string()),
            request: r#"{"kind":"unit","targets":["app::A"]}"#.to_string(),
            status: "completed".to_string(),
            attempts: 2,
            error: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_060,
        };

        let record = row.into_domain();
        assert_eq!(record.request, RunRequest::unit("app::A"));
        assert!(record.is_completed());
        assert_eq!(record.attempts, 2);
        assert_eq!(record.updated_at.timestamp(), 1_700_000_060);
    }
}
