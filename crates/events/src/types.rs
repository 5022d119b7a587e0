//! Lifecycle event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every event with an id and a timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Everything the substrate reports about a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An attempt of a run or child invocation began
    #[serde(rename = "run.started")]
    RunStarted {
        run_id: String,
        parent_run_id: Option<String>,
        kind: String,
        attempt: i64,
    },

    #[serde(rename = "run.completed")]
    RunCompleted { run_id: String },

    #[serde(rename = "run.failed")]
    RunFailed {
        run_id: String,
        error: String,
        retryable: bool,
    },

    /// A child invocation was already completed and was not executed again
    #[serde(rename = "invocation.replayed")]
    InvocationReplayed { run_id: String },

    /// A failed attempt will be retried after `delay_ms`
    #[serde(rename = "invocation.retrying")]
    InvocationRetrying {
        run_id: String,
        attempt: u32,
        delay_ms: u64,
    },

    #[serde(rename = "one_shot.recorded")]
    OneShotRecorded { run_id: String, call_id: String },

    /// A one-shot call was answered from the ledger
    #[serde(rename = "one_shot.replayed")]
    OneShotReplayed { run_id: String, call_id: String },

    /// The substrate failed to record an outcome in the ledger
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Run or invocation the event belongs to, if any
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Event::RunStarted { run_id, .. }
            | Event::RunCompleted { run_id }
            | Event::RunFailed { run_id, .. }
            | Event::InvocationReplayed { run_id }
            | Event::InvocationRetrying { run_id, .. }
            | Event::OneShotRecorded { run_id, .. }
            | Event::OneShotReplayed { run_id, .. } => Some(run_id),
            Event::Error { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunCompleted { .. } | Event::RunFailed { .. })
    }
}
