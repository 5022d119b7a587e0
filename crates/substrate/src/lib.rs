//! Local durable-execution substrate
//!
//! Runs a [`Workflow`](orchestrator::Workflow) against a SQLite ledger so that
//! a resubmitted run replays recorded one-shot results, skips completed child
//! invocations and continues where the previous attempt stopped.

mod config;
mod context;
mod error;
mod local;
mod retry;

pub use config::SubstrateConfig;
pub use error::{Result, SubstrateError};
pub use local::{LocalSubstrate, RunHandle, RunHistory};
pub use retry::RetryPolicy;
