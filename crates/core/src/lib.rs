//! Domain vocabulary shared by the migration orchestrator, its ledger and the
//! durable substrate.

pub mod domain;
mod error;

pub use domain::*;
pub use error::CoreError;
