//! Run lifecycle events
//!
//! The substrate publishes an [`Event`] on every ledger transition so that
//! workers and tools can follow a run without polling the ledger.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
