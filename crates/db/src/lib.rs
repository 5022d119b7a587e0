mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::*;
pub use models::{OneShotRecord, RunRecord, RunStatus};
pub use pool::*;
pub use repositories::*;
