mod one_shot_repository;
mod run_repository;

pub use one_shot_repository::*;
pub use run_repository::*;
