use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid run kind: {0}")]
    InvalidRunKind(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
