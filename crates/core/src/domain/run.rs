use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::MigrationId;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Sequence and run the whole catalog.
    #[default]
    Bootstrap,
    /// Run exactly one migration.
    Unit,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Unit => "unit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bootstrap" => Some(Self::Bootstrap),
            "unit" => Some(Self::Unit),
            _ => None,
        }
    }
}

impl FromStr for RunKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::InvalidRunKind(s.to_string()))
    }
}

/// Input of one orchestration invocation, as recorded by the substrate.
///
/// `kind` stays a raw string: requests come back out of persisted history and
/// an unknown kind has to surface as [`CoreError::InvalidRunKind`] at dispatch
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub kind: String,
    #[serde(default)]
    pub targets: Vec<MigrationId>,
}

impl RunRequest {
    pub fn bootstrap() -> Self {
        Self {
            kind: RunKind::Bootstrap.as_str().to_string(),
            targets: Vec::new(),
        }
    }

    pub fn unit(identity: impl Into<MigrationId>) -> Self {
        Self {
            kind: RunKind::Unit.as_str().to_string(),
            targets: vec![identity.into()],
        }
    }

    pub fn run_kind(&self) -> Result<RunKind, CoreError> {
        self.kind.parse()
    }
}

impl Default for RunRequest {
    fn default() -> Self {
        Self::bootstrap()
    }
}
