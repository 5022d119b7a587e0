use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable name of a migration implementation.
///
/// This is the only form in which a migration crosses the substrate boundary,
/// so it must resolve to the same implementation on every machine and after
/// every restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationId(String);

impl MigrationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, e.g. `AddUserTable` for `app::schema::AddUserTable`.
    pub fn short_name(&self) -> &str {
        let after_path = self.0.rsplit("::").next().unwrap_or(&self.0);
        after_path.rsplit('.').next().unwrap_or(after_path)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MigrationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MigrationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for MigrationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
