use migrator_core::{MigrationDescriptor, MigrationId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::error::{OrchestratorError, Result};

/// How descriptors sharing a version are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep catalog encounter order (registration order within the scope).
    #[default]
    EncounterOrder,
    /// Refuse to sequence a catalog with repeated versions.
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VersionSequencer {
    tie_break: TieBreak,
}

impl VersionSequencer {
    pub fn new(tie_break: TieBreak) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn sequence(&self, catalog: &Catalog) -> Result<Vec<MigrationId>> {
        if self.tie_break == TieBreak::Reject {
            reject_duplicate_versions(catalog)?;
        }
        Ok(sequence(catalog))
    }
}

/// Identities ordered by ascending version, ties in encounter order.
pub fn sequence(catalog: &Catalog) -> Vec<MigrationId> {
    let mut ordered: Vec<&MigrationDescriptor> = catalog.iter().collect();
    ordered.sort_by_key(|d| d.version());
    ordered.into_iter().map(|d| d.identity().clone()).collect()
}

fn reject_duplicate_versions(catalog: &Catalog) -> Result<()> {
    let mut seen: HashMap<i64, &MigrationId> = HashMap::new();
    for descriptor in catalog.iter() {
        if let Some(first) = seen.insert(descriptor.version(), descriptor.identity()) {
            return Err(OrchestratorError::DuplicateVersion {
                version: descriptor.version(),
                first: first.clone(),
                second: descriptor.identity().clone(),
            });
        }
    }
    Ok(())
}
