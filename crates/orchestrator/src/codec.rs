//! Identity codec.
//!
//! Migrations cross the substrate boundary (child arguments, recorded one-shot
//! results) only as their identity string. Decoding discovers again under the
//! same scope that produced the string, so a resumed run resolves to the same
//! implementation it started with.

use migrator_core::{MigrationDescriptor, MigrationId};
use serde_json::Value;
use std::sync::Arc;

use crate::catalog::{Catalog, DiscoveryScope, Registry};
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct IdentityCodec {
    registry: Arc<Registry>,
    scope: DiscoveryScope,
}

impl IdentityCodec {
    pub fn new(registry: Arc<Registry>, scope: DiscoveryScope) -> Self {
        Self { registry, scope }
    }

    pub fn scope(&self) -> &DiscoveryScope {
        &self.scope
    }

    pub fn encode(&self, descriptor: &MigrationDescriptor) -> String {
        descriptor.identity().as_str().to_string()
    }

    pub fn decode(&self, raw: &str) -> Result<MigrationDescriptor> {
        let catalog = Catalog::discover(&self.registry, &self.scope).catalog;
        Self::resolve_in(&catalog, raw)
    }

    /// Resolve against an already discovered catalog.
    pub fn resolve_in(catalog: &Catalog, raw: &str) -> Result<MigrationDescriptor> {
        catalog
            .find(raw)
            .cloned()
            .ok_or_else(|| OrchestratorError::IdentityResolution(raw.to_string()))
    }

    /// History payload for an ordered identity list.
    pub fn encode_list(ids: &[MigrationId]) -> Result<Value> {
        Ok(serde_json::to_value(ids)?)
    }

    pub fn decode_list(value: Value) -> Result<Vec<MigrationId>> {
        Ok(serde_json::from_value(value)?)
    }
}
