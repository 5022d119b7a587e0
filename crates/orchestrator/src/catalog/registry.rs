//! Static registration of migration units.
//!
//! Sources are registered explicitly at startup. Each source plays the part of
//! a module: it can be named in a [`DiscoveryScope`](super::DiscoveryScope),
//! and it can fail to load without taking the rest of the registry down.

use migrator_core::{factory_of, Migration, MigrationFactory, MigrationId, MigrationRegistration};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SourceLoadError(pub String);

/// A named provider of migration registrations.
pub trait RegistrationSource: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> Result<Vec<MigrationRegistration>, SourceLoadError>;
}

/// In-memory source populated with builder calls.
#[derive(Clone)]
pub struct StaticSource {
    name: String,
    registrations: Vec<MigrationRegistration>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registrations: Vec::new(),
        }
    }

    pub fn migration(
        mut self,
        identity: impl Into<MigrationId>,
        version: i64,
        factory: MigrationFactory,
    ) -> Self {
        self.registrations
            .push(MigrationRegistration::new(identity, version, factory));
        self
    }

    pub fn migration_of<M>(self, identity: impl Into<MigrationId>, version: i64) -> Self
    where
        M: Migration + Default + 'static,
    {
        self.migration(identity, version, factory_of::<M>())
    }

    /// Registers a unit without a version annotation. Discovery rejects it.
    pub fn unversioned(mut self, identity: impl Into<MigrationId>, factory: MigrationFactory) -> Self {
        self.registrations.push(MigrationRegistration {
            identity: identity.into(),
            version: None,
            factory: Some(factory),
        });
        self
    }

    /// Registers an entry that cannot be constructed. Discovery skips it.
    pub fn abstract_entry(mut self, identity: impl Into<MigrationId>, version: i64) -> Self {
        self.registrations.push(MigrationRegistration {
            identity: identity.into(),
            version: Some(version),
            factory: None,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl RegistrationSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<MigrationRegistration>, SourceLoadError> {
        Ok(self.registrations.clone())
    }
}

impl fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSource")
            .field("name", &self.name)
            .field("registrations", &self.registrations)
            .finish()
    }
}

/// Ordered set of registration sources available to the process.
#[derive(Clone, Default)]
pub struct Registry {
    sources: Vec<Arc<dyn RegistrationSource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl RegistrationSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn with_shared_source(mut self, source: Arc<dyn RegistrationSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[Arc<dyn RegistrationSource>] {
        &self.sources
    }

    pub fn source(&self, name: &str) -> Option<&Arc<dyn RegistrationSource>> {
        self.sources.iter().find(|source| source.name() == name)
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.source_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use migrator_core::{ensure_not_cancelled, MigrationFault};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Noop;

    #[async_trait]
    impl Migration for Noop {
        async fn execute(&self, cancellation: &CancellationToken) -> Result<(), MigrationFault> {
            ensure_not_cancelled(cancellation)
        }
    }

    #[test]
    fn test_static_source_keeps_registration_order() {
        let source = StaticSource::new("schema")
            .migration_of::<Noop>("schema::B", 2)
            .migration_of::<Noop>("schema::A", 1)
            .abstract_entry("schema::Base", 0);

        let loaded = source.load().unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["schema::B", "schema::A", "schema::Base"]);
        assert!(!loaded[2].is_concrete());
    }

    #[test]
    fn test_registry_lookup_by_name() {
        let registry = Registry::new()
            .with_source(StaticSource::new("schema"))
            .with_source(StaticSource::new("data"));

        assert_eq!(registry.source_names(), vec!["schema", "data"]);
        assert!(registry.source("data").is_some());
        assert!(registry.source("missing").is_none());
    }
}
