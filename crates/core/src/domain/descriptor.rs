use std::fmt;

use super::id::MigrationId;
use super::migration::{Migration, MigrationFactory};

/// One entry as supplied by a registration source, before validation.
///
/// `version` is the declared version annotation; `factory` is `None` for
/// abstract entries that only name the capability and cannot be built.
#[derive(Clone)]
pub struct MigrationRegistration {
    pub identity: MigrationId,
    pub version: Option<i64>,
    pub factory: Option<MigrationFactory>,
}

impl MigrationRegistration {
    pub fn new(identity: impl Into<MigrationId>, version: i64, factory: MigrationFactory) -> Self {
        Self {
            identity: identity.into(),
            version: Some(version),
            factory: Some(factory),
        }
    }

    pub fn is_concrete(&self) -> bool {
        self.factory.is_some()
    }
}

impl fmt::Debug for MigrationRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistration")
            .field("identity", &self.identity)
            .field("version", &self.version)
            .field("concrete", &self.is_concrete())
            .finish()
    }
}

/// A discovered, validated migration: identity, version and constructor.
///
/// Two descriptors are equal when identity and version match; the factory is
/// not comparable and does not take part.
#[derive(Clone)]
pub struct MigrationDescriptor {
    identity: MigrationId,
    version: i64,
    factory: MigrationFactory,
}

impl MigrationDescriptor {
    pub fn new(identity: impl Into<MigrationId>, version: i64, factory: MigrationFactory) -> Self {
        Self {
            identity: identity.into(),
            version,
            factory,
        }
    }

    pub fn identity(&self) -> &MigrationId {
        &self.identity
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn instantiate(&self) -> Box<dyn Migration> {
        (self.factory)()
    }

    /// Diagnostic label, `Migration:{identity}@{version}`.
    pub fn label(&self) -> String {
        format!("Migration:{}@{}", self.identity, self.version)
    }
}

impl PartialEq for MigrationDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.version == other.version
    }
}

impl Eq for MigrationDescriptor {}

impl fmt::Debug for MigrationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationDescriptor")
            .field("identity", &self.identity)
            .field("version", &self.version)
            .finish()
    }
}
