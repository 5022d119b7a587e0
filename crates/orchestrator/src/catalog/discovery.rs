use migrator_core::{MigrationDescriptor, MigrationId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::registry::{RegistrationSource, Registry};

/// Restriction of discovery to a list of named sources.
///
/// An empty scope means every source in the registry, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryScope {
    sources: Vec<String>,
}

impl DiscoveryScope {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_unrestricted(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Non-fatal problem found while scanning. The affected source or entry is
/// left out of the catalog and the scan goes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryIssue {
    /// A source could not be found or failed to load.
    SourceUnavailable { source: String, reason: String },
    /// An entry carries no version annotation.
    MissingVersion { source: String, identity: MigrationId },
    /// An identity was already taken by an earlier entry.
    DuplicateIdentity { source: String, identity: MigrationId },
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub catalog: Catalog,
    pub issues: Vec<DiscoveryIssue>,
}

/// Descriptors produced by one discovery pass, in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    descriptors: Vec<MigrationDescriptor>,
}

impl Catalog {
    pub fn new(descriptors: Vec<MigrationDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Scan `scope` within `registry`.
    ///
    /// Sources that cannot be loaded and entries that are missing a version or
    /// reuse an identity are logged and excluded; discovery itself never fails.
    pub fn discover(registry: &Registry, scope: &DiscoveryScope) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        let mut seen: HashSet<MigrationId> = HashSet::new();

        for source in Self::resolve_sources(registry, scope, &mut report.issues) {
            let registrations = match source.load() {
                Ok(registrations) => registrations,
                Err(e) => {
                    warn!(source = %source.name(), error = %e, "Failed to load migration source, skipping");
                    report.issues.push(DiscoveryIssue::SourceUnavailable {
                        source: source.name().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            for registration in registrations {
                let Some(factory) = registration.factory else {
                    debug!(identity = %registration.identity, "Skipping non-concrete migration entry");
                    continue;
                };

                let Some(version) = registration.version else {
                    warn!(
                        source = %source.name(),
                        identity = %registration.identity,
                        "Migration has no version annotation, excluding it"
                    );
                    report.issues.push(DiscoveryIssue::MissingVersion {
                        source: source.name().to_string(),
                        identity: registration.identity,
                    });
                    continue;
                };

                if !seen.insert(registration.identity.clone()) {
                    warn!(
                        source = %source.name(),
                        identity = %registration.identity,
                        "Migration identity registered twice, keeping the first"
                    );
                    report.issues.push(DiscoveryIssue::DuplicateIdentity {
                        source: source.name().to_string(),
                        identity: registration.identity,
                    });
                    continue;
                }

                report
                    .catalog
                    .descriptors
                    .push(MigrationDescriptor::new(registration.identity, version, factory));
            }
        }

        debug!(
            migrations = report.catalog.len(),
            issues = report.issues.len(),
            "Discovery finished"
        );

        report
    }

    fn resolve_sources<'a>(
        registry: &'a Registry,
        scope: &DiscoveryScope,
        issues: &mut Vec<DiscoveryIssue>,
    ) -> Vec<&'a dyn RegistrationSource> {
        if scope.is_unrestricted() {
            return registry.sources().iter().map(|s| s.as_ref()).collect();
        }

        let mut resolved = Vec::with_capacity(scope.sources().len());
        for name in scope.sources() {
            match registry.source(name) {
                Some(source) => resolved.push(source.as_ref()),
                None => {
                    warn!(source = %name, "Migration source in scope is not registered, skipping");
                    issues.push(DiscoveryIssue::SourceUnavailable {
                        source: name.clone(),
                        reason: "not registered".to_string(),
                    });
                }
            }
        }
        resolved
    }

    pub fn descriptors(&self) -> &[MigrationDescriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationDescriptor> {
        self.descriptors.iter()
    }

    pub fn find(&self, identity: &str) -> Option<&MigrationDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.identity().as_str() == identity)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
