//! Migration discovery.
//!
//! - [`Registry`] - explicit, ordered set of registration sources
//! - [`DiscoveryScope`] - which sources a run may see
//! - [`Catalog`] - validated descriptors found by one discovery pass

mod discovery;
mod registry;

pub use discovery::{Catalog, DiscoveryIssue, DiscoveryReport, DiscoveryScope};
pub use registry::{RegistrationSource, Registry, SourceLoadError, StaticSource};
