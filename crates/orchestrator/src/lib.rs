pub mod activities;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod sequencer;
pub mod substrate;
pub mod workflow;

pub use catalog::{
    Catalog, DiscoveryIssue, DiscoveryReport, DiscoveryScope, RegistrationSource, Registry,
    SourceLoadError, StaticSource,
};
pub use codec::IdentityCodec;
pub use config::{EmptyCatalogPolicy, OrchestratorConfig};
pub use error::{OrchestratorError, Result};
pub use executor::UnitExecutor;
pub use sequencer::{TieBreak, VersionSequencer};
pub use substrate::{DurableContext, OneShotCall, OneShotOptions, Workflow};
pub use workflow::{MigrationWorkflow, WorkItem, WORKFLOW_NAME};
