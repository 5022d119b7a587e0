mod descriptor;
mod id;
mod migration;
mod run;

pub use descriptor::{MigrationDescriptor, MigrationRegistration};
pub use id::MigrationId;
pub use migration::{
    ensure_not_cancelled, factory_of, Migration, MigrationFactory, MigrationFault,
};
pub use run::{RunKind, RunRequest};
