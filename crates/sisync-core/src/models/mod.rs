//! Data types shared by the migration engine.

mod entity;
mod options;
mod result;
mod share;

pub use entity::{EntityKind, EntityRef, MigratableEntity};
pub use options::{
    ConflictAction, Dependency, DependencySet, ProviderConnectionMap, ScriptPayload,
};
pub(crate) use result::elapsed_secs;
pub use result::{MigrationOutcome, MigrationResult, MigrationStatus, MigrationSummary};
pub use share::{dedupe_shares, share_key, PrincipalType, ShareRule};
