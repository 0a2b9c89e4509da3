//! Sisync Core - Headless engine for migrating analytics artifacts between
//! environments.
//!
//! Users, groups, dashboards and data models are copied from a source
//! environment into a target one. The engine resolves names into each
//! environment's own identifiers, applies a conflict policy (skip, overwrite
//! or duplicate), swaps dashboard ownership temporarily when the acting user
//! is not the owner, and runs large work sets in throttled batches. Every
//! item ends up as a [`MigrationResult`] in a [`MigrationSummary`].
//!
//! # Example
//!
//! ```rust,ignore
//! use sisync_core::{EnvironmentConfig, Migrator, Selection, DashboardOptions, ConflictAction};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sisync_core::Result<()> {
//!     let migrator = Migrator::builder()
//!         .source_config(EnvironmentConfig::from_file("dev.yaml")?)
//!         .target_config(EnvironmentConfig::from_file("prod.yaml")?)
//!         .build()?;
//!
//!     let options = DashboardOptions {
//!         action: ConflictAction::Duplicate,
//!         migrate_share: true,
//!         ..Default::default()
//!     };
//!     let summary = migrator
//!         .migrate_dashboards(Selection::Names(vec!["Sales".into()]), &options)
//!         .await;
//!     println!("{} migrated, {} failed", summary.migrated(), summary.failed());
//!     summary.ensure_complete()
//! }
//! ```

pub mod config;
pub mod dashboard;
pub mod endpoints;
pub mod error;
pub mod identity;
pub mod migration;
pub mod models;
pub mod network;

// Re-export commonly used types
pub use config::{EnvironmentConfig, MigrationConfig, NetworkConfig};
pub use dashboard::{DashboardColumn, Dashboards};
pub use error::{Result, SisyncError};
pub use identity::{AccessManagement, IdentityResolver, Lookup, ResolvedEntity};
pub use migration::{
    resolve_conflict, rewrite_connections, BatchConfig, BatchOrchestrator, CapturedState,
    ConflictDecision, ConflictOperation, DashboardOptions, DataModelOptions, Migrator,
    MigratorBuilder, OwnershipGuard, OwnershipSwap, Selection,
};
pub use models::{
    ConflictAction, Dependency, DependencySet, EntityKind, EntityRef, MigratableEntity,
    MigrationOutcome, MigrationResult, MigrationStatus, MigrationSummary, PrincipalType,
    ProviderConnectionMap, ScriptPayload, ShareRule,
};
pub use network::{Environment, EnvironmentRole, HttpRemoteClient, RemoteClient, RemoteResponse};
