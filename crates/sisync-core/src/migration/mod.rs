//! Cross-environment migration engine.
//!
//! [`Migrator`] ties the pieces together: each operation builds a work set
//! of [`EntityRef`]s and hands it to the [`BatchOrchestrator`] with a
//! per-item function from the entity-specific migrator.

mod access;
mod batch;
mod conflict;
mod dashboards;
mod datamodels;
pub mod ownership;

pub use access::{list_custom_groups, list_users, AccessMigrator};
pub use batch::{BatchConfig, BatchOrchestrator};
pub use conflict::{duplicate_name, resolve_conflict, ConflictDecision, ConflictOperation};
pub use dashboards::{DashboardMigrator, DashboardOptions};
pub use datamodels::{
    rewrite_connections, schema_connections, ConnectionRef, ConnectionRewrite, DataModelMigrator,
    DataModelOptions,
};
pub use ownership::{CapturedState, OwnershipGuard, OwnershipSwap};

use std::sync::Arc;
use tracing::info;

use crate::config::EnvironmentConfig;
use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::as_rows;
use crate::models::{EntityKind, EntityRef, MigrationOutcome, MigrationSummary};
use crate::network::{Environment, HttpRemoteClient, RemoteClient, RetryConfig};

/// Which artifacts an operation works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Ids(Vec<String>),
    Names(Vec<String>),
}

impl Selection {
    fn into_refs(self, kind: EntityKind) -> Vec<EntityRef> {
        match self {
            Selection::Ids(ids) => ids.into_iter().map(|id| EntityRef::by_id(kind, id)).collect(),
            Selection::Names(names) => names
                .into_iter()
                .map(|name| EntityRef::by_name(kind, name))
                .collect(),
        }
    }
}

/// Migrates artifacts from a source environment into a target.
pub struct Migrator {
    source: Environment,
    target: Environment,
    batch: BatchConfig,
}

impl Migrator {
    pub fn new(source: Environment, target: Environment) -> Self {
        Self {
            source,
            target,
            batch: BatchConfig::default(),
        }
    }

    pub fn builder() -> MigratorBuilder {
        MigratorBuilder::new()
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn source(&self) -> &Environment {
        &self.source
    }

    pub fn target(&self) -> &Environment {
        &self.target
    }

    pub fn batch(&self) -> BatchConfig {
        self.batch
    }

    async fn run_single<F, Fut>(&self, items: Vec<EntityRef>, per_item: F) -> MigrationSummary
    where
        F: FnMut(EntityRef) -> Fut,
        Fut: std::future::Future<Output = Result<MigrationOutcome>>,
    {
        BatchOrchestrator::new(BatchConfig::single(items.len()))
            .run(items, per_item)
            .await
    }

    // Groups

    pub async fn migrate_groups(&self, names: &[String]) -> MigrationSummary {
        let migrator = AccessMigrator::new(&self.source, &self.target);
        let m = &migrator;
        let items = Selection::Names(names.to_vec()).into_refs(EntityKind::Group);
        self.run_single(items, |item| async move { m.migrate_group(&item).await })
            .await
    }

    pub async fn migrate_all_groups(&self) -> Result<MigrationSummary> {
        let items = list_custom_groups(&self.source).await?;
        info!("Migrating {} groups", items.len());
        let migrator = AccessMigrator::new(&self.source, &self.target);
        let m = &migrator;
        Ok(self
            .run_single(items, |item| async move { m.migrate_group(&item).await })
            .await)
    }

    // Users

    pub async fn migrate_users(&self, user_names: &[String]) -> MigrationSummary {
        let migrator = AccessMigrator::new(&self.source, &self.target);
        let m = &migrator;
        let items = Selection::Names(user_names.to_vec()).into_refs(EntityKind::User);
        self.run_single(items, |item| async move { m.migrate_user(&item).await })
            .await
    }

    pub async fn migrate_all_users(&self) -> Result<MigrationSummary> {
        let items = list_users(&self.source).await?;
        info!("Migrating {} users", items.len());
        let migrator = AccessMigrator::new(&self.source, &self.target);
        let m = &migrator;
        Ok(self
            .run_single(items, |item| async move { m.migrate_user(&item).await })
            .await)
    }

    // Dashboards

    pub async fn migrate_dashboards(
        &self,
        selection: Selection,
        options: &DashboardOptions,
    ) -> MigrationSummary {
        let items = selection.into_refs(EntityKind::Dashboard);
        let migrator = DashboardMigrator::new(&self.source, &self.target);
        let m = &migrator;
        self.run_single(items, |item| async move { m.migrate_one(&item, options).await })
            .await
    }

    /// Every dashboard in the source, in batches of the configured size.
    pub async fn migrate_all_dashboards(
        &self,
        options: &DashboardOptions,
    ) -> Result<MigrationSummary> {
        let items = self
            .list_source(&endpoints::dashboards_all(), EntityKind::Dashboard)
            .await?;
        info!(
            "Migrating {} dashboards in {} batches",
            items.len(),
            self.batch.batch_count(items.len())
        );
        let migrator = DashboardMigrator::new(&self.source, &self.target);
        let m = &migrator;
        Ok(BatchOrchestrator::new(self.batch)
            .run(items, |item| async move { m.migrate_one(&item, options).await })
            .await)
    }

    /// Copy shares from each source dashboard onto the target dashboard at
    /// the same position.
    pub async fn migrate_dashboard_shares(
        &self,
        source_ids: &[String],
        target_ids: &[String],
        change_ownership: bool,
    ) -> Result<MigrationSummary> {
        if source_ids.len() != target_ids.len() {
            return Err(SisyncError::validation(
                "target_ids",
                format!(
                    "{} source dashboards but {} target dashboards",
                    source_ids.len(),
                    target_ids.len()
                ),
            ));
        }
        let items = Selection::Ids(source_ids.to_vec()).into_refs(EntityKind::Dashboard);
        let mut targets = target_ids.iter();

        let migrator = DashboardMigrator::new(&self.source, &self.target);
        let m = &migrator;
        Ok(self
            .run_single(items, |item| {
                let target_id = targets.next().cloned().unwrap_or_default();
                async move {
                    let source_id = item.id.unwrap_or_default();
                    let copied = m
                        .copy_shares(&source_id, &target_id, change_ownership)
                        .await?;
                    Ok(MigrationOutcome::migrated(
                        Some(target_id),
                        format!("{} shares copied", copied),
                    ))
                }
            })
            .await)
    }

    // Data models

    pub async fn migrate_datamodels(
        &self,
        selection: Selection,
        options: &DataModelOptions,
    ) -> MigrationSummary {
        let items = selection.into_refs(EntityKind::DataModel);
        let migrator = DataModelMigrator::new(&self.source, &self.target, options);
        let m = &migrator;
        self.run_single(items, |item| async move { m.migrate_one(&item).await })
            .await
    }

    pub async fn migrate_all_datamodels(
        &self,
        options: &DataModelOptions,
    ) -> Result<MigrationSummary> {
        let items = self
            .list_source(endpoints::DATAMODELS, EntityKind::DataModel)
            .await?;
        info!(
            "Migrating {} data models in {} batches",
            items.len(),
            self.batch.batch_count(items.len())
        );
        let migrator = DataModelMigrator::new(&self.source, &self.target, options);
        let m = &migrator;
        Ok(BatchOrchestrator::new(self.batch)
            .run(items, |item| async move { m.migrate_one(&item).await })
            .await)
    }

    async fn list_source(&self, path: &str, kind: EntityKind) -> Result<Vec<EntityRef>> {
        let response = self
            .source
            .client()
            .get(path)
            .await?
            .ensure_success(kind, "*")?;
        Ok(as_rows(&response.body)
            .iter()
            .filter_map(|row| {
                let id = row.get("oid")?.as_str()?;
                let title = row.get("title")?.as_str()?;
                Some(EntityRef::new(kind, id, title))
            })
            .collect())
    }
}

/// Builder for a [`Migrator`] from configurations or ready clients.
///
/// # Example
///
/// ```rust,ignore
/// let migrator = Migrator::builder()
///     .source_config(EnvironmentConfig::from_file("dev.yaml")?)
///     .target_config(EnvironmentConfig::from_file("prod.yaml")?)
///     .batch(BatchConfig::new(5, Duration::from_secs(30))?)
///     .build()?;
/// ```
#[derive(Default)]
pub struct MigratorBuilder {
    source: Option<Arc<dyn RemoteClient>>,
    target: Option<Arc<dyn RemoteClient>>,
    source_config: Option<EnvironmentConfig>,
    target_config: Option<EnvironmentConfig>,
    retry: Option<RetryConfig>,
    batch: BatchConfig,
}

impl MigratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_config(mut self, config: EnvironmentConfig) -> Self {
        self.source_config = Some(config);
        self
    }

    pub fn target_config(mut self, config: EnvironmentConfig) -> Self {
        self.target_config = Some(config);
        self
    }

    /// Use a prepared client for the source. Takes precedence over a config.
    pub fn source_client(mut self, client: Arc<dyn RemoteClient>) -> Self {
        self.source = Some(client);
        self
    }

    pub fn target_client(mut self, client: Arc<dyn RemoteClient>) -> Self {
        self.target = Some(client);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    fn client(
        &self,
        client: Option<Arc<dyn RemoteClient>>,
        config: Option<&EnvironmentConfig>,
        role: &str,
    ) -> Result<Arc<dyn RemoteClient>> {
        if let Some(client) = client {
            return Ok(client);
        }
        let config = config.ok_or_else(|| SisyncError::Config {
            message: format!("No {} environment configured", role),
        })?;
        let mut http = HttpRemoteClient::from_config(config)?;
        if let Some(retry) = &self.retry {
            http = http.with_retry(retry.clone());
        }
        Ok(Arc::new(http))
    }

    pub fn build(mut self) -> Result<Migrator> {
        let source_client = self.source.take();
        let target_client = self.target.take();
        let source = self.client(source_client, self.source_config.as_ref(), "source")?;
        let target = self.client(target_client, self.target_config.as_ref(), "target")?;
        Ok(Migrator::new(Environment::source(source), Environment::target(target))
            .with_batch(self.batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_into_refs() {
        let refs = Selection::Ids(vec!["a".into(), "b".into()]).into_refs(EntityKind::Dashboard);
        assert_eq!(refs[0].id.as_deref(), Some("a"));
        assert!(refs[0].name.is_none());

        let refs = Selection::Names(vec!["Sales".into()]).into_refs(EntityKind::DataModel);
        assert_eq!(refs[0].name.as_deref(), Some("Sales"));
    }

    #[test]
    fn test_builder_requires_both_environments() {
        let err = Migrator::builder().build().err().unwrap();
        assert!(matches!(err, SisyncError::Config { .. }));
    }
}
