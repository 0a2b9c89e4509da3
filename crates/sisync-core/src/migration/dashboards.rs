//! Dashboard migration: export, conflict check, bulk import, shares and owner.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::conflict::{resolve_conflict, ConflictOperation};
use super::ownership::{change_owner, read_owner, read_shares, write_shares};
use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::{IdentityResolver, Lookup};
use crate::models::{dedupe_shares, ConflictAction, EntityKind, EntityRef, MigrationOutcome};
use crate::network::Environment;

#[derive(Debug, Clone, Default)]
pub struct DashboardOptions {
    pub action: ConflictAction,
    pub new_title: Option<String>,
    pub republish: bool,
    pub migrate_share: bool,
    /// Only honored together with `migrate_share`.
    pub change_ownership: bool,
}

/// Migrates dashboards one at a time.
pub struct DashboardMigrator<'a> {
    source: &'a Environment,
    target: &'a Environment,
    resolver: IdentityResolver,
}

impl<'a> DashboardMigrator<'a> {
    pub fn new(source: &'a Environment, target: &'a Environment) -> Self {
        Self {
            source,
            target,
            resolver: IdentityResolver::new(),
        }
    }

    pub async fn migrate_one(
        &self,
        item: &EntityRef,
        options: &DashboardOptions,
    ) -> Result<MigrationOutcome> {
        let dashboard = self
            .resolver
            .resolve(&Lookup::from(item), EntityKind::Dashboard, self.source)
            .await?;

        let target_match = self
            .resolver
            .find(
                &Lookup::Name(dashboard.name.clone()),
                EntityKind::Dashboard,
                self.target,
            )
            .await?;
        let decision = resolve_conflict(
            options.action,
            target_match.as_ref().map(|m| m.id.as_str()),
            &dashboard.name,
            options.new_title.as_deref(),
        );
        debug!("{:?}: {:?}", dashboard.to_entity(), decision);

        if decision.operation == ConflictOperation::Skip {
            return Ok(MigrationOutcome::skipped(
                decision.effective_id,
                "already exists in target",
            )
            .with_name(decision.effective_name)
            .with_source_name(dashboard.name));
        }

        let mut exported = self
            .source
            .client()
            .get(&endpoints::dashboard_export(&dashboard.id))
            .await?
            .ensure_success(EntityKind::Dashboard, &dashboard.name)?
            .body;
        let Some(doc) = exported.as_object_mut() else {
            return Err(SisyncError::Api {
                status: 200,
                message: format!("export of dashboard '{}' is not an object", dashboard.name),
            });
        };
        doc.insert(
            "title".to_string(),
            Value::String(decision.effective_name.clone()),
        );
        let import_action = match (decision.operation, &decision.effective_id) {
            (ConflictOperation::Update, Some(id)) => {
                doc.insert("oid".to_string(), Value::String(id.clone()));
                "overwrite"
            }
            _ => {
                // The target allocates a fresh id.
                doc.remove("oid");
                "duplicate"
            }
        };

        let target_id = self
            .bulk_import(exported, import_action, options.republish, &decision.effective_name)
            .await?
            .or(decision.effective_id.clone())
            .ok_or_else(|| SisyncError::Api {
                status: 200,
                message: format!(
                    "import of dashboard '{}' returned no id",
                    decision.effective_name
                ),
            })?;

        let mut detail = match decision.operation {
            ConflictOperation::Update => "overwritten".to_string(),
            _ => "created".to_string(),
        };
        if options.migrate_share {
            match self
                .copy_shares(&dashboard.id, &target_id, options.change_ownership)
                .await
            {
                Ok(copied) => detail.push_str(&format!(", {} shares copied", copied)),
                Err(e) => {
                    warn!("Dashboard '{}' imported but share copy failed: {}", dashboard.name, e);
                    let written = format!("{} {}; share copy failed", detail, target_id);
                    return Ok(MigrationOutcome::incomplete(Some(target_id), &written, &e)
                        .with_name(decision.effective_name)
                        .with_source_name(dashboard.name));
                }
            }
        }

        Ok(MigrationOutcome::migrated(Some(target_id), detail)
            .with_name(decision.effective_name)
            .with_source_name(dashboard.name))
    }

    async fn bulk_import(
        &self,
        dashboard: Value,
        action: &str,
        republish: bool,
        title: &str,
    ) -> Result<Option<String>> {
        let body = Value::Array(vec![dashboard]);
        let response = self
            .target
            .client()
            .post(&endpoints::dashboard_import(action, republish), &body)
            .await?
            .ensure_written(&format!("import dashboard '{}'", title))?;

        let succeeded = imported_rows(&response.body);
        if succeeded.is_empty() {
            let failed = response
                .body
                .get("failed")
                .map(Value::to_string)
                .unwrap_or_else(|| response.body.to_string());
            return Err(SisyncError::Api {
                status: response.status,
                message: format!("import of dashboard '{}' failed: {}", title, failed),
            });
        }
        Ok(succeeded
            .iter()
            .find_map(|row| row.get("oid").and_then(Value::as_str))
            .map(str::to_string))
    }

    /// Copy the share list of `source_id` onto `target_id`, remapping
    /// principals by name. Returns the number of shares written.
    pub async fn copy_shares(
        &self,
        source_id: &str,
        target_id: &str,
        change_ownership: bool,
    ) -> Result<usize> {
        let shares = read_shares(self.source, source_id).await?;
        let mut remapped = Vec::with_capacity(shares.len());
        for share in &shares {
            if let Some(share) = self
                .resolver
                .remap_share(share, self.source, self.target)
                .await?
            {
                remapped.push(share);
            }
        }
        let remapped = dedupe_shares(remapped);
        info!(
            "Dashboard {}: {} of {} shares map into target",
            target_id,
            remapped.len(),
            shares.len()
        );
        write_shares(self.target, target_id, remapped.as_slice()).await?;

        if change_ownership {
            self.copy_owner(source_id, target_id).await?;
        }
        Ok(remapped.len())
    }

    async fn copy_owner(&self, source_id: &str, target_id: &str) -> Result<()> {
        let source_owner_id = read_owner(self.source, source_id).await?;
        let owner = self
            .resolver
            .resolve(
                &Lookup::Id(source_owner_id),
                EntityKind::User,
                self.source,
            )
            .await?;
        match self
            .resolver
            .find(&Lookup::Name(owner.name.clone()), EntityKind::User, self.target)
            .await?
        {
            Some(target_owner) => {
                info!("Dashboard {}: owner -> '{}'", target_id, owner.name);
                change_owner(self.target, target_id, &target_owner.id).await
            }
            None => {
                warn!(
                    "Owner '{}' of dashboard {} not found in target, keeping current owner",
                    owner.name, source_id
                );
                Ok(())
            }
        }
    }
}

/// Rows listed as imported; the server has spelled the key both ways.
fn imported_rows(body: &Value) -> Vec<Value> {
    ["succeded", "succeeded"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}
