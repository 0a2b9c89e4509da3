//! Data model migration with dependency selection and connection remapping.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::conflict::{resolve_conflict, ConflictOperation};
use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::{as_rows, IdentityResolver, Lookup, ResolvedEntity};
use crate::models::{
    ConflictAction, DependencySet, EntityKind, EntityRef, MigrationOutcome, PrincipalType,
    ProviderConnectionMap, ShareRule,
};
use crate::network::Environment;

/// Per-run options for data model migration.
#[derive(Debug, Clone, Default)]
pub struct DataModelOptions {
    pub action: ConflictAction,
    pub new_title: Option<String>,
    pub dependencies: DependencySet,
    pub shares: bool,
    pub provider_connection_map: Option<ProviderConnectionMap>,
}

/// A connection reference inside a data model schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRef {
    pub provider: String,
    pub connection_id: String,
}

/// What [`rewrite_connections`] did to a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRewrite {
    /// References re-pointed at a target connection.
    pub rewritten: Vec<ConnectionRef>,
    /// References whose provider had no mapping.
    pub untouched: Vec<ConnectionRef>,
}

impl ConnectionRewrite {
    /// Every connection the schema references after the rewrite, deduplicated.
    pub fn referenced(&self) -> Vec<ConnectionRef> {
        let mut refs: Vec<ConnectionRef> = Vec::new();
        for r in self.rewritten.iter().chain(&self.untouched) {
            if !refs.iter().any(|x| x.connection_id == r.connection_id) {
                refs.push(r.clone());
            }
        }
        refs
    }
}

fn datasets_mut(schema: &mut Value) -> Vec<&mut Value> {
    match schema.get_mut("datasets").and_then(Value::as_array_mut) {
        Some(datasets) => datasets.iter_mut().collect(),
        None => Vec::new(),
    }
}

/// Re-point every dataset connection whose provider is a key of `map`.
///
/// Rewritten connections lose their `parameters` so source credentials
/// never reach the target. Unmapped providers are left as they are.
pub fn rewrite_connections(schema: &mut Value, map: &ProviderConnectionMap) -> ConnectionRewrite {
    let mut report = ConnectionRewrite::default();
    for dataset in datasets_mut(schema) {
        let Some(connection) = dataset.get_mut("connection").and_then(Value::as_object_mut) else {
            continue;
        };
        let provider = connection
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let current = connection
            .get("oid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match map.get(&provider) {
            Some(target_id) => {
                connection.insert("oid".to_string(), Value::String(target_id.to_string()));
                connection.remove("parameters");
                report.rewritten.push(ConnectionRef {
                    provider,
                    connection_id: target_id.to_string(),
                });
            }
            None => report.untouched.push(ConnectionRef {
                provider,
                connection_id: current,
            }),
        }
    }
    report
}

/// Collect connection references without changing anything.
pub fn schema_connections(schema: &Value) -> Vec<ConnectionRef> {
    let mut copy = schema.clone();
    rewrite_connections(&mut copy, &ProviderConnectionMap::new()).untouched
}

/// Migrates one data model at a time from source to target.
pub struct DataModelMigrator<'a> {
    source: &'a Environment,
    target: &'a Environment,
    resolver: IdentityResolver,
    options: &'a DataModelOptions,
}

impl<'a> DataModelMigrator<'a> {
    pub fn new(
        source: &'a Environment,
        target: &'a Environment,
        options: &'a DataModelOptions,
    ) -> Self {
        Self {
            source,
            target,
            resolver: IdentityResolver::new(),
            options,
        }
    }

    pub async fn migrate_one(&self, item: &EntityRef) -> Result<MigrationOutcome> {
        let model = self
            .resolver
            .resolve(&Lookup::from(item), EntityKind::DataModel, self.source)
            .await?;
        let model_type = model_type(&model);

        let target_match = self
            .resolver
            .find(&Lookup::Name(model.name.clone()), EntityKind::DataModel, self.target)
            .await?;
        let decision = resolve_conflict(
            self.options.action,
            target_match.as_ref().map(|m| m.id.as_str()),
            &model.name,
            self.options.new_title.as_deref(),
        );
        debug!("DataModel '{}': {:?}", model.name, decision);

        if decision.operation == ConflictOperation::Skip {
            return Ok(MigrationOutcome::skipped(
                decision.effective_id,
                "already exists in target",
            )
            .with_name(decision.effective_name)
            .with_source_name(model.name));
        }

        let mut schema = self.export(&model).await?;
        let rewrite = match &self.options.provider_connection_map {
            Some(map) if !map.is_empty() => rewrite_connections(&mut schema, map),
            _ => ConnectionRewrite {
                rewritten: Vec::new(),
                untouched: schema_connections(&schema),
            },
        };
        for r in &rewrite.rewritten {
            info!(
                "DataModel '{}': {} connection -> {}",
                model.name, r.provider, r.connection_id
            );
        }
        self.validate_connections(&rewrite).await?;

        let target_id = self
            .import(
                &mut schema,
                decision.operation,
                decision.effective_id.as_deref(),
                &decision.effective_name,
            )
            .await?;

        let mut detail = match decision.operation {
            ConflictOperation::Update => "overwritten".to_string(),
            _ => "created".to_string(),
        };
        if self.options.shares {
            match self
                .migrate_shares(&model.name, &decision.effective_name, &model_type)
                .await
            {
                Ok(copied) => detail.push_str(&format!(", {} shares copied", copied)),
                Err(e) => {
                    warn!("DataModel '{}' imported but share copy failed: {}", model.name, e);
                    let written = format!(
                        "{} {}; share copy failed",
                        detail,
                        target_id.as_deref().unwrap_or(&decision.effective_name)
                    );
                    return Ok(MigrationOutcome::incomplete(target_id, &written, &e)
                        .with_name(decision.effective_name)
                        .with_source_name(model.name));
                }
            }
        }

        Ok(MigrationOutcome::migrated(target_id, detail)
            .with_name(decision.effective_name)
            .with_source_name(model.name))
    }

    async fn export(&self, model: &ResolvedEntity) -> Result<Value> {
        let path = endpoints::datamodel_export(&model.id, &self.options.dependencies.to_query_value());
        let response = self
            .source
            .client()
            .get(&path)
            .await?
            .ensure_success(EntityKind::DataModel, &model.name)?;
        if !response.body.is_object() {
            return Err(SisyncError::Api {
                status: response.status,
                message: format!("export of data model '{}' returned no schema", model.name),
            });
        }
        Ok(response.body)
    }

    /// Every referenced connection must exist in the target.
    async fn validate_connections(&self, rewrite: &ConnectionRewrite) -> Result<()> {
        for r in rewrite.referenced() {
            if r.connection_id.is_empty() {
                continue;
            }
            let response = self
                .target
                .client()
                .get(&endpoints::connection_by_id(&r.connection_id))
                .await?;
            if response.status == 404 {
                return Err(SisyncError::ConnectionNotFound {
                    provider: r.provider,
                    connection_id: r.connection_id,
                });
            }
            response.ensure_written(&format!("look up connection {}", r.connection_id))?;
        }
        Ok(())
    }

    async fn import(
        &self,
        schema: &mut Value,
        operation: ConflictOperation,
        target_id: Option<&str>,
        title: &str,
    ) -> Result<Option<String>> {
        if let Some(map) = schema.as_object_mut() {
            map.insert("title".to_string(), Value::String(title.to_string()));
        }
        let path = match (operation, target_id) {
            (ConflictOperation::Update, Some(id)) => endpoints::datamodel_import_into(id),
            _ => {
                if let Some(map) = schema.as_object_mut() {
                    map.remove("oid");
                }
                endpoints::datamodel_import_new(title)
            }
        };
        let response = self
            .target
            .client()
            .post(&path, schema)
            .await?
            .ensure_written(&format!("import data model '{}'", title))?;
        let new_id = response
            .body
            .get("oid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| target_id.map(str::to_string));
        Ok(new_id)
    }

    /// Copy the permission list, remapping principals by name.
    async fn migrate_shares(
        &self,
        source_title: &str,
        target_title: &str,
        model_type: &str,
    ) -> Result<usize> {
        let response = self
            .source
            .client()
            .get(&endpoints::datamodel_shares(model_type, source_title))
            .await?
            .ensure_success(EntityKind::DataModel, source_title)?;

        let mut remapped = Vec::new();
        for row in as_rows(&response.body) {
            let Some(share) = permission_to_share(&row) else {
                debug!("Skipping non-principal permission row {}", row);
                continue;
            };
            if let Some(share) = self
                .resolver
                .remap_share(&share, self.source, self.target)
                .await?
            {
                remapped.push(share_to_permission(&share));
            }
        }

        if remapped.is_empty() {
            warn!("No shares of data model '{}' could be copied", source_title);
            return Ok(0);
        }
        self.target
            .client()
            .put(
                &endpoints::datamodel_shares(model_type, target_title),
                &Value::Array(remapped.clone()),
            )
            .await?
            .ensure_written(&format!("write shares of data model '{}'", target_title))?;
        Ok(remapped.len())
    }
}

fn model_type(model: &ResolvedEntity) -> String {
    model
        .record
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("extract")
        .to_string()
}

/// Data model permissions use `party`/`permission` instead of `shareId`/`rule`.
fn permission_to_share(row: &Value) -> Option<ShareRule> {
    let party = row.get("party").and_then(Value::as_str)?;
    let principal_type = PrincipalType::parse(row.get("type").and_then(Value::as_str)?)?;
    let permission = row.get("permission").and_then(Value::as_str).unwrap_or("r");
    Some(ShareRule::new(party, principal_type, permission))
}

fn share_to_permission(share: &ShareRule) -> Value {
    json!({
        "party": share.principal_id,
        "type": share.principal_type.as_str(),
        "permission": share.rule,
    })
}
