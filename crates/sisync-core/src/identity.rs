//! Name and identifier resolution within one environment.
//!
//! Every lookup re-queries the environment. Nothing is cached, so a lookup
//! late in a run sees artifacts created earlier in the same run.

use serde_json::Value;
use tracing::{debug, warn};

use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::models::{EntityKind, EntityRef, MigratableEntity, PrincipalType, ShareRule};
use crate::network::Environment;

/// What the caller knows about the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(String),
    Name(String),
}

impl Lookup {
    pub fn value(&self) -> &str {
        match self {
            Lookup::Id(v) | Lookup::Name(v) => v,
        }
    }
}

impl From<&EntityRef> for Lookup {
    fn from(item: &EntityRef) -> Self {
        match (&item.id, &item.name) {
            (Some(id), _) => Lookup::Id(id.clone()),
            (None, Some(name)) => Lookup::Name(name.clone()),
            (None, None) => Lookup::Name(String::new()),
        }
    }
}

/// An artifact that exists in the queried environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    /// The record as returned by the environment.
    pub record: Value,
}

impl ResolvedEntity {
    /// Source-side view of the artifact, with the owner when the record
    /// carries one.
    pub fn to_entity(&self) -> MigratableEntity {
        let owner = self
            .record
            .get("owner")
            .and_then(Value::as_str)
            .map(str::to_string);
        MigratableEntity::new(self.kind, &self.id, &self.name).with_owner(owner)
    }
}

fn id_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Dashboard | EntityKind::DataModel | EntityKind::Widget => "oid",
        EntityKind::User | EntityKind::Group | EntityKind::Role => "_id",
    }
}

fn name_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "userName",
        EntityKind::Group | EntityKind::Role => "name",
        EntityKind::Dashboard | EntityKind::DataModel | EntityKind::Widget => "title",
    }
}

fn str_field<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

/// Normalize list responses: a bare array, or an object wrapping one.
pub(crate) fn as_rows(body: &Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows.clone(),
        Value::Object(map) => ["items", "data", "results"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .cloned()
            .unwrap_or_else(|| vec![body.clone()]),
        _ => Vec::new(),
    }
}

/// Resolves names or ids to environment-specific identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve or fail with `NotFound`.
    pub async fn resolve(
        &self,
        lookup: &Lookup,
        kind: EntityKind,
        env: &Environment,
    ) -> Result<ResolvedEntity> {
        self.find(lookup, kind, env)
            .await?
            .ok_or_else(|| SisyncError::not_found(kind, lookup.value()))
    }

    pub async fn resolve_id(
        &self,
        lookup: &Lookup,
        kind: EntityKind,
        env: &Environment,
    ) -> Result<String> {
        Ok(self.resolve(lookup, kind, env).await?.id)
    }

    /// `Ok(None)` when nothing matches; `Ambiguous` when a name matches more
    /// than one artifact.
    pub async fn find(
        &self,
        lookup: &Lookup,
        kind: EntityKind,
        env: &Environment,
    ) -> Result<Option<ResolvedEntity>> {
        if lookup.value().is_empty() {
            return Err(SisyncError::validation(
                kind.as_str(),
                "empty name or id",
            ));
        }
        debug!("Resolving {} {:?} in {}", kind, lookup, env.role());
        match lookup {
            Lookup::Id(id) => self.find_by_id(id, kind, env).await,
            Lookup::Name(name) => self.find_by_name(name, kind, env).await,
        }
    }

    async fn find_by_id(
        &self,
        id: &str,
        kind: EntityKind,
        env: &Environment,
    ) -> Result<Option<ResolvedEntity>> {
        let path = match kind {
            EntityKind::User => endpoints::user_by_id(id),
            EntityKind::Group => endpoints::group_by_id(id),
            EntityKind::Dashboard => endpoints::dashboard_by_id(id),
            EntityKind::DataModel => endpoints::datamodel_by_id(id),
            EntityKind::Role => format!("{}/{}", endpoints::ROLES, urlencoding::encode(id)),
            EntityKind::Widget => {
                return Err(SisyncError::validation(
                    "kind",
                    "widgets are resolved through their dashboard",
                ))
            }
        };
        let response = env.client().get(&path).await?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = response.ensure_success(kind, id)?;

        // The dashboard admin endpoint answers with a (possibly empty) list.
        let record = as_rows(&response.body)
            .into_iter()
            .find(|row| str_field(row, id_field(kind)) == Some(id));
        Ok(record.map(|record| ResolvedEntity {
            kind,
            id: id.to_string(),
            name: str_field(&record, name_field(kind))
                .unwrap_or(id)
                .to_string(),
            record,
        }))
    }

    async fn find_by_name(
        &self,
        name: &str,
        kind: EntityKind,
        env: &Environment,
    ) -> Result<Option<ResolvedEntity>> {
        let path = match kind {
            EntityKind::User => endpoints::user_by_name(name),
            EntityKind::Group => endpoints::group_by_name(name),
            EntityKind::Dashboard => endpoints::dashboard_by_name(name),
            EntityKind::DataModel => endpoints::DATAMODELS.to_string(),
            EntityKind::Role => endpoints::ROLES.to_string(),
            EntityKind::Widget => {
                return Err(SisyncError::validation(
                    "kind",
                    "widgets are resolved through their dashboard",
                ))
            }
        };
        let response = env.client().get(&path).await?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = response.ensure_success(kind, name)?;

        // Server-side filters may be fuzzy; only exact, case-sensitive matches count.
        let mut matches: Vec<Value> = as_rows(&response.body)
            .into_iter()
            .filter(|row| str_field(row, name_field(kind)) == Some(name))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => {
                let record = matches.remove(0);
                let id = str_field(&record, id_field(kind))
                    .ok_or_else(|| {
                        SisyncError::Other(format!(
                            "{} '{}' has no '{}' field",
                            kind,
                            name,
                            id_field(kind)
                        ))
                    })?
                    .to_string();
                Ok(Some(ResolvedEntity {
                    kind,
                    id,
                    name: name.to_string(),
                    record,
                }))
            }
            count => Err(SisyncError::Ambiguous {
                kind,
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Re-point a share from the source identifier space into the target's,
    /// matching the principal by user name or group name.
    ///
    /// `Ok(None)` when the principal does not exist in the target.
    pub async fn remap_share(
        &self,
        share: &ShareRule,
        source: &Environment,
        target: &Environment,
    ) -> Result<Option<ShareRule>> {
        let kind = match share.principal_type {
            PrincipalType::User => EntityKind::User,
            PrincipalType::Group => EntityKind::Group,
        };
        let Some(source_principal) = self
            .find(&Lookup::Id(share.principal_id.clone()), kind, source)
            .await?
        else {
            warn!(
                "Share principal {} {} no longer exists in source",
                kind, share.principal_id
            );
            return Ok(None);
        };

        match self
            .find(&Lookup::Name(source_principal.name.clone()), kind, target)
            .await?
        {
            Some(target_principal) => Ok(Some(ShareRule {
                principal_id: target_principal.id,
                ..share.clone()
            })),
            None => {
                warn!(
                    "{} '{}' not found in target, dropping its share",
                    kind, source_principal.name
                );
                Ok(None)
            }
        }
    }
}

/// Identity lookups for users, groups and roles in one environment.
pub struct AccessManagement<'a> {
    env: &'a Environment,
    resolver: IdentityResolver,
}

impl<'a> AccessManagement<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            resolver: IdentityResolver::new(),
        }
    }

    pub async fn get_user(&self, user_name: &str) -> Result<Option<Value>> {
        Ok(self
            .resolver
            .find(&Lookup::Name(user_name.to_string()), EntityKind::User, self.env)
            .await?
            .map(|u| u.record))
    }

    pub async fn get_user_id_by_username(&self, user_name: &str) -> Result<Option<String>> {
        self.find_id(EntityKind::User, user_name).await
    }

    pub async fn get_group(&self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .resolver
            .find(&Lookup::Name(name.to_string()), EntityKind::Group, self.env)
            .await?
            .map(|g| g.record))
    }

    pub async fn get_group_id_by_name(&self, name: &str) -> Result<Option<String>> {
        self.find_id(EntityKind::Group, name).await
    }

    pub async fn get_role_id_by_name(&self, name: &str) -> Result<Option<String>> {
        self.find_id(EntityKind::Role, name).await
    }

    async fn find_id(&self, kind: EntityKind, name: &str) -> Result<Option<String>> {
        Ok(self
            .resolver
            .find(&Lookup::Name(name.to_string()), kind, self.env)
            .await?
            .map(|e| e.id))
    }
}
