//! Group and user migration.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::{as_rows, AccessManagement, IdentityResolver, Lookup};
use crate::models::{EntityKind, EntityRef, MigrationOutcome};
use crate::network::Environment;

fn str_field<'v>(record: &'v Value, field: &str) -> Option<&'v str> {
    record.get(field).and_then(Value::as_str)
}

/// Source groups worth migrating: everything except the built-ins.
pub async fn list_custom_groups(source: &Environment) -> Result<Vec<EntityRef>> {
    let response = source
        .client()
        .get(endpoints::GROUPS)
        .await?
        .ensure_success(EntityKind::Group, "*")?;
    Ok(as_rows(&response.body)
        .iter()
        .filter_map(|row| {
            let name = str_field(row, "name")?;
            if MigrationConfig::BUILTIN_GROUPS.contains(&name) {
                return None;
            }
            let id = str_field(row, "_id")?;
            Some(EntityRef::new(EntityKind::Group, id, name))
        })
        .collect())
}

/// Every user in the source.
pub async fn list_users(source: &Environment) -> Result<Vec<EntityRef>> {
    let response = source
        .client()
        .get(&endpoints::users_all())
        .await?
        .ensure_success(EntityKind::User, "*")?;
    Ok(as_rows(&response.body)
        .iter()
        .filter_map(|row| {
            Some(EntityRef::new(
                EntityKind::User,
                str_field(row, "_id")?,
                str_field(row, "userName")?,
            ))
        })
        .collect())
}

pub struct AccessMigrator<'a> {
    source: &'a Environment,
    target: &'a Environment,
    resolver: IdentityResolver,
}

impl<'a> AccessMigrator<'a> {
    pub fn new(source: &'a Environment, target: &'a Environment) -> Self {
        Self {
            source,
            target,
            resolver: IdentityResolver::new(),
        }
    }

    /// Create the group in target unless one with the same name exists.
    pub async fn migrate_group(&self, item: &EntityRef) -> Result<MigrationOutcome> {
        let group = self
            .resolver
            .resolve(&Lookup::from(item), EntityKind::Group, self.source)
            .await?;

        if let Some(existing) = self
            .resolver
            .find(&Lookup::Name(group.name.clone()), EntityKind::Group, self.target)
            .await?
        {
            return Ok(MigrationOutcome::skipped(Some(existing.id), "already exists in target")
                .with_source_name(group.name));
        }

        let response = self
            .target
            .client()
            .post(endpoints::GROUPS, &json!({ "name": group.name }))
            .await?
            .ensure_written(&format!("create group '{}'", group.name))?;
        let id = str_field(&response.body, "_id").map(str::to_string);
        Ok(MigrationOutcome::migrated(id, "created").with_source_name(group.name))
    }

    /// Create the user in target with its role and groups resolved by name.
    pub async fn migrate_user(&self, item: &EntityRef) -> Result<MigrationOutcome> {
        let user = self
            .resolver
            .resolve(&Lookup::from(item), EntityKind::User, self.source)
            .await?;

        if let Some(existing) = self
            .resolver
            .find(&Lookup::Name(user.name.clone()), EntityKind::User, self.target)
            .await?
        {
            return Ok(MigrationOutcome::skipped(Some(existing.id), "already exists in target")
                .with_source_name(user.name));
        }

        // The listing may not carry expanded role and groups.
        let record = if user.record.get("groups").is_some() {
            user.record.clone()
        } else {
            AccessManagement::new(self.source)
                .get_user(&user.name)
                .await?
                .unwrap_or_else(|| user.record.clone())
        };

        let target_access = AccessManagement::new(self.target);
        let mut body = Map::new();
        for field in ["email", "userName", "firstName", "lastName"] {
            if let Some(value) = record.get(field) {
                body.insert(field.to_string(), value.clone());
            }
        }

        if let Some(role_name) = self.role_name(&record).await? {
            let role_id = target_access
                .get_role_id_by_name(&role_name)
                .await?
                .ok_or_else(|| SisyncError::not_found(EntityKind::Role, &role_name))?;
            body.insert("roleId".to_string(), Value::String(role_id));
        }

        let mut group_ids = Vec::new();
        for group_name in self.group_names(&record).await? {
            match target_access.get_group_id_by_name(&group_name).await? {
                Some(id) => group_ids.push(Value::String(id)),
                None => warn!(
                    "Group '{}' of user '{}' not found in target, omitting",
                    group_name, user.name
                ),
            }
        }
        body.insert("groups".to_string(), Value::Array(group_ids));
        debug!("Creating user '{}' with {:?}", user.name, body.keys());

        let response = self
            .target
            .client()
            .post(endpoints::USERS, &Value::Object(body))
            .await?
            .ensure_written(&format!("create user '{}'", user.name))?;
        let id = str_field(&response.body, "_id").map(str::to_string);
        Ok(MigrationOutcome::migrated(id, "created").with_source_name(user.name))
    }

    /// Role name from an expanded role object or a bare role id.
    async fn role_name(&self, record: &Value) -> Result<Option<String>> {
        match record.get("role").or_else(|| record.get("roleId")) {
            Some(Value::Object(role)) => Ok(role
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)),
            Some(Value::String(role_id)) => Ok(Some(
                self.resolver
                    .resolve(&Lookup::Id(role_id.clone()), EntityKind::Role, self.source)
                    .await?
                    .name,
            )),
            _ => Ok(None),
        }
    }

    async fn group_names(&self, record: &Value) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let Some(groups) = record.get("groups").and_then(Value::as_array) else {
            return Ok(names);
        };
        for group in groups {
            match group {
                Value::Object(g) => {
                    if let Some(name) = g.get("name").and_then(Value::as_str) {
                        names.push(name.to_string());
                    }
                }
                Value::String(id) => {
                    if let Some(g) = self
                        .resolver
                        .find(&Lookup::Id(id.clone()), EntityKind::Group, self.source)
                        .await?
                    {
                        names.push(g.name);
                    }
                }
                _ => {}
            }
        }
        Ok(names)
    }
}
