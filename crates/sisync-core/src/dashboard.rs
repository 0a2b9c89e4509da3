//! Dashboard operations within a single environment.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::{as_rows, AccessManagement, IdentityResolver, Lookup};
use crate::migration::ownership::{self, OwnershipSwap};
use crate::models::{share_key, EntityKind, PrincipalType, ScriptPayload, ShareRule};
use crate::network::Environment;

/// A table and column referenced by a dashboard's widgets or filters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DashboardColumn {
    pub table: String,
    pub column: String,
}

/// Which script a read-modify-write targets.
#[derive(Debug, Clone, Copy)]
enum ScriptTarget<'s> {
    Dashboard,
    Widget(&'s str),
}

/// Dashboard reads and writes against one environment.
///
/// Script writes go through [`OwnershipSwap`] when an acting username is
/// given, since only a dashboard's owner may change its scripts.
pub struct Dashboards<'a> {
    env: &'a Environment,
}

impl<'a> Dashboards<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    pub async fn get_all_dashboards(&self) -> Result<Vec<Value>> {
        let response = self
            .env
            .client()
            .get(&endpoints::dashboards_all())
            .await?
            .ensure_success(EntityKind::Dashboard, "*")?;
        let rows = as_rows(&response.body);
        debug!("{} dashboards found", rows.len());
        Ok(rows)
    }

    pub async fn get_dashboard_by_id(&self, dashboard_id: &str) -> Result<Option<Value>> {
        Ok(IdentityResolver::new()
            .find(
                &Lookup::Id(dashboard_id.to_string()),
                EntityKind::Dashboard,
                self.env,
            )
            .await?
            .map(|d| d.record))
    }

    /// `Ambiguous` when more than one dashboard carries the title.
    pub async fn get_dashboard_by_name(&self, title: &str) -> Result<Option<Value>> {
        Ok(IdentityResolver::new()
            .find(
                &Lookup::Name(title.to_string()),
                EntityKind::Dashboard,
                self.env,
            )
            .await?
            .map(|d| d.record))
    }

    /// Attach or replace the dashboard script.
    ///
    /// The payload is validated before anything is fetched or changed.
    pub async fn add_dashboard_script(
        &self,
        dashboard_id: &str,
        script: ScriptPayload,
        acting_username: Option<&str>,
    ) -> Result<()> {
        let body = script.into_body()?;
        let path = endpoints::dashboard_script(dashboard_id);
        OwnershipSwap::new(self.env)
            .run(dashboard_id, acting_username, || self.put_script(&path, &body))
            .await?;
        info!("Script added to dashboard {}", dashboard_id);
        Ok(())
    }

    pub async fn add_widget_script(
        &self,
        dashboard_id: &str,
        widget_id: &str,
        script: ScriptPayload,
        acting_username: Option<&str>,
    ) -> Result<()> {
        let body = script.into_body()?;
        let path = endpoints::widget_script(dashboard_id, widget_id);
        OwnershipSwap::new(self.env)
            .run(dashboard_id, acting_username, || self.put_script(&path, &body))
            .await?;
        info!(
            "Script added to widget {} of dashboard {}",
            widget_id, dashboard_id
        );
        Ok(())
    }

    /// Replace an existing dashboard script as a whole.
    ///
    /// Fails with a `Validation` error, before any ownership change, when the
    /// dashboard has no script yet; use [`add_dashboard_script`](Self::add_dashboard_script)
    /// to attach a first one.
    pub async fn update_dashboard_script(
        &self,
        dashboard_id: &str,
        script: ScriptPayload,
        acting_username: Option<&str>,
    ) -> Result<()> {
        let body = script.into_body()?;
        self.existing_script(dashboard_id, ScriptTarget::Dashboard).await?;
        let path = endpoints::dashboard_script(dashboard_id);
        OwnershipSwap::new(self.env)
            .run(dashboard_id, acting_username, || self.put_script(&path, &body))
            .await?;
        info!("Script updated on dashboard {}", dashboard_id);
        Ok(())
    }

    pub async fn update_widget_script(
        &self,
        dashboard_id: &str,
        widget_id: &str,
        script: ScriptPayload,
        acting_username: Option<&str>,
    ) -> Result<()> {
        let body = script.into_body()?;
        self.existing_script(dashboard_id, ScriptTarget::Widget(widget_id))
            .await?;
        let path = endpoints::widget_script(dashboard_id, widget_id);
        OwnershipSwap::new(self.env)
            .run(dashboard_id, acting_username, || self.put_script(&path, &body))
            .await?;
        info!(
            "Script updated on widget {} of dashboard {}",
            widget_id, dashboard_id
        );
        Ok(())
    }

    /// Replace every occurrence of `find` in the dashboard script.
    ///
    /// Returns the number of occurrences replaced. The current script is read
    /// first; when it does not contain `find` nothing is written.
    pub async fn replace_dashboard_script(
        &self,
        dashboard_id: &str,
        find: &str,
        replacement: &str,
        acting_username: Option<&str>,
    ) -> Result<usize> {
        self.replace_in_script(
            dashboard_id,
            ScriptTarget::Dashboard,
            find,
            replacement,
            acting_username,
        )
        .await
    }

    pub async fn replace_widget_script(
        &self,
        dashboard_id: &str,
        widget_id: &str,
        find: &str,
        replacement: &str,
        acting_username: Option<&str>,
    ) -> Result<usize> {
        self.replace_in_script(
            dashboard_id,
            ScriptTarget::Widget(widget_id),
            find,
            replacement,
            acting_username,
        )
        .await
    }

    async fn replace_in_script(
        &self,
        dashboard_id: &str,
        target: ScriptTarget<'_>,
        find: &str,
        replacement: &str,
        acting_username: Option<&str>,
    ) -> Result<usize> {
        if find.is_empty() {
            return Err(SisyncError::validation(
                "find",
                "text to replace must not be empty",
            ));
        }
        let current = self.existing_script(dashboard_id, target).await?;
        let occurrences = current.matches(find).count();
        if occurrences == 0 {
            return Err(SisyncError::validation(
                "find",
                format!(
                    "'{}' does not occur in the {} script",
                    find,
                    target.label(dashboard_id)
                ),
            ));
        }
        let body = json!({ "script": current.replace(find, replacement) });
        let path = target.path(dashboard_id);
        OwnershipSwap::new(self.env)
            .run(dashboard_id, acting_username, || self.put_script(&path, &body))
            .await?;
        info!(
            "Replaced {} occurrence(s) in the {} script",
            occurrences,
            target.label(dashboard_id)
        );
        Ok(occurrences)
    }

    /// Current script text, or `None` when none is attached.
    pub async fn get_dashboard_script(&self, dashboard_id: &str) -> Result<Option<String>> {
        self.read_script(dashboard_id, ScriptTarget::Dashboard).await
    }

    pub async fn get_widget_script(
        &self,
        dashboard_id: &str,
        widget_id: &str,
    ) -> Result<Option<String>> {
        self.read_script(dashboard_id, ScriptTarget::Widget(widget_id))
            .await
    }

    async fn read_script(
        &self,
        dashboard_id: &str,
        target: ScriptTarget<'_>,
    ) -> Result<Option<String>> {
        let (kind, name) = match target {
            ScriptTarget::Dashboard => (EntityKind::Dashboard, dashboard_id),
            ScriptTarget::Widget(widget_id) => (EntityKind::Widget, widget_id),
        };
        let response = self
            .env
            .client()
            .get(&target.path(dashboard_id))
            .await?
            .ensure_success(kind, name)?;
        Ok(response
            .body
            .get("script")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn existing_script(&self, dashboard_id: &str, target: ScriptTarget<'_>) -> Result<String> {
        self.read_script(dashboard_id, target).await?.ok_or_else(|| {
            SisyncError::validation(
                "script",
                format!("the {} has no script yet", target.label(dashboard_id)),
            )
        })
    }

    async fn put_script(&self, path: &str, body: &Value) -> Result<()> {
        self.env
            .client()
            .put(path, body)
            .await?
            .ensure_written(&format!("write script at {}", path))?;
        Ok(())
    }

    /// Tables and columns the dashboard's widgets and filters query, sorted
    /// and without repeats.
    pub async fn get_dashboard_columns(&self, dashboard_id: &str) -> Result<Vec<DashboardColumn>> {
        let export = self
            .env
            .client()
            .get(&endpoints::dashboard_export(dashboard_id))
            .await?
            .ensure_success(EntityKind::Dashboard, dashboard_id)?
            .body;

        let mut columns = BTreeSet::new();
        for widget in array(&export, "widgets") {
            for panel in array(&widget["metadata"], "panels") {
                for item in array(panel, "items") {
                    collect_jaql(&item["jaql"], &mut columns);
                }
            }
        }
        for filter in array(&export, "filters") {
            collect_jaql(&filter["jaql"], &mut columns);
            for level in array(filter, "levels") {
                collect_jaql(level, &mut columns);
            }
        }
        debug!("Dashboard {} uses {} columns", dashboard_id, columns.len());
        Ok(columns.into_iter().collect())
    }

    pub async fn get_dashboard_shares(&self, dashboard_id: &str) -> Result<Vec<ShareRule>> {
        ownership::read_shares(self.env, dashboard_id).await
    }

    /// Grant `rule` to the named users and groups, keeping existing shares.
    ///
    /// Every name must resolve; an unknown user or group fails the call
    /// before the share list is written.
    pub async fn add_dashboard_shares(
        &self,
        dashboard_id: &str,
        users: &[String],
        groups: &[String],
        rule: &str,
    ) -> Result<usize> {
        let access = AccessManagement::new(self.env);
        let mut grants = Vec::with_capacity(users.len() + groups.len());
        for user in users {
            let id = access
                .get_user_id_by_username(user)
                .await?
                .ok_or_else(|| SisyncError::not_found(EntityKind::User, user))?;
            grants.push(ShareRule::new(id, PrincipalType::User, rule));
        }
        for group in groups {
            let id = access
                .get_group_id_by_name(group)
                .await?
                .ok_or_else(|| SisyncError::not_found(EntityKind::Group, group))?;
            grants.push(ShareRule::new(id, PrincipalType::Group, rule));
        }

        // Existing rows are kept as returned; only new principals are appended.
        let mut rows = ownership::read_share_rows(self.env, dashboard_id).await?;
        let mut seen: HashSet<_> = rows.iter().filter_map(share_key).collect();
        let mut added = 0;
        for share in grants {
            if seen.insert((share.principal_type, share.principal_id.clone())) {
                rows.push(share.to_row());
                added += 1;
            }
        }
        ownership::write_shares(self.env, dashboard_id, rows.as_slice()).await?;
        info!("Dashboard {}: {} shares added", dashboard_id, added);
        Ok(added)
    }

    pub async fn change_dashboard_owner(&self, dashboard_id: &str, user_name: &str) -> Result<()> {
        let owner_id = AccessManagement::new(self.env)
            .get_user_id_by_username(user_name)
            .await?
            .ok_or_else(|| SisyncError::not_found(EntityKind::User, user_name))?;
        ownership::change_owner(self.env, dashboard_id, &owner_id).await?;
        info!("Dashboard {} now owned by '{}'", dashboard_id, user_name);
        Ok(())
    }

    pub async fn republish_dashboard(&self, dashboard_id: &str) -> Result<()> {
        self.env
            .client()
            .post(&endpoints::dashboard_publish(dashboard_id), &json!({}))
            .await?
            .ensure_written(&format!("publish dashboard {}", dashboard_id))?;
        Ok(())
    }
}

impl ScriptTarget<'_> {
    fn path(&self, dashboard_id: &str) -> String {
        match self {
            ScriptTarget::Dashboard => endpoints::dashboard_script(dashboard_id),
            ScriptTarget::Widget(widget_id) => endpoints::widget_script(dashboard_id, widget_id),
        }
    }

    fn label(&self, dashboard_id: &str) -> String {
        match self {
            ScriptTarget::Dashboard => format!("dashboard {}", dashboard_id),
            ScriptTarget::Widget(widget_id) => {
                format!("widget {} of dashboard {}", widget_id, dashboard_id)
            }
        }
    }
}

fn array<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Record the column a JAQL element points at. Formulas carry their operands
/// under `context`, each a JAQL element of its own.
fn collect_jaql(jaql: &Value, out: &mut BTreeSet<DashboardColumn>) {
    if let Some(column) = jaql_column(jaql) {
        out.insert(column);
    }
    if let Some(context) = jaql.get("context").and_then(Value::as_object) {
        for operand in context.values() {
            collect_jaql(operand, out);
        }
    }
}

fn jaql_column(jaql: &Value) -> Option<DashboardColumn> {
    let field = |key: &str| jaql.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
    if let (Some(table), Some(column)) = (field("table"), field("column")) {
        return Some(DashboardColumn {
            table: table.to_string(),
            column: column.to_string(),
        });
    }
    // `dim` reads "[Table.Column]", or "[Table.Column (Calendar)]" for dates.
    let dim = field("dim")?.trim_start_matches('[').trim_end_matches(']');
    let (table, column) = dim.split_once('.')?;
    let column = column.split(" (").next().unwrap_or(column);
    Some(DashboardColumn {
        table: table.to_string(),
        column: column.to_string(),
    })
}
