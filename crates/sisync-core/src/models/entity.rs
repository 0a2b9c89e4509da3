//! Migratable entity types.

use serde::{Deserialize, Serialize};

/// Kind of artifact the engine knows how to look up or migrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    User,
    Group,
    Dashboard,
    #[serde(rename = "datamodel")]
    DataModel,
    Role,
    Widget,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Dashboard => "dashboard",
            EntityKind::DataModel => "datamodel",
            EntityKind::Role => "role",
            EntityKind::Widget => "widget",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to one work item as supplied by the operator.
///
/// Either side may be missing: a run "by ids" starts without names and a
/// run "by names" starts without ids. Resolution fills in the other half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityRef {
    pub fn by_id(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn by_name(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn new(kind: EntityKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            name: Some(name.into()),
        }
    }

    /// Human label: the name when known, otherwise the id.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed>")
    }

    /// The raw key the operator supplied, used for identity resolution.
    pub fn key(&self) -> &str {
        self.id
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

/// An entity after source-side resolution.
///
/// `target_id` is resolved separately in the target environment and is
/// never assumed to equal `source_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratableEntity {
    pub kind: EntityKind,
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl MigratableEntity {
    pub fn new(kind: EntityKind, source_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            source_id: source_id.into(),
            target_id: None,
            name: name.into(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, &self.source_id, &self.name)
    }
}
