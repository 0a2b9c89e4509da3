//! Operator-facing migration options.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::{Result, SisyncError};

/// What to do when the target already holds a matching artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    #[default]
    Skip,
    Overwrite,
    Duplicate,
}

impl ConflictAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictAction::Skip => "skip",
            ConflictAction::Overwrite => "overwrite",
            ConflictAction::Duplicate => "duplicate",
        }
    }
}

impl FromStr for ConflictAction {
    type Err = SisyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictAction::Skip),
            "overwrite" => Ok(ConflictAction::Overwrite),
            "duplicate" => Ok(ConflictAction::Duplicate),
            other => Err(SisyncError::validation(
                "action",
                format!("'{}' is not one of skip, overwrite, duplicate", other),
            )),
        }
    }
}

impl std::fmt::Display for ConflictAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Auxiliary artifact that can travel with a data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dependency {
    #[serde(rename = "dataSecurity")]
    DataSecurity,
    #[serde(rename = "formulas")]
    Formulas,
    #[serde(rename = "hierarchies")]
    Hierarchies,
    #[serde(rename = "perspectives")]
    Perspectives,
}

impl Dependency {
    pub const ALL: [Dependency; 4] = [
        Dependency::DataSecurity,
        Dependency::Formulas,
        Dependency::Hierarchies,
        Dependency::Perspectives,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::DataSecurity => "dataSecurity",
            Dependency::Formulas => "formulas",
            Dependency::Hierarchies => "hierarchies",
            Dependency::Perspectives => "perspectives",
        }
    }
}

impl FromStr for Dependency {
    type Err = SisyncError;

    fn from_str(s: &str) -> Result<Self> {
        Dependency::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SisyncError::validation(
                    "dependencies",
                    format!(
                        "unknown dependency '{}'; expected dataSecurity, formulas, hierarchies, perspectives or all",
                        s
                    ),
                )
            })
    }
}

/// Which dependencies to carry along with a data model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencySet {
    #[default]
    All,
    Only(BTreeSet<Dependency>),
}

impl DependencySet {
    pub fn none() -> Self {
        DependencySet::Only(BTreeSet::new())
    }

    /// Parse operator input: either the single sentinel `all` or a list of names.
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        if items.len() == 1 && items[0].as_ref().trim().eq_ignore_ascii_case("all") {
            return Ok(DependencySet::All);
        }
        let set = items
            .iter()
            .map(|s| s.as_ref().parse::<Dependency>())
            .collect::<Result<BTreeSet<_>>>()?;
        Ok(DependencySet::Only(set))
    }

    pub fn contains(&self, dependency: Dependency) -> bool {
        match self {
            DependencySet::All => true,
            DependencySet::Only(set) => set.contains(&dependency),
        }
    }

    /// Selected dependencies in a stable order.
    pub fn selected(&self) -> Vec<Dependency> {
        Dependency::ALL
            .into_iter()
            .filter(|d| self.contains(*d))
            .collect()
    }

    /// Comma-separated form used in export query strings.
    pub fn to_query_value(&self) -> String {
        self.selected()
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Source provider name → target connection id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConnectionMap(BTreeMap<String, String>);

impl ProviderConnectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: impl Into<String>, connection_id: impl Into<String>) {
        self.0.insert(provider.into(), connection_id.into());
    }

    pub fn get(&self, provider: &str) -> Option<&str> {
        self.0.get(provider).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProviderConnectionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A script to attach to a dashboard or widget.
///
/// Either a pre-formed `{"script": "..."}` payload or a raw script body.
/// Both resolve to the same canonical payload via [`ScriptPayload::into_body`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptPayload {
    Structured(Value),
    RawBody(String),
}

impl ScriptPayload {
    /// Parse a structured payload from JSON text.
    pub fn structured_from_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            SisyncError::validation("script", format!("script must be valid JSON: {}", e))
        })?;
        Ok(ScriptPayload::Structured(value))
    }

    /// Pick the variant for untyped operator input: text starting with `{`
    /// is a structured payload, anything else is a raw body.
    pub fn from_input(input: &str) -> Result<Self> {
        if input.trim_start().starts_with('{') {
            Self::structured_from_str(input)
        } else {
            Ok(ScriptPayload::RawBody(input.to_string()))
        }
    }

    /// Canonical request body: an object with a string `script` field.
    pub fn into_body(self) -> Result<Value> {
        match self {
            ScriptPayload::RawBody(body) => Ok(json!({ "script": body })),
            ScriptPayload::Structured(value) => {
                let script_ok = value
                    .as_object()
                    .and_then(|o| o.get("script"))
                    .map(Value::is_string)
                    .unwrap_or(false);
                if script_ok {
                    Ok(value)
                } else {
                    Err(SisyncError::validation(
                        "script",
                        "structured payload must be an object with a string 'script' field",
                    ))
                }
            }
        }
    }
}
