//! Access-control rows attached to dashboards and data models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SisyncError};

/// Principal a share grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Group,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "user",
            PrincipalType::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Some(PrincipalType::User),
            "group" => Some(PrincipalType::Group),
            _ => None,
        }
    }
}

/// One row of an artifact's access-control list.
///
/// Serializes in the dashboard `sharesTo` wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareRule {
    #[serde(rename = "shareId")]
    pub principal_id: String,
    #[serde(rename = "type")]
    pub principal_type: PrincipalType,
    pub rule: String,
    pub subscribe: bool,
}

const DEFAULT_RULE: &str = "edit";

impl ShareRule {
    pub fn new(
        principal_id: impl Into<String>,
        principal_type: PrincipalType,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_type,
            rule: rule.into(),
            subscribe: false,
        }
    }

    /// Read one `sharesTo` row.
    ///
    /// `type` is matched case-insensitively; a missing or null `rule` is
    /// `edit` and a missing or null `subscribe` is `false`. A row that is not
    /// a user or group grant is a `Validation` error.
    pub fn from_row(row: &Value) -> Result<ShareRule> {
        let (principal_type, principal_id) = share_key(row).ok_or_else(|| {
            SisyncError::validation("sharesTo", format!("unsupported share row {}", row))
        })?;
        Ok(ShareRule {
            principal_id,
            principal_type,
            rule: row
                .get("rule")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_RULE)
                .to_string(),
            subscribe: row
                .get("subscribe")
                .and_then(Value::as_bool)
                .unwrap_or_default(),
        })
    }

    /// Parse every row of a `sharesTo` list; the first bad row fails the list.
    pub fn parse_list(rows: &[Value]) -> Result<Vec<ShareRule>> {
        rows.iter().map(ShareRule::from_row).collect()
    }

    pub fn to_row(&self) -> Value {
        serde_json::json!({
            "shareId": self.principal_id,
            "type": self.principal_type.as_str(),
            "rule": self.rule,
            "subscribe": self.subscribe,
        })
    }
}

/// Principal a raw `sharesTo` row grants access to.
pub fn share_key(row: &Value) -> Option<(PrincipalType, String)> {
    let principal_type = row.get("type").and_then(Value::as_str).and_then(PrincipalType::parse)?;
    let principal_id = row.get("shareId").and_then(Value::as_str)?;
    Some((principal_type, principal_id.to_string()))
}

/// Remove later rows for a principal that already appeared.
pub fn dedupe_shares(shares: Vec<ShareRule>) -> Vec<ShareRule> {
    let mut seen = std::collections::HashSet::new();
    shares
        .into_iter()
        .filter(|s| seen.insert((s.principal_type, s.principal_id.clone())))
        .collect()
}
