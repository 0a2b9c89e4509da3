//! Decides create, update or skip for one artifact against the target.

use crate::config::MigrationConfig;
use crate::models::ConflictAction;

/// Network operation to perform in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictOperation {
    Create,
    Update,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDecision {
    pub operation: ConflictOperation,
    /// Target id to update or skip over. Always `None` for creates.
    pub effective_id: Option<String>,
    pub effective_name: String,
}

/// Apply `action` given the id of the matching target artifact, if any.
///
/// `new_title` only matters for `Duplicate`; an empty title counts as absent.
pub fn resolve_conflict(
    action: ConflictAction,
    target_match: Option<&str>,
    proposed_name: &str,
    new_title: Option<&str>,
) -> ConflictDecision {
    let Some(matched_id) = target_match else {
        return ConflictDecision {
            operation: ConflictOperation::Create,
            effective_id: None,
            effective_name: proposed_name.to_string(),
        };
    };

    match action {
        ConflictAction::Skip => ConflictDecision {
            operation: ConflictOperation::Skip,
            effective_id: Some(matched_id.to_string()),
            effective_name: proposed_name.to_string(),
        },
        ConflictAction::Overwrite => ConflictDecision {
            operation: ConflictOperation::Update,
            effective_id: Some(matched_id.to_string()),
            effective_name: proposed_name.to_string(),
        },
        ConflictAction::Duplicate => ConflictDecision {
            operation: ConflictOperation::Create,
            effective_id: None,
            effective_name: duplicate_name(proposed_name, new_title),
        },
    }
}

/// Name for a duplicate: the explicit title, or the name plus the suffix.
pub fn duplicate_name(proposed_name: &str, new_title: Option<&str>) -> String {
    match new_title.map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => format!("{}{}", proposed_name, MigrationConfig::DUPLICATE_SUFFIX),
    }
}
