//! Per-item outcomes and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityRef;
use crate::error::{Result, SisyncError};

/// Final status of one migrated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Migrated,
    Skipped,
    Failed,
}

/// Outcome reported by a per-item migration function on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub status: MigrationStatus,
    /// Name the entity carries in the source, once resolved.
    pub source_name: Option<String>,
    /// Name the entity carries in the target.
    pub name: Option<String>,
    pub target_id: Option<String>,
    pub detail: String,
    pub error_kind: Option<String>,
}

impl MigrationOutcome {
    pub fn migrated(target_id: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            status: MigrationStatus::Migrated,
            source_name: None,
            name: None,
            target_id,
            detail: detail.into(),
            error_kind: None,
        }
    }

    pub fn skipped(target_id: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            status: MigrationStatus::Skipped,
            source_name: None,
            name: None,
            target_id,
            detail: detail.into(),
            error_kind: None,
        }
    }

    /// The artifact was written to the target but a follow-up step failed.
    /// Counts as failed and keeps the target id so a re-run can find it.
    pub fn incomplete(target_id: Option<String>, written: &str, error: &SisyncError) -> Self {
        Self {
            status: MigrationStatus::Failed,
            source_name: None,
            name: None,
            detail: format!("{}: {}", written, error),
            target_id,
            error_kind: Some(error.category().to_string()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }
}

/// One entry in a migration report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub entity: EntityRef,
    pub status: MigrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Name in the target when it differs from the source name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    pub detail: String,
    /// Error category for failed entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl MigrationResult {
    pub fn from_outcome(entity: EntityRef, outcome: MigrationOutcome) -> Self {
        let target_name = outcome
            .name
            .filter(|n| entity.name.as_deref() != Some(n.as_str()));
        Self {
            entity,
            status: outcome.status,
            target_id: outcome.target_id,
            target_name,
            detail: outcome.detail,
            error_kind: outcome.error_kind,
        }
    }

    pub fn failed(entity: EntityRef, error: &SisyncError) -> Self {
        Self {
            entity,
            status: MigrationStatus::Failed,
            target_id: None,
            target_name: None,
            detail: error.to_string(),
            error_kind: Some(error.category().to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == MigrationStatus::Failed
    }
}

/// Ordered results of one run plus batch metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub results: Vec<MigrationResult>,
    pub batch_count: usize,
    pub batch_size: usize,
    /// Configured pause between batches, in seconds.
    pub sleep_time_secs: f64,
    /// Number of pauses actually taken.
    pub sleep_count: usize,
    pub total_sleep_secs: f64,
    pub elapsed_secs: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, status: MigrationStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn migrated(&self) -> usize {
        self.count(MigrationStatus::Migrated)
    }

    pub fn skipped(&self) -> usize {
        self.count(MigrationStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(MigrationStatus::Failed)
    }

    /// Error out when any item failed. The summary itself stays intact.
    pub fn ensure_complete(&self) -> Result<()> {
        let failed = self.failed();
        if failed > 0 {
            return Err(SisyncError::PartialFailure {
                failed,
                total: self.total(),
            });
        }
        Ok(())
    }
}

pub(crate) fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityKind;

    fn summary_with(statuses: &[MigrationStatus]) -> MigrationSummary {
        let results = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| MigrationResult {
                entity: EntityRef::by_name(EntityKind::Group, format!("g{}", i)),
                status: *status,
                target_id: None,
                target_name: None,
                detail: String::new(),
                error_kind: None,
            })
            .collect();
        let now = Utc::now();
        MigrationSummary {
            results,
            batch_count: 1,
            batch_size: statuses.len(),
            sleep_time_secs: 0.0,
            sleep_count: 0,
            total_sleep_secs: 0.0,
            elapsed_secs: 0.0,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_counts_and_completion() {
        let summary = summary_with(&[
            MigrationStatus::Migrated,
            MigrationStatus::Skipped,
            MigrationStatus::Failed,
        ]);
        assert_eq!(summary.migrated(), 1);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(matches!(
            summary.ensure_complete(),
            Err(SisyncError::PartialFailure { failed: 1, total: 3 })
        ));

        let summary = summary_with(&[MigrationStatus::Migrated]);
        assert!(summary.ensure_complete().is_ok());
    }

    #[test]
    fn test_target_name_only_when_renamed() {
        let entity = EntityRef::new(EntityKind::Dashboard, "d1", "Sales");
        let same = MigrationResult::from_outcome(
            entity.clone(),
            MigrationOutcome::migrated(Some("t1".into()), "ok").with_name("Sales"),
        );
        assert_eq!(same.target_name, None);

        let renamed = MigrationResult::from_outcome(
            entity,
            MigrationOutcome::migrated(Some("t2".into()), "ok").with_name("Sales (Duplicate)"),
        );
        assert_eq!(renamed.target_name.as_deref(), Some("Sales (Duplicate)"));
    }

    #[test]
    fn test_incomplete_outcome_is_failed_with_target_id() {
        let err = SisyncError::Api {
            status: 500,
            message: "down".into(),
        };
        let result = MigrationResult::from_outcome(
            EntityRef::new(EntityKind::DataModel, "m1", "Sales"),
            MigrationOutcome::incomplete(Some("tm-1".into()), "created tm-1; share copy failed", &err),
        );
        assert!(result.is_failed());
        assert_eq!(result.target_id.as_deref(), Some("tm-1"));
        assert_eq!(
            result.detail,
            "created tm-1; share copy failed: API error (HTTP 500): down"
        );
        assert_eq!(result.error_kind.as_deref(), Some("api"));
    }

    #[test]
    fn test_failed_result_carries_category() {
        let err = SisyncError::not_found(EntityKind::Group, "ops");
        let result = MigrationResult::failed(EntityRef::by_name(EntityKind::Group, "ops"), &err);
        assert!(result.is_failed());
        assert_eq!(result.error_kind.as_deref(), Some("not_found"));
        assert_eq!(result.detail, "group 'ops' not found");
    }
}
