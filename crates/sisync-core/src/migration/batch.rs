//! Sequential batch execution with inter-batch throttling.

use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::error::{Result, SisyncError};
use crate::models::{
    elapsed_secs, EntityRef, MigrationOutcome, MigrationResult, MigrationStatus, MigrationSummary,
};

/// Batch size and the pause taken between batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    batch_size: usize,
    sleep_time: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: MigrationConfig::DEFAULT_BATCH_SIZE,
            sleep_time: MigrationConfig::DEFAULT_SLEEP_TIME,
        }
    }
}

impl BatchConfig {
    pub fn new(batch_size: usize, sleep_time: Duration) -> Result<Self> {
        if batch_size == 0 {
            return Err(SisyncError::validation(
                "batch_size",
                "must be at least 1",
            ));
        }
        Ok(Self {
            batch_size,
            sleep_time,
        })
    }

    /// All items in one batch, no pause.
    pub fn single(len: usize) -> Self {
        Self {
            batch_size: len.max(1),
            sleep_time: Duration::ZERO,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    /// `ceil(items / batch_size)`.
    pub fn batch_count(&self, items: usize) -> usize {
        items.div_ceil(self.batch_size)
    }
}

/// Runs a per-item function over consecutive batches.
///
/// Items run one at a time in input order. An item's error becomes a
/// `failed` result and the run moves on.
#[derive(Debug, Clone, Copy)]
pub struct BatchOrchestrator {
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub async fn run<F, Fut>(&self, items: Vec<EntityRef>, mut per_item: F) -> MigrationSummary
    where
        F: FnMut(EntityRef) -> Fut,
        Fut: Future<Output = Result<MigrationOutcome>>,
    {
        let started_at = Utc::now();
        let total = items.len();
        let batch_count = self.config.batch_count(total);
        let mut results = Vec::with_capacity(total);
        let mut sleep_count = 0;
        let mut total_sleep = Duration::ZERO;

        for (index, batch) in items.chunks(self.config.batch_size).enumerate() {
            info!(
                "Processing batch {}/{} ({} items)",
                index + 1,
                batch_count,
                batch.len()
            );

            for item in batch {
                let result = match per_item(item.clone()).await {
                    Ok(outcome) => {
                        let mut entity = item.clone();
                        if entity.name.is_none() {
                            entity.name = outcome.source_name.clone();
                        }
                        info!(
                            "{} '{}': {:?} {}",
                            entity.kind,
                            entity.label(),
                            outcome.status,
                            outcome.detail
                        );
                        MigrationResult::from_outcome(entity, outcome)
                    }
                    Err(e) => {
                        warn!("{} '{}' failed: {}", item.kind, item.label(), e);
                        MigrationResult::failed(item.clone(), &e)
                    }
                };
                results.push(result);
            }

            if index + 1 < batch_count && !self.config.sleep_time.is_zero() {
                info!(
                    "Batch {}/{} done, sleeping {:?}",
                    index + 1,
                    batch_count,
                    self.config.sleep_time
                );
                tokio::time::sleep(self.config.sleep_time).await;
                sleep_count += 1;
                total_sleep += self.config.sleep_time;
            }
        }

        let finished_at = Utc::now();
        let summary = MigrationSummary {
            batch_count,
            batch_size: self.config.batch_size,
            sleep_time_secs: self.config.sleep_time.as_secs_f64(),
            sleep_count,
            total_sleep_secs: total_sleep.as_secs_f64(),
            elapsed_secs: elapsed_secs(started_at, finished_at),
            started_at,
            finished_at,
            results,
        };
        info!(
            "Run finished: {} migrated, {} skipped, {} failed of {}",
            summary.count(MigrationStatus::Migrated),
            summary.count(MigrationStatus::Skipped),
            summary.count(MigrationStatus::Failed),
            summary.total()
        );
        summary
    }
}
