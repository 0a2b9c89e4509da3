//! Temporary ownership swap for dashboards the acting identity does not own.
//!
//! The protocol is capture, act, restore. [`OwnershipSwap::run`] captures
//! owner and shares, hands ownership to the acting user, runs the mutation
//! and then restores through an [`OwnershipGuard`]. Restoration is attempted
//! on every path after a successful capture. A guard dropped without
//! restoring (the future was cancelled, or the mutation panicked) logs the
//! captured state so an operator can reconcile by hand.

use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, error, info, warn};

use crate::config::MigrationConfig;
use crate::endpoints;
use crate::error::{Result, SisyncError};
use crate::identity::{as_rows, AccessManagement};
use crate::models::{EntityKind, ShareRule};
use crate::network::Environment;

/// Owner and share list of a dashboard before any mutation.
///
/// Shares are the raw `sharesTo` rows, written back untouched on restore.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedState {
    pub dashboard_id: String,
    pub owner_id: String,
    pub shares: Vec<Value>,
}

impl CapturedState {
    /// One-line rendering for logs and inconsistent-state reports.
    pub fn describe(&self) -> String {
        let shares = serde_json::to_string(&self.shares).unwrap_or_else(|_| "[]".to_string());
        format!("owner={} shares={}", self.owner_id, shares)
    }
}

/// Current owner id of a dashboard.
pub async fn read_owner(env: &Environment, dashboard_id: &str) -> Result<String> {
    let response = env
        .client()
        .get(&endpoints::dashboard_by_id(dashboard_id))
        .await?
        .ensure_success(EntityKind::Dashboard, dashboard_id)?;
    as_rows(&response.body)
        .into_iter()
        .find_map(|row| row.get("owner").and_then(|o| o.as_str()).map(str::to_string))
        .ok_or_else(|| SisyncError::not_found(EntityKind::Dashboard, dashboard_id))
}

/// The dashboard's `sharesTo` rows exactly as the environment returned them.
pub async fn read_share_rows(env: &Environment, dashboard_id: &str) -> Result<Vec<Value>> {
    let action = format!("retrieve shares of dashboard {}", dashboard_id);
    let response = env
        .client()
        .get(&endpoints::dashboard_shares(dashboard_id))
        .await?
        .ensure_written(&action)?;
    response.body["sharesTo"]
        .as_array()
        .cloned()
        .ok_or_else(|| SisyncError::Api {
            status: response.status,
            message: format!("{}: response has no sharesTo list", action),
        })
}

/// The dashboard's share list; fails on any row that is not a user or
/// group grant.
pub async fn read_shares(env: &Environment, dashboard_id: &str) -> Result<Vec<ShareRule>> {
    ShareRule::parse_list(&read_share_rows(env, dashboard_id).await?)
}

/// Replace the dashboard's share list with `shares`.
pub async fn write_shares<S: Serialize>(
    env: &Environment,
    dashboard_id: &str,
    shares: &[S],
) -> Result<()> {
    let body = json!({ "sharesTo": shares });
    env.client()
        .post(&endpoints::dashboard_shares(dashboard_id), &body)
        .await?
        .ensure_written(&format!("write shares of dashboard {}", dashboard_id))?;
    Ok(())
}

/// Reassign ownership; the previous owner keeps an edit share.
pub async fn change_owner(env: &Environment, dashboard_id: &str, owner_id: &str) -> Result<()> {
    let body = json!({
        "ownerId": owner_id,
        "originalOwnerRule": MigrationConfig::ORIGINAL_OWNER_RULE,
    });
    env.client()
        .post(&endpoints::dashboard_change_owner(dashboard_id), &body)
        .await?
        .ensure_written(&format!("change owner of dashboard {}", dashboard_id))?;
    Ok(())
}

/// Holds captured state until it has been written back.
pub struct OwnershipGuard<'a> {
    env: &'a Environment,
    captured: CapturedState,
    swapped: bool,
    restore_attempted: bool,
}

impl<'a> OwnershipGuard<'a> {
    fn new(env: &'a Environment, captured: CapturedState, swapped: bool) -> Self {
        Self {
            env,
            captured,
            swapped,
            restore_attempted: false,
        }
    }

    pub fn captured(&self) -> &CapturedState {
        &self.captured
    }

    /// Write back shares, then the original owner.
    ///
    /// The owner is restored even when the share write fails; the first
    /// error is returned.
    pub async fn restore(mut self) -> Result<()> {
        self.restore_attempted = true;
        if !self.swapped {
            return Ok(());
        }
        let id = &self.captured.dashboard_id;
        info!(
            "Restoring dashboard {} to {}",
            id,
            self.captured.describe()
        );

        let shares = write_shares(self.env, id, self.captured.shares.as_slice()).await;
        if let Err(e) = &shares {
            error!("Failed to restore shares of dashboard {}: {}", id, e);
        }
        let owner = change_owner(self.env, id, &self.captured.owner_id).await;
        if let Err(e) = &owner {
            error!("Failed to restore owner of dashboard {}: {}", id, e);
        }
        shares.and(owner)
    }
}

impl Drop for OwnershipGuard<'_> {
    fn drop(&mut self) {
        if self.swapped && !self.restore_attempted {
            error!(
                "Dashboard {} left without restoring ownership; original state: {}",
                self.captured.dashboard_id,
                self.captured.describe()
            );
        }
    }
}

/// Runs mutations on dashboards under a temporary owner.
pub struct OwnershipSwap<'a> {
    env: &'a Environment,
}

impl<'a> OwnershipSwap<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    /// Fetch owner and full share list. Nothing is mutated.
    pub async fn capture(&self, dashboard_id: &str) -> Result<CapturedState> {
        let owner_id = read_owner(self.env, dashboard_id).await?;
        let shares = read_share_rows(self.env, dashboard_id).await?;
        debug!(
            "Captured dashboard {}: owner {} with {} shares",
            dashboard_id,
            owner_id,
            shares.len()
        );
        Ok(CapturedState {
            dashboard_id: dashboard_id.to_string(),
            owner_id,
            shares,
        })
    }

    /// Run `act` on the dashboard.
    ///
    /// Without an acting username the mutation runs directly under the
    /// existing owner. With one, ownership moves to that user for the
    /// duration of `act` and is restored afterwards whatever `act` returned.
    pub async fn run<T, F, Fut>(
        &self,
        dashboard_id: &str,
        acting_username: Option<&str>,
        act: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(username) = acting_username else {
            debug!("No acting user for dashboard {}, mutating in place", dashboard_id);
            return act().await;
        };

        let captured = self.capture(dashboard_id).await?;
        let actor_id = AccessManagement::new(self.env)
            .get_user_id_by_username(username)
            .await?
            .ok_or_else(|| SisyncError::not_found(EntityKind::User, username))?;

        let swap_needed = actor_id != captured.owner_id;
        if !swap_needed {
            debug!("'{}' already owns dashboard {}", username, dashboard_id);
        }
        let guard = OwnershipGuard::new(self.env, captured, swap_needed);

        let acted = if swap_needed {
            info!("Changing owner of dashboard {} to '{}'", dashboard_id, username);
            match change_owner(self.env, dashboard_id, &actor_id).await {
                Ok(()) => act().await,
                Err(e) => Err(e),
            }
        } else {
            act().await
        };

        let snapshot = guard.captured().describe();
        let restored = guard.restore().await;
        settle(dashboard_id, &snapshot, acted, restored)
    }
}

/// Combine the act and restore outcomes.
fn settle<T>(
    dashboard_id: &str,
    snapshot: &str,
    acted: Result<T>,
    restored: Result<()>,
) -> Result<T> {
    match (acted, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), Ok(())) => {
            warn!(
                "Mutation of dashboard {} failed, ownership restored: {}",
                dashboard_id, e
            );
            Err(e)
        }
        (Ok(_), Err(restore_err)) => Err(SisyncError::InconsistentState {
            entity_id: dashboard_id.to_string(),
            phase: "restore".to_string(),
            message: format!(
                "mutation applied but restore failed ({}); reconcile to {}",
                restore_err, snapshot
            ),
        }),
        (Err(act_err), Err(restore_err)) => Err(SisyncError::InconsistentState {
            entity_id: dashboard_id.to_string(),
            phase: "act".to_string(),
            message: format!(
                "mutation failed ({}) and restore failed ({}); reconcile to {}",
                act_err, restore_err, snapshot
            ),
        }),
    }
}
