//! Rollback strategies and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::checkpoint::CheckpointId;

/// Operator-configured strategy for restoring working state to a checkpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStrategy {
    /// Force current state to exactly match the checkpoint. Destructive to
    /// intervening history, fastest.
    Reset,

    /// Apply inverse changes for every change since the checkpoint,
    /// oldest-first, preserving full history.
    Revert,

    /// Overlay the checkpoint's content onto current state and record the
    /// restoration as a new state transition, preserving history.
    Checkout,
}

impl std::str::FromStr for RollbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "reset" => Ok(Self::Reset),
            "revert" => Ok(Self::Revert),
            "checkout" => Ok(Self::Checkout),
            other => Err(format!("unknown rollback strategy: {other}")),
        }
    }
}

/// Treatment of a non-empty post-rollback diff under Revert/Checkout.
///
/// Reset always verifies exactly; these two strategies can legitimately
/// diverge on regenerated derived artifacts, so the policy is configurable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Log a non-fatal warning and record `verified: false`.
    Warn,

    /// Treat the divergence as a rollback failure.
    Fail,
}

/// Audit record for one executed rollback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackRecord {
    /// Revision that was current when the rollback started.
    pub from_revision: String,

    /// Target checkpoint.
    pub to_checkpoint: CheckpointId,

    /// Revision the target checkpoint resolved to.
    pub to_revision: String,

    /// Strategy that was applied.
    pub strategy: RollbackStrategy,

    /// Backup marker taken before any mutation.
    pub backup_ref: String,

    /// Stash commit preserving uncommitted mutations, if there were any.
    pub stash_ref: Option<String>,

    /// Whether post-rollback verification found working state to match the
    /// checkpoint.
    pub verified: bool,

    /// When the rollback executed.
    pub executed_at: DateTime<Utc>,
}
