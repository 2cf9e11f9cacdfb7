//! Run configuration, validated at load rather than at point of use.

use std::path::PathBuf;

use crate::breaker::DEFAULT_THRESHOLD;
use crate::confirm::ConfirmationConfig;
use crate::domain::error::{ConvergeError, Result};
use crate::rollback::RollbackConfig;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Full configuration for one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Workspace to drive. Must be a git work tree.
    pub workspace: PathBuf,

    /// Ordered gate names validated once per iteration.
    pub gates: Vec<String>,

    /// Iteration budget.
    pub max_iterations: u32,

    /// Simulate remediation without mutating or rolling back.
    pub dry_run: bool,

    /// Commit surviving remediation changes at the end of an iteration.
    pub auto_commit: bool,

    /// Iterate on a dedicated working branch, restored to the original
    /// branch on any non-succeeded termination.
    pub use_work_branch: bool,

    /// Consecutive-rollback limit for the circuit breaker.
    pub breaker_threshold: u32,

    /// Checkpoint retention window for post-run pruning.
    pub retention_days: i64,

    pub rollback: RollbackConfig,

    pub confirmation: ConfirmationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            gates: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            dry_run: false,
            auto_commit: false,
            use_work_branch: false,
            breaker_threshold: DEFAULT_THRESHOLD,
            retention_days: DEFAULT_RETENTION_DAYS,
            rollback: RollbackConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Reject unusable configurations before anything runs.
    pub fn validate(&self) -> Result<()> {
        if self.gates.is_empty() {
            return Err(ConvergeError::InvalidConfig(
                "at least one gate must be configured".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConvergeError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.breaker_threshold == 0 {
            return Err(ConvergeError::InvalidConfig(
                "breaker_threshold must be at least 1".to_string(),
            ));
        }
        if self.retention_days < 0 {
            return Err(ConvergeError::InvalidConfig(
                "retention_days cannot be negative".to_string(),
            ));
        }
        if self.confirmation.poll_interval.is_zero() {
            return Err(ConvergeError::InvalidConfig(
                "confirmation poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
