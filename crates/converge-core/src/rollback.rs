//! Rollback coordination: revert working state to a checkpoint while
//! preserving forensic recoverability.
//!
//! Every rollback takes a backup marker (and stashes uncommitted
//! mutations) before touching anything, applies the configured strategy,
//! verifies the result, and escalates through backup restoration when the
//! strategy itself fails. The target checkpoint is never deleted.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::checkpoint::CHECKPOINT_PREFIX;
use crate::domain::checkpoint::Checkpoint;
use crate::domain::error::{ConvergeError, Result};
use crate::domain::rollback::{DivergencePolicy, RollbackRecord, RollbackStrategy};
use crate::git::GitBackend;
use crate::metrics::METRICS;

/// Tag namespace for pre-rollback backup markers.
pub const BACKUP_PREFIX: &str = "converge/backup/";

static BACKUP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Rollback behavior knobs.
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub strategy: RollbackStrategy,

    /// Treatment of a non-empty post-rollback diff under Revert/Checkout.
    pub divergence: DivergencePolicy,

    /// Derived-cache directories (relative to the workspace) cleared
    /// best-effort after a rollback.
    pub cache_dirs: Vec<String>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            strategy: RollbackStrategy::Reset,
            divergence: DivergencePolicy::Warn,
            cache_dirs: vec!["target".to_string()],
        }
    }
}

/// Executes rollbacks against one workspace.
pub struct RollbackCoordinator<'a> {
    git: &'a GitBackend,
    config: RollbackConfig,
}

impl<'a> RollbackCoordinator<'a> {
    pub fn new(git: &'a GitBackend, config: RollbackConfig) -> Self {
        Self { git, config }
    }

    /// Revert working state to the given checkpoint.
    ///
    /// Consecutive re-invocation with the same checkpoint is idempotent:
    /// once working state matches the checkpoint there is nothing left to
    /// apply under any strategy.
    pub fn rollback(&self, checkpoint: &Checkpoint) -> Result<RollbackRecord> {
        // Step 1: validate before any mutation.
        let target = self
            .git
            .resolve(&format!("{CHECKPOINT_PREFIX}{}", checkpoint.id))
            .map_err(|_| ConvergeError::InvalidCheckpoint {
                id: checkpoint.id.to_string(),
                reason: "checkpoint tag not found".to_string(),
            })?;
        if target != checkpoint.revision {
            return Err(ConvergeError::InvalidCheckpoint {
                id: checkpoint.id.to_string(),
                reason: format!(
                    "tag resolves to {target}, expected {}",
                    checkpoint.revision
                ),
            });
        }

        let from_revision = self.git.head_sha()?;
        if !self.git.is_ancestor(&target, &from_revision)? {
            return Err(ConvergeError::InvalidCheckpoint {
                id: checkpoint.id.to_string(),
                reason: "checkpoint is not an ancestor of current state".to_string(),
            });
        }

        // Step 2: back up current state.
        let backup_ref = format!(
            "{BACKUP_PREFIX}{}-{}",
            Utc::now().timestamp(),
            BACKUP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        self.git.tag(
            &backup_ref,
            &from_revision,
            &format!("pre-rollback backup for {}", checkpoint.id),
        )?;

        let stash_ref = if self.git.is_dirty()? {
            self.git
                .stash_push(&format!("converge pre-rollback backup for {}", checkpoint.id))?
        } else {
            None
        };
        tracing::info!(
            checkpoint = %checkpoint.id,
            %backup_ref,
            stash = stash_ref.as_deref().unwrap_or("none"),
            "pre-rollback backup recorded"
        );

        // Step 3: apply the configured strategy.
        if let Err(err) = self.apply_strategy(&target, checkpoint) {
            return Err(self.restore_backup(&from_revision, &backup_ref, stash_ref, err));
        }

        // Step 4: verify.
        let verified = match self.config.strategy {
            RollbackStrategy::Reset => {
                let head = self.git.head_sha()?;
                if head != target {
                    let err = ConvergeError::RollbackVerification(format!(
                        "after reset HEAD is {head}, expected {target}"
                    ));
                    return Err(self.restore_backup(&from_revision, &backup_ref, stash_ref, err));
                }
                true
            }
            RollbackStrategy::Revert | RollbackStrategy::Checkout => {
                let clean = self.git.diff_is_empty(&target)?;
                if !clean {
                    match self.config.divergence {
                        DivergencePolicy::Warn => {
                            tracing::warn!(
                                checkpoint = %checkpoint.id,
                                "working state diverges from checkpoint after rollback \
                                 (likely regenerated derived artifacts)"
                            );
                        }
                        DivergencePolicy::Fail => {
                            return Err(ConvergeError::RollbackVerification(format!(
                                "working state diverges from checkpoint {} after {:?}",
                                checkpoint.id, self.config.strategy
                            )));
                        }
                    }
                }
                clean
            }
        };

        // Step 5: best-effort cleanup of stale derived caches.
        for dir in &self.config.cache_dirs {
            let path = self.git.root().join(dir);
            if path.exists() {
                if let Err(err) = std::fs::remove_dir_all(&path) {
                    tracing::warn!(cache = %path.display(), error = %err, "cache cleanup failed");
                }
            }
        }

        METRICS.inc_rollbacks();
        let record = RollbackRecord {
            from_revision,
            to_checkpoint: checkpoint.id.clone(),
            to_revision: target,
            strategy: self.config.strategy,
            backup_ref,
            stash_ref,
            verified,
            executed_at: Utc::now(),
        };
        tracing::info!(
            checkpoint = %record.to_checkpoint,
            strategy = ?record.strategy,
            verified = record.verified,
            "rollback executed"
        );
        Ok(record)
    }

    fn apply_strategy(&self, target: &str, checkpoint: &Checkpoint) -> Result<()> {
        match self.config.strategy {
            RollbackStrategy::Reset => self.git.reset_hard(target),
            RollbackStrategy::Revert => {
                // Nothing to invert once working state already matches the
                // checkpoint; this is what makes a retried rollback a no-op.
                if self.git.diff_is_empty(target)? {
                    tracing::debug!(checkpoint = %checkpoint.id, "nothing to revert");
                    return Ok(());
                }
                let head = self.git.head_sha()?;
                for sha in self.git.commits_between(target, &head)? {
                    self.git.revert_commit(&sha)?;
                }
                Ok(())
            }
            RollbackStrategy::Checkout => {
                if self.git.diff_is_empty(target)? {
                    tracing::debug!(checkpoint = %checkpoint.id, "nothing to restore");
                    return Ok(());
                }
                self.git.checkout_paths(target)?;
                if self.git.is_dirty()? {
                    self.git.commit_all(&format!(
                        "converge: restore checkpoint {}",
                        checkpoint.id
                    ))?;
                }
                Ok(())
            }
        }
    }

    /// Failure escalation: put current state back the way it was from the
    /// step-2 backup. Success returns the original failure; a second
    /// failure is the critical path that requires a human.
    fn restore_backup(
        &self,
        from_revision: &str,
        backup_ref: &str,
        stash_ref: Option<String>,
        original: ConvergeError,
    ) -> ConvergeError {
        tracing::warn!(%backup_ref, error = %original, "rollback failed; restoring backup");

        let restore = self.git.reset_hard(from_revision).and_then(|()| {
            if let Some(stash) = &stash_ref {
                self.git.stash_apply(stash)?;
            }
            Ok(())
        });

        match restore {
            Ok(()) => {
                tracing::warn!(%backup_ref, "backup restored; rollback remains failed");
                original
            }
            Err(restore_err) => ConvergeError::CriticalRecovery {
                backup_ref: backup_ref.to_string(),
                stash_ref,
                reason: format!("{original}; backup restore failed: {restore_err}"),
            },
        }
    }
}
