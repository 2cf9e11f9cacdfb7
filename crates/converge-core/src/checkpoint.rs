//! Checkpoint store: immutable named snapshots realized as git tags.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};

use crate::domain::checkpoint::{Checkpoint, CheckpointId};
use crate::domain::error::{ConvergeError, Result};
use crate::git::GitBackend;

/// Tag namespace for checkpoints.
pub const CHECKPOINT_PREFIX: &str = "converge/checkpoint/";

// Process-wide monotonic counter; makes ids collision-free even when two
// checkpoints land in the same second.
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates, resolves, lists, and prunes checkpoints in one workspace.
pub struct CheckpointStore<'a> {
    git: &'a GitBackend,
}

impl<'a> CheckpointStore<'a> {
    pub fn new(git: &'a GitBackend) -> Self {
        Self { git }
    }

    fn tag_name(id: &CheckpointId) -> String {
        format!("{CHECKPOINT_PREFIX}{id}")
    }

    /// Capture the full current working state for an iteration.
    ///
    /// Dirty working state is committed first so the checkpoint names a
    /// complete snapshot, then HEAD is tagged under the checkpoint
    /// namespace. Failure here is fatal to the run.
    pub fn create(&self, iteration: u32) -> Result<Checkpoint> {
        let parent_revision = self
            .git
            .head_sha()
            .map_err(|e| ConvergeError::CheckpointCreation(e.to_string()))?;

        let revision = if self
            .git
            .is_dirty()
            .map_err(|e| ConvergeError::CheckpointCreation(e.to_string()))?
        {
            self.git
                .commit_all(&format!("converge: checkpoint for iteration {iteration}"))
                .map_err(|e| ConvergeError::CheckpointCreation(e.to_string()))?
        } else {
            parent_revision.clone()
        };

        let created_at = Utc::now();
        let id = CheckpointId::compose(
            iteration,
            created_at.timestamp(),
            COUNTER.fetch_add(1, Ordering::Relaxed),
        );

        self.git
            .tag(
                &Self::tag_name(&id),
                &revision,
                &format!("converge checkpoint, iteration {iteration}"),
            )
            .map_err(|e| ConvergeError::CheckpointCreation(e.to_string()))?;

        tracing::debug!(checkpoint = %id, %revision, iteration, "checkpoint created");

        Ok(Checkpoint {
            id,
            iteration,
            revision,
            parent_revision,
            created_at,
        })
    }

    /// Resolve a checkpoint id to its revision.
    pub fn resolve(&self, id: &CheckpointId) -> Result<String> {
        self.git.resolve(&Self::tag_name(id))
    }

    /// All checkpoints in this workspace with their creation times
    /// (unix seconds), oldest first.
    pub fn list(&self) -> Result<Vec<(CheckpointId, i64)>> {
        let mut tags: Vec<(CheckpointId, i64)> = self
            .git
            .list_tags(CHECKPOINT_PREFIX)?
            .into_iter()
            .filter_map(|(name, created)| {
                name.strip_prefix(CHECKPOINT_PREFIX)
                    .map(|id| (CheckpointId::from(id), created))
            })
            .collect();
        tags.sort_by_key(|(_, created)| *created);
        Ok(tags)
    }

    /// Delete checkpoints older than the retention window. Returns the
    /// number removed. Run once per completed orchestrator execution.
    pub fn prune(&self, retention_days: i64) -> Result<u32> {
        let cutoff = (Utc::now() - Duration::days(retention_days)).timestamp();
        let mut removed = 0;

        for (id, created) in self.list()? {
            if created < cutoff {
                self.git.delete_tag(&Self::tag_name(&id))?;
                tracing::debug!(checkpoint = %id, "pruned expired checkpoint");
                removed += 1;
            }
        }
        Ok(removed)
    }
}
