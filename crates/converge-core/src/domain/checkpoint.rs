//! Checkpoint identity and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a checkpoint: iteration number, unix timestamp, and a
/// process-wide monotonic counter, rendered as a single collision-free,
/// creation-ordered string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Compose an id from its three ordering components.
    pub fn compose(iteration: u32, timestamp: i64, counter: u64) -> Self {
        Self(format!("cp-{iteration:04}-{timestamp}-{counter:04}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the iteration component back out of an id.
    ///
    /// Returns `None` for strings that were not produced by [`compose`].
    ///
    /// [`compose`]: CheckpointId::compose
    pub fn iteration(&self) -> Option<u32> {
        let rest = self.0.strip_prefix("cp-")?;
        rest.split('-').next()?.parse().ok()
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckpointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An immutable named reference to full repository state at a point in time.
///
/// Created once per iteration, referenced only for rollback or retention
/// pruning, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Creation-ordered identifier.
    pub id: CheckpointId,

    /// Iteration that created this checkpoint (1-based).
    pub iteration: u32,

    /// Revision the checkpoint resolves to.
    pub revision: String,

    /// Revision that was current before the checkpoint was captured.
    /// Equal to `revision` when the working tree was already clean.
    pub parent_revision: String,

    /// When the checkpoint was captured.
    pub created_at: DateTime<Utc>,
}
