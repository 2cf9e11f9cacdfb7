//! Run observability: global atomic counters plus a per-run snapshot.
//!
//! Counters are incremented silently at the call site and flushed as a
//! single `tracing::info!` event at the end of a run. The
//! [`MetricsSnapshot`] is the serializable facts block embedded in the
//! run artifact.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::domain::gate::{GateResult, GateStatus};
use crate::git::{git_version, GitBackend};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    iterations_run: AtomicU64,
    checkpoints_created: AtomicU64,
    gates_validated: AtomicU64,
    rollbacks_executed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            iterations_run: AtomicU64::new(0),
            checkpoints_created: AtomicU64::new(0),
            gates_validated: AtomicU64::new(0),
            rollbacks_executed: AtomicU64::new(0),
        }
    }

    pub fn inc_iterations(&self) {
        self.iterations_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_checkpoints(&self) {
        self.checkpoints_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_gates_validated(&self) {
        self.gates_validated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    /// Call once per run, at termination.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            iterations_run = self.iterations_run(),
            checkpoints_created = self.checkpoints_created(),
            gates_validated = self.gates_validated(),
            rollbacks_executed = self.rollbacks_executed(),
        );
    }

    pub fn iterations_run(&self) -> u64 {
        self.iterations_run.load(Ordering::Relaxed)
    }

    pub fn checkpoints_created(&self) -> u64 {
        self.checkpoints_created.load(Ordering::Relaxed)
    }

    pub fn gates_validated(&self) -> u64 {
        self.gates_validated.load(Ordering::Relaxed)
    }

    pub fn rollbacks_executed(&self) -> u64 {
        self.rollbacks_executed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.iterations_run.store(0, Ordering::Relaxed);
        self.checkpoints_created.store(0, Ordering::Relaxed);
        self.gates_validated.store(0, Ordering::Relaxed);
        self.rollbacks_executed.store(0, Ordering::Relaxed);
    }
}

/// Code-size facts about the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeFacts {
    pub tracked_files: usize,
    pub total_lines: u64,
}

/// Repository activity facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityFacts {
    pub head: String,
    pub branch: String,
    pub commits_last_30_days: u64,
}

/// Host/tooling facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostFacts {
    pub os: String,
    pub arch: String,
    pub git_version: String,
}

/// Gate outcome tallies for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GateTally {
    pub pass: u32,
    pub warn: u32,
    pub fail: u32,
    pub unknown: u32,
}

impl GateTally {
    pub fn from_results(results: &[GateResult]) -> Self {
        let mut tally = Self::default();
        for result in results {
            match result.status {
                GateStatus::Pass => tally.pass += 1,
                GateStatus::Warn => tally.warn += 1,
                GateStatus::Fail => tally.fail += 1,
                GateStatus::Unknown => tally.unknown += 1,
            }
        }
        tally
    }
}

/// The facts block persisted with each run artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub code: CodeFacts,
    pub activity: ActivityFacts,
    pub host: HostFacts,
    pub gates: GateTally,
}

/// Collect a snapshot from the workspace and the final gate results.
pub fn collect_snapshot(git: &GitBackend, gate_results: &[GateResult]) -> Result<MetricsSnapshot> {
    let files = git.tracked_files()?;
    let mut total_lines = 0u64;
    for file in &files {
        if let Ok(contents) = std::fs::read_to_string(git.root().join(file)) {
            total_lines += contents.lines().count() as u64;
        }
    }

    Ok(MetricsSnapshot {
        code: CodeFacts {
            tracked_files: files.len(),
            total_lines,
        },
        activity: ActivityFacts {
            head: git.head_sha()?,
            branch: git.current_branch()?,
            commits_last_30_days: git.commit_count_since_days(30)?,
        },
        host: HostFacts {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            git_version: git_version()?,
        },
        gates: GateTally::from_results(gate_results),
    })
}
