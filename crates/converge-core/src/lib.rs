//! Converge Core Library
//!
//! An autonomous quality-convergence loop: checkpoint a git workspace,
//! validate a configured set of quality gates, remediate failures, and
//! roll back safely under a bounded-retry circuit breaker.

pub mod breaker;
pub mod checkpoint;
pub mod config;
pub mod confirm;
pub mod domain;
pub mod gates;
pub mod git;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod remediate;
pub mod reporting;
pub mod rollback;
pub mod telemetry;

pub use domain::{
    all_pass, ApprovalMethod, Checkpoint, CheckpointId, ConfirmationDecision, ConvergeError,
    DivergencePolicy, GateResult, GateStatus, Result, RollbackRecord, RollbackStrategy,
    RunOutcome, RunState, RunSummary,
};

pub use breaker::CircuitBreaker;
pub use checkpoint::CheckpointStore;
pub use config::RunConfig;
pub use confirm::{ConfirmationConfig, ConfirmationGate};
pub use gates::{run_gate, CommandGateRunner, QualityGate};
pub use git::{git_version, is_git_repo, GitBackend};
pub use lock::WorkspaceLock;
pub use metrics::{collect_snapshot, MetricsSnapshot, METRICS};
pub use orchestrator::Orchestrator;
pub use remediate::{CommandRemediator, FixOutcome, Remediator};
pub use reporting::{
    read_run_artifact, render_run_report_md, runs_dir, write_run_artifact, write_run_report_md,
    RunArtifact,
};
pub use rollback::{RollbackConfig, RollbackCoordinator};
pub use telemetry::init_tracing;

/// Converge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
