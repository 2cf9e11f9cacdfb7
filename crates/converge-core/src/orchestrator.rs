//! The iteration state machine driving a run end to end.
//!
//! `Initializing → AwaitingConfirmation → Iterating → terminal`. Each
//! iteration checkpoints, validates every configured gate, and either
//! stops succeeded, advances (dry run), or remediates, rolling back to
//! the iteration's own checkpoint when remediation fails or proves
//! insufficient. The circuit breaker halts the loop after too many
//! consecutive rollbacks; the iteration budget bounds everything else.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::checkpoint::CheckpointStore;
use crate::config::RunConfig;
use crate::confirm::ConfirmationGate;
use crate::domain::confirm::ConfirmationDecision;
use crate::domain::error::{ConvergeError, Result};
use crate::domain::gate::{all_pass, GateResult};
use crate::domain::rollback::RollbackRecord;
use crate::domain::run::{RunOutcome, RunState, RunSummary};
use crate::gates::{run_gate, QualityGate};
use crate::git::GitBackend;
use crate::lock::WorkspaceLock;
use crate::metrics::{collect_snapshot, METRICS};
use crate::remediate::{FixOutcome, Remediator};
use crate::reporting::{self, RunArtifact};
use crate::rollback::RollbackCoordinator;

/// Drives one workspace toward gate compliance.
pub struct Orchestrator {
    config: RunConfig,
    gate_runner: Arc<dyn QualityGate>,
    remediator: Arc<dyn Remediator>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        gate_runner: Arc<dyn QualityGate>,
        remediator: Arc<dyn Remediator>,
    ) -> Self {
        Self {
            config,
            gate_runner,
            remediator,
        }
    }

    /// Execute the run to its single terminal outcome.
    ///
    /// Preflight failures (bad config, not a repository, lock already
    /// held) error out before a run exists; every started run finalizes
    /// exactly one [`RunSummary`].
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState::Initializing;
        tracing::info!(%run_id, ?state, workspace = %self.config.workspace.display(), "run starting");

        let git = GitBackend::open(&self.config.workspace)?;
        let _lock = WorkspaceLock::acquire(git.root())?;
        let original_branch = git.current_branch()?;

        state = RunState::AwaitingConfirmation;
        tracing::info!(?state, "awaiting operator confirmation");
        let decision = ConfirmationGate::new(self.config.confirmation.clone())
            .await_approval()
            .await;

        if !decision.approved {
            let summary = RunSummary::finalize(
                run_id,
                RunOutcome::NotApproved,
                Vec::new(),
                0,
                0,
                started_at,
                Some("confirmation denied or timed out without auto-approve".to_string()),
            );
            self.finish(&git, &original_branch, false, &decision, &summary, &[]);
            return Ok(summary);
        }

        let mut on_work_branch = false;
        if self.config.use_work_branch {
            let branch = format!("converge/run-{}", &run_id.simple().to_string()[..8]);
            git.create_branch(&branch)?;
            on_work_branch = true;
            tracing::info!(%branch, "iterating on dedicated working branch");
        }

        state = RunState::Iterating;
        tracing::info!(?state, gates = ?self.config.gates, "entering iteration loop");

        let store = CheckpointStore::new(&git);
        let coordinator = RollbackCoordinator::new(&git, self.config.rollback.clone());
        let mut breaker = CircuitBreaker::new(self.config.breaker_threshold);
        let mut rollback_records: Vec<RollbackRecord> = Vec::new();
        let mut last_results: Vec<GateResult> = Vec::new();
        let mut iterations = 0u32;
        let mut outcome: Option<RunOutcome> = None;
        let mut failure_reason: Option<String> = None;

        for iteration in 1..=self.config.max_iterations {
            iterations = iteration;
            METRICS.inc_iterations();
            tracing::info!(iteration, "iteration starting");

            // A checkpoint must exist before any mutating attempt.
            let checkpoint = match store.create(iteration) {
                Ok(cp) => {
                    METRICS.inc_checkpoints();
                    cp
                }
                Err(err) => {
                    tracing::error!(iteration, error = %err, "checkpoint creation failed");
                    outcome = Some(RunOutcome::Failed);
                    failure_reason = Some(err.to_string());
                    break;
                }
            };

            last_results = self.validate_all(&git).await;
            if all_pass(&last_results) {
                tracing::info!(iteration, "all gates pass");
                outcome = Some(RunOutcome::Succeeded);
                break;
            }

            if self.config.dry_run {
                tracing::info!(
                    iteration,
                    "dry run: remediation skipped, advancing without mutation"
                );
                breaker.reset();
                continue;
            }

            let fix = match self.remediator.attempt_fix(git.root()).await {
                Ok(fix) => fix,
                Err(err) => {
                    tracing::warn!(iteration, error = %err, "remediator errored; treating as failed fix");
                    FixOutcome::failure(err.to_string())
                }
            };

            let mut needs_rollback = !fix.success;
            if fix.success {
                // Re-validate: a fix that leaves gates failing is
                // insufficient and gets rolled back like a failed one.
                last_results = self.validate_all(&git).await;
                needs_rollback = !all_pass(&last_results);
                if needs_rollback {
                    tracing::warn!(iteration, "remediation succeeded but gates still fail");
                }
            }

            if needs_rollback {
                match coordinator.rollback(&checkpoint) {
                    Ok(record) => {
                        rollback_records.push(record);
                        breaker.record_rollback();
                        if breaker.tripped() {
                            tracing::error!(
                                iteration,
                                consecutive = breaker.consecutive_rollbacks(),
                                "circuit breaker tripped"
                            );
                            outcome = Some(RunOutcome::CircuitTripped);
                            failure_reason = Some(format!(
                                "{} consecutive rollbacks reached the threshold",
                                breaker.consecutive_rollbacks()
                            ));
                            break;
                        }
                    }
                    Err(err @ ConvergeError::CriticalRecovery { .. }) => {
                        tracing::error!(iteration, error = %err, "manual recovery required");
                        outcome = Some(RunOutcome::CriticalFailure);
                        failure_reason = Some(err.to_string());
                        break;
                    }
                    Err(err) => {
                        tracing::error!(iteration, error = %err, "rollback failed");
                        outcome = Some(RunOutcome::Failed);
                        failure_reason = Some(err.to_string());
                        break;
                    }
                }
            } else {
                breaker.reset();
                if self.config.auto_commit {
                    let committed = git.is_dirty().and_then(|dirty| {
                        if dirty {
                            git.commit_all(&format!("converge: iteration {iteration} remediation"))
                                .map(Some)
                        } else {
                            Ok(None)
                        }
                    });
                    match committed {
                        Ok(Some(sha)) => tracing::info!(iteration, %sha, "remediation committed"),
                        Ok(None) => {}
                        Err(err) => {
                            tracing::error!(iteration, error = %err, "auto-commit failed");
                            outcome = Some(RunOutcome::Failed);
                            failure_reason = Some(err.to_string());
                            break;
                        }
                    }
                }
            }
        }

        let outcome = outcome.unwrap_or(RunOutcome::Failed);
        if outcome == RunOutcome::Failed && failure_reason.is_none() {
            failure_reason = Some(format!(
                "iteration budget of {} exhausted",
                self.config.max_iterations
            ));
        }
        state = RunState::Terminal(outcome);
        tracing::info!(?state, iterations, rollbacks = rollback_records.len(), "run finished");

        let summary = RunSummary::finalize(
            run_id,
            outcome,
            last_results,
            iterations,
            rollback_records.len() as u32,
            started_at,
            failure_reason,
        );
        self.finish(
            &git,
            &original_branch,
            on_work_branch,
            &decision,
            &summary,
            &rollback_records,
        );
        Ok(summary)
    }

    async fn validate_all(&self, git: &GitBackend) -> Vec<GateResult> {
        let mut results = Vec::with_capacity(self.config.gates.len());
        for gate in &self.config.gates {
            results.push(run_gate(self.gate_runner.as_ref(), gate, git.root()).await);
        }
        results
    }

    /// Post-terminal duties, all best-effort: a failed report never
    /// changes an already-final outcome.
    fn finish(
        &self,
        git: &GitBackend,
        original_branch: &str,
        on_work_branch: bool,
        decision: &ConfirmationDecision,
        summary: &RunSummary,
        rollbacks: &[RollbackRecord],
    ) {
        if on_work_branch && summary.outcome != RunOutcome::Succeeded {
            // Never leave the operator on a disposable branch.
            if let Err(err) = git.checkout_branch(original_branch) {
                tracing::warn!(branch = original_branch, error = %err, "failed to restore original branch");
            }
        }

        let store = CheckpointStore::new(git);
        match store.prune(self.config.retention_days) {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "pruned expired checkpoints");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "checkpoint pruning failed"),
        }

        match collect_snapshot(git, &summary.gate_results) {
            Ok(metrics) => {
                let artifact = RunArtifact::new(
                    summary.clone(),
                    decision.clone(),
                    rollbacks.to_vec(),
                    metrics,
                );
                let runs_dir = reporting::runs_dir(git.root());
                if let Err(err) = reporting::write_run_artifact(&runs_dir, &artifact) {
                    tracing::warn!(error = %err, "failed to write run artifact");
                }
                if let Err(err) = reporting::write_run_report_md(&runs_dir, &artifact) {
                    tracing::warn!(error = %err, "failed to write run report");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to collect metrics snapshot"),
        }

        METRICS.flush();
    }
}
