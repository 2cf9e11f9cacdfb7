//! Run lifecycle: states, terminal outcomes, and the per-run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gate::GateResult;

/// Terminal outcome of an orchestrator run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// All gates passed.
    Succeeded,

    /// Iteration budget exhausted, or a fatal-to-run error (checkpoint
    /// creation failure, invalid checkpoint reference).
    Failed,

    /// Too many consecutive rollbacks.
    CircuitTripped,

    /// Confirmation denied or timed out without auto-approve.
    NotApproved,

    /// Rollback-of-rollback failed; manual recovery required.
    CriticalFailure,
}

impl RunOutcome {
    /// The wire word, as used in artifacts and process outcome reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "SUCCEEDED",
            RunOutcome::Failed => "FAILED",
            RunOutcome::CircuitTripped => "CIRCUIT_TRIPPED",
            RunOutcome::NotApproved => "NOT_APPROVED",
            RunOutcome::CriticalFailure => "CRITICAL_FAILURE",
        }
    }
}

/// Orchestrator state machine. Terminal states are final and never resumed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Initializing,
    AwaitingConfirmation,
    Iterating,
    Terminal(RunOutcome),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Terminal(_))
    }
}

/// The single persisted summary of an end-to-end orchestrator execution.
///
/// Finalized once via [`RunSummary::finalize`], then immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: Uuid,

    /// Terminal outcome.
    pub outcome: RunOutcome,

    /// Gate results from the last validation round.
    pub gate_results: Vec<GateResult>,

    /// Number of iterations started.
    pub iterations: u32,

    /// Number of executed rollbacks.
    pub rollbacks: u32,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run reached its terminal state.
    pub ended_at: DateTime<Utc>,

    /// Failure context. For `CRITICAL_FAILURE` this carries the backup
    /// marker and stash reference needed for manual recovery.
    pub failure_reason: Option<String>,
}

impl RunSummary {
    /// Finalize a run into its immutable summary.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        run_id: Uuid,
        outcome: RunOutcome,
        gate_results: Vec<GateResult>,
        iterations: u32,
        rollbacks: u32,
        started_at: DateTime<Utc>,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            run_id,
            outcome,
            gate_results,
            iterations,
            rollbacks,
            started_at,
            ended_at: Utc::now(),
            failure_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gate::{GateResult, GateStatus};

    #[test]
    fn test_outcome_serde_wire_words() {
        let cases = [
            (RunOutcome::Succeeded, "\"SUCCEEDED\""),
            (RunOutcome::Failed, "\"FAILED\""),
            (RunOutcome::CircuitTripped, "\"CIRCUIT_TRIPPED\""),
            (RunOutcome::NotApproved, "\"NOT_APPROVED\""),
            (RunOutcome::CriticalFailure, "\"CRITICAL_FAILURE\""),
        ];
        for (outcome, expected) in cases {
            let json = serde_json::to_string(&outcome).expect("serialize");
            assert_eq!(json, expected);
            let back: RunOutcome = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, outcome);
        }
    }

    #[test]
    fn test_outcome_as_str_matches_serde() {
        for outcome in [
            RunOutcome::Succeeded,
            RunOutcome::Failed,
            RunOutcome::CircuitTripped,
            RunOutcome::NotApproved,
            RunOutcome::CriticalFailure,
        ] {
            let json = serde_json::to_string(&outcome).expect("serialize");
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Initializing.is_terminal());
        assert!(!RunState::AwaitingConfirmation.is_terminal());
        assert!(!RunState::Iterating.is_terminal());
        assert!(RunState::Terminal(RunOutcome::Succeeded).is_terminal());
    }

    #[test]
    fn test_summary_serde_roundtrip() {
        let summary = RunSummary::finalize(
            Uuid::new_v4(),
            RunOutcome::Succeeded,
            vec![GateResult::new("tests", GateStatus::Pass, 100)],
            1,
            0,
            Utc::now(),
            None,
        );
        let json = serde_json::to_string(&summary).expect("serialize");
        let deserialized: RunSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(summary, deserialized);
    }
}
