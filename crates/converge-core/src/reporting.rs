//! Persisted run artifacts: `run.json` + `run.digest` + `report.md`.
//!
//! The JSON artifact is the canonical record of a run; the digest file
//! lets later readers detect tampering or truncation before trusting it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::confirm::ConfirmationDecision;
use crate::domain::error::{ConvergeError, Result};
use crate::domain::rollback::RollbackRecord;
use crate::domain::run::RunSummary;
use crate::lock::STATE_DIR;
use crate::metrics::MetricsSnapshot;

const SCHEMA_VERSION: &str = "1.0";

/// Everything persisted for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunArtifact {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub summary: RunSummary,
    pub decision: ConfirmationDecision,
    pub rollbacks: Vec<RollbackRecord>,
    pub metrics: MetricsSnapshot,
}

impl RunArtifact {
    pub fn new(
        summary: RunSummary,
        decision: ConfirmationDecision,
        rollbacks: Vec<RollbackRecord>,
        metrics: MetricsSnapshot,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            summary,
            decision,
            rollbacks,
            metrics,
        }
    }
}

/// Root directory for run artifacts inside a workspace.
pub fn runs_dir(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("runs")
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `<dir>/<run_id>/run.json` and `<dir>/<run_id>/run.digest`.
pub fn write_run_artifact(dir: &Path, artifact: &RunArtifact) -> Result<PathBuf> {
    let run_dir = dir.join(artifact.summary.run_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join("run.json");
    let digest_path = run_dir.join("run.digest");
    let json = serde_json::to_vec_pretty(artifact)?;
    let digest = digest_hex(&json);

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(&digest_path, digest.as_bytes())?;

    Ok(artifact_path)
}

/// Read and verify `<dir>/<run_id>/run.json` integrity.
pub fn read_run_artifact(run_id: &str, dir: &Path) -> Result<RunArtifact> {
    let run_dir = dir.join(run_id);
    let artifact_path = run_dir.join("run.json");
    if !artifact_path.exists() {
        return Err(ConvergeError::ArtifactNotFound(run_id.to_string()));
    }

    let json = std::fs::read(&artifact_path)?;
    let digest = std::fs::read_to_string(run_dir.join("run.digest"))?;
    let actual = digest_hex(&json);
    if digest.trim() != actual {
        return Err(ConvergeError::DigestMismatch {
            expected: digest.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}

/// Render the human-readable run report.
pub fn render_run_report_md(artifact: &RunArtifact) -> String {
    let summary = &artifact.summary;
    let mut out = String::new();

    out.push_str("# Converge Run Report\n\n");
    out.push_str(&format!("- run: `{}`\n", summary.run_id));
    out.push_str(&format!("- outcome: **{}**\n", summary.outcome.as_str()));
    out.push_str(&format!("- iterations: {}\n", summary.iterations));
    out.push_str(&format!("- rollbacks: {}\n", summary.rollbacks));
    out.push_str(&format!(
        "- approved via: {:?} after {:.1}s\n",
        artifact.decision.method, artifact.decision.elapsed_secs
    ));
    if let Some(reason) = &summary.failure_reason {
        out.push_str(&format!("- failure reason: {reason}\n"));
    }
    out.push('\n');

    out.push_str("## Gates\n");
    if summary.gate_results.is_empty() {
        out.push_str("- (no gates were validated)\n");
    }
    for result in &summary.gate_results {
        out.push_str(&format!(
            "- `{}`: {:?} (score {})\n",
            result.gate, result.status, result.score
        ));
    }
    out.push('\n');

    if !artifact.rollbacks.is_empty() {
        out.push_str("## Rollbacks\n");
        for record in &artifact.rollbacks {
            out.push_str(&format!(
                "- to `{}` via {:?}, backup `{}`, verified: {}\n",
                record.to_checkpoint, record.strategy, record.backup_ref, record.verified
            ));
        }
        out.push('\n');
    }

    out.push_str("## Workspace\n");
    out.push_str(&format!(
        "- {} tracked files, {} lines\n",
        artifact.metrics.code.tracked_files, artifact.metrics.code.total_lines
    ));
    out.push_str(&format!(
        "- branch `{}` at `{}`, {} commits in the last 30 days\n",
        artifact.metrics.activity.branch,
        artifact.metrics.activity.head,
        artifact.metrics.activity.commits_last_30_days
    ));
    out.push_str(&format!(
        "- host: {}/{}, {}\n",
        artifact.metrics.host.os, artifact.metrics.host.arch, artifact.metrics.host.git_version
    ));
    out
}

/// Write `<dir>/<run_id>/report.md`.
pub fn write_run_report_md(dir: &Path, artifact: &RunArtifact) -> anyhow::Result<PathBuf> {
    let run_dir = dir.join(artifact.summary.run_id.to_string());
    std::fs::create_dir_all(&run_dir).with_context(|| format!("create {run_dir:?}"))?;
    let path = run_dir.join("report.md");
    std::fs::write(&path, render_run_report_md(artifact)).with_context(|| format!("write {path:?}"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::CheckpointId;
    use crate::domain::confirm::ApprovalMethod;
    use crate::domain::gate::{GateResult, GateStatus};
    use crate::domain::rollback::RollbackStrategy;
    use crate::domain::run::RunOutcome;
    use crate::metrics::{ActivityFacts, CodeFacts, GateTally, HostFacts};
    use uuid::Uuid;

    fn sample_artifact() -> RunArtifact {
        RunArtifact::new(
            RunSummary::finalize(
                Uuid::new_v4(),
                RunOutcome::CircuitTripped,
                vec![
                    GateResult::new("style", GateStatus::Pass, 100),
                    GateResult::new("security", GateStatus::Fail, 20),
                ],
                3,
                3,
                Utc::now(),
                Some("3 consecutive rollbacks reached the threshold".to_string()),
            ),
            ConfirmationDecision::new(true, ApprovalMethod::EnvVar, 0.5),
            vec![RollbackRecord {
                from_revision: "b".repeat(40),
                to_checkpoint: CheckpointId::compose(1, 1_700_000_000, 0),
                to_revision: "a".repeat(40),
                strategy: RollbackStrategy::Reset,
                backup_ref: "converge/backup/1700000001-0".to_string(),
                stash_ref: None,
                verified: true,
                executed_at: Utc::now(),
            }],
            MetricsSnapshot {
                code: CodeFacts {
                    tracked_files: 12,
                    total_lines: 340,
                },
                activity: ActivityFacts {
                    head: "a".repeat(40),
                    branch: "main".to_string(),
                    commits_last_30_days: 9,
                },
                host: HostFacts {
                    os: "linux".to_string(),
                    arch: "x86_64".to_string(),
                    git_version: "git version 2.43.0".to_string(),
                },
                gates: GateTally {
                    pass: 1,
                    warn: 0,
                    fail: 1,
                    unknown: 0,
                },
            },
        )
    }

    #[test]
    fn artifact_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sample_artifact();

        write_run_artifact(dir.path(), &artifact).unwrap();
        let read =
            read_run_artifact(&artifact.summary.run_id.to_string(), dir.path()).unwrap();
        assert_eq!(read, artifact);
    }

    #[test]
    fn tampered_artifact_fails_digest_check() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = sample_artifact();
        let path = write_run_artifact(dir.path(), &artifact).unwrap();

        let mut json = std::fs::read_to_string(&path).unwrap();
        json.push(' ');
        std::fs::write(&path, json).unwrap();

        let err = read_run_artifact(&artifact.summary.run_id.to_string(), dir.path()).unwrap_err();
        assert!(matches!(err, ConvergeError::DigestMismatch { .. }));
    }

    #[test]
    fn missing_artifact_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_run_artifact("no-such-run", dir.path()).unwrap_err();
        assert!(matches!(err, ConvergeError::ArtifactNotFound(_)));
    }

    #[test]
    fn report_mentions_the_facts_that_matter() {
        let artifact = sample_artifact();
        let md = render_run_report_md(&artifact);

        assert!(md.contains("# Converge Run Report"));
        assert!(md.contains("CIRCUIT_TRIPPED"));
        assert!(md.contains("`security`: Fail"));
        assert!(md.contains("converge/backup/1700000001-0"));
        assert!(md.contains("12 tracked files"));
        assert!(md.contains("failure reason"));
    }
}
