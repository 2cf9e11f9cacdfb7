//! Auto-remediation seam.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::{ConvergeError, Result};

/// Outcome of one remediation attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixOutcome {
    pub success: bool,
    pub detail: Option<String>,
}

impl FixOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
        }
    }
}

/// Trait for remediation backends.
///
/// Implementations mutate working state to make failing gates pass and
/// must be safely re-invocable after a rollback.
#[async_trait]
pub trait Remediator: Send + Sync {
    async fn attempt_fix(&self, workspace: &Path) -> Result<FixOutcome>;
}

/// Command-backed remediator: runs a configured fix command in the
/// workspace; exit code 0 reports success.
pub struct CommandRemediator {
    command: String,
    timeout_secs: u64,
}

impl CommandRemediator {
    pub fn new(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            command: command.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Remediator for CommandRemediator {
    async fn attempt_fix(&self, workspace: &Path) -> Result<FixOutcome> {
        let child = tokio::process::Command::new("sh")
            .args(["-c", &self.command])
            .current_dir(workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConvergeError::Remediation(format!("failed to spawn fix: {e}")))?;

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            ConvergeError::Remediation(format!(
                "fix timed out after {} seconds",
                self.timeout_secs
            ))
        })?
        .map_err(|e| ConvergeError::Remediation(format!("fix failed: {e}")))?;

        if output.status.success() {
            Ok(FixOutcome::success())
        } else {
            Ok(FixOutcome::failure(format!(
                "fix exited {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fix_exit_zero_is_success() {
        let remediator = CommandRemediator::new("true", 30);
        let outcome = remediator.attempt_fix(Path::new(".")).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn fix_exit_nonzero_is_failure() {
        let remediator = CommandRemediator::new("false", 30);
        let outcome = remediator.attempt_fix(Path::new(".")).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.detail.is_some());
    }

    #[tokio::test]
    async fn fix_can_mutate_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let remediator = CommandRemediator::new("echo fixed > patched.txt", 30);
        let outcome = remediator.attempt_fix(dir.path()).await.unwrap();
        assert!(outcome.success);
        assert!(dir.path().join("patched.txt").exists());
    }

    #[tokio::test]
    async fn fix_timeout_is_an_error() {
        let remediator = CommandRemediator::new("sleep 5", 1);
        let result = remediator.attempt_fix(Path::new(".")).await;
        assert!(matches!(result, Err(ConvergeError::Remediation(_))));
    }

    #[test]
    fn outcome_serde_roundtrip() {
        let outcome = FixOutcome::failure("patch rejected");
        let json = serde_json::to_string(&outcome).expect("serialize");
        let deserialized: FixOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(outcome, deserialized);
    }
}
