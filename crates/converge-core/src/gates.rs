//! Quality gate runner seam.
//!
//! The content of each check lives behind [`QualityGate`]; the loop only
//! sees [`GateResult`]s. [`run_gate`] enforces the absorption rule: an
//! error inside a gate becomes an `UNKNOWN` result and never reaches loop
//! control flow.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use crate::domain::error::{ConvergeError, Result};
use crate::domain::gate::{GateResult, GateStatus};
use crate::metrics::METRICS;

/// Trait for quality gate backends.
#[async_trait]
pub trait QualityGate: Send + Sync {
    /// Execute the named check against the workspace.
    async fn validate(&self, gate: &str, workspace: &Path) -> Result<GateResult>;
}

/// Validate one gate, absorbing any internal error into an `UNKNOWN` result.
pub async fn run_gate(runner: &dyn QualityGate, gate: &str, workspace: &Path) -> GateResult {
    METRICS.inc_gates_validated();
    match runner.validate(gate, workspace).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(gate, error = %err, "gate errored; recording UNKNOWN");
            GateResult::unknown(gate, err.to_string())
        }
    }
}

/// Command-backed gate runner: each gate name maps to a shell command run
/// in the workspace.
///
/// If the command prints a JSON object `{"status": "...", "score": N, ...}`
/// on stdout it is taken verbatim; otherwise exit code 0 maps to PASS/100
/// and any other exit code to FAIL/0.
pub struct CommandGateRunner {
    commands: BTreeMap<String, String>,
    timeout_secs: u64,
}

impl CommandGateRunner {
    pub fn new(commands: BTreeMap<String, String>, timeout_secs: u64) -> Self {
        Self {
            commands,
            timeout_secs,
        }
    }

    fn parse_json_contract(gate: &str, stdout: &str) -> Option<GateResult> {
        let value: serde_json::Value = serde_json::from_str(stdout.trim()).ok()?;
        let status = match value.get("status")?.as_str()? {
            "PASS" => GateStatus::Pass,
            "WARN" => GateStatus::Warn,
            "FAIL" => GateStatus::Fail,
            _ => GateStatus::Unknown,
        };
        let score = value.get("score").and_then(|s| s.as_u64()).unwrap_or(0) as u8;
        let details = value.get("details").cloned().unwrap_or(value.clone());
        Some(GateResult::new(gate, status, score).with_details(details))
    }
}

#[async_trait]
impl QualityGate for CommandGateRunner {
    async fn validate(&self, gate: &str, workspace: &Path) -> Result<GateResult> {
        let command = self
            .commands
            .get(gate)
            .ok_or_else(|| ConvergeError::Gate(format!("no command configured for gate {gate}")))?;

        let child = tokio::process::Command::new("sh")
            .args(["-c", command])
            .current_dir(workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConvergeError::Gate(format!("failed to spawn gate {gate}: {e}")))?;

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| {
            ConvergeError::Gate(format!(
                "gate {gate} timed out after {} seconds",
                self.timeout_secs
            ))
        })?
        .map_err(|e| ConvergeError::Gate(format!("gate {gate} failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if let Some(result) = Self::parse_json_contract(gate, &stdout) {
            return Ok(result);
        }

        let result = if output.status.success() {
            GateResult::new(gate, GateStatus::Pass, 100)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            GateResult::new(gate, GateStatus::Fail, 0).with_details(serde_json::json!({
                "exit_code": output.status.code().unwrap_or(-1),
                "stdout": stdout,
                "stderr": stderr,
            }))
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingGate;

    #[async_trait]
    impl QualityGate for FailingGate {
        async fn validate(&self, _gate: &str, _workspace: &Path) -> Result<GateResult> {
            Err(ConvergeError::Gate("collector exploded".to_string()))
        }
    }

    fn runner_with(gate: &str, command: &str) -> CommandGateRunner {
        let mut commands = BTreeMap::new();
        commands.insert(gate.to_string(), command.to_string());
        CommandGateRunner::new(commands, 30)
    }

    #[tokio::test]
    async fn gate_error_becomes_unknown() {
        let result = run_gate(&FailingGate, "security", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Unknown);
        assert!(result.raw_details["error"]
            .as_str()
            .unwrap()
            .contains("collector exploded"));
    }

    #[tokio::test]
    async fn exit_zero_maps_to_pass() {
        let runner = runner_with("style", "true");
        let result = run_gate(&runner, "style", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Pass);
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn exit_nonzero_maps_to_fail() {
        let runner = runner_with("tests", "false");
        let result = run_gate(&runner, "tests", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Fail);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn json_contract_on_stdout_wins() {
        let runner = runner_with(
            "architecture",
            r#"echo '{"status": "WARN", "score": 73, "details": {"layers": 2}}'"#,
        );
        let result = run_gate(&runner, "architecture", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Warn);
        assert_eq!(result.score, 73);
        assert_eq!(result.raw_details["layers"], 2);
    }

    #[tokio::test]
    async fn unconfigured_gate_absorbed_as_unknown() {
        let runner = CommandGateRunner::new(BTreeMap::new(), 30);
        let result = run_gate(&runner, "performance", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Unknown);
    }

    #[tokio::test]
    async fn timeout_absorbed_as_unknown() {
        let mut commands = BTreeMap::new();
        commands.insert("slow".to_string(), "sleep 5".to_string());
        let runner = CommandGateRunner {
            commands,
            timeout_secs: 1,
        };
        let result = run_gate(&runner, "slow", Path::new(".")).await;
        assert_eq!(result.status, GateStatus::Unknown);
    }
}
