//! Confirmation decision produced before loop entry.

use serde::{Deserialize, Serialize};

/// Which channel produced the decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMethod {
    /// Filesystem marker was present.
    FileFlag,

    /// Process environment flag was set.
    EnvVar,

    /// Operator pressed a key.
    Interactive,

    /// The poll deadline elapsed. `approved` distinguishes configured
    /// auto-approval from a timeout denial.
    TimeoutAuto,
}

/// Produced exactly once per run, before any mutating iteration begins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationDecision {
    pub approved: bool,
    pub method: ApprovalMethod,
    pub elapsed_secs: f64,
}

impl ConfirmationDecision {
    pub fn new(approved: bool, method: ApprovalMethod, elapsed_secs: f64) -> Self {
        Self {
            approved,
            method,
            elapsed_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serde_snake_case() {
        let json = serde_json::to_string(&ApprovalMethod::FileFlag).expect("serialize");
        assert_eq!(json, "\"file_flag\"");
        let method: ApprovalMethod = serde_json::from_str("\"timeout_auto\"").expect("deserialize");
        assert_eq!(method, ApprovalMethod::TimeoutAuto);
    }

    #[test]
    fn test_decision_serde_roundtrip() {
        let decision = ConfirmationDecision::new(true, ApprovalMethod::EnvVar, 1.25);
        let json = serde_json::to_string(&decision).expect("serialize");
        let deserialized: ConfirmationDecision = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decision, deserialized);
    }
}
