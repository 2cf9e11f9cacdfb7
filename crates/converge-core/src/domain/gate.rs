//! Quality gate results.

use serde::{Deserialize, Serialize};

/// Outcome status of a single quality gate.
///
/// A gate that errors internally must resolve to `Unknown` rather than
/// propagating the error into loop control flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Pass,
    Warn,
    Fail,
    Unknown,
}

/// Result of validating one gate against current working state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateResult {
    /// Gate name from the configured gate list.
    pub gate: String,

    /// Pass/warn/fail/unknown status.
    pub status: GateStatus,

    /// Gate score, 0..=100.
    pub score: u8,

    /// Gate-specific details (tool output, violation list, etc).
    pub raw_details: serde_json::Value,
}

impl GateResult {
    pub fn new(gate: impl Into<String>, status: GateStatus, score: u8) -> Self {
        Self {
            gate: gate.into(),
            status,
            score: score.min(100),
            raw_details: serde_json::Value::Null,
        }
    }

    /// Attach raw details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.raw_details = details;
        self
    }

    /// Absorbed internal gate error.
    pub fn unknown(gate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            status: GateStatus::Unknown,
            score: 0,
            raw_details: serde_json::json!({ "error": reason.into() }),
        }
    }

    /// Only `PASS` counts; `WARN` does not clear the bar.
    pub fn passed(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

/// Whether every gate in a validation round passed.
pub fn all_pass(results: &[GateResult]) -> bool {
    results.iter().all(GateResult::passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_status_serde_uppercase() {
        let json = serde_json::to_string(&GateStatus::Pass).expect("serialize");
        assert_eq!(json, "\"PASS\"");
        let status: GateStatus = serde_json::from_str("\"UNKNOWN\"").expect("deserialize");
        assert_eq!(status, GateStatus::Unknown);
    }

    #[test]
    fn test_gate_result_serde_roundtrip() {
        let result = GateResult::new("security", GateStatus::Fail, 42)
            .with_details(serde_json::json!({"violations": 3}));
        let json = serde_json::to_string(&result).expect("serialize");
        let deserialized: GateResult = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(result, deserialized);
    }

    #[test]
    fn test_score_clamped_to_100() {
        let result = GateResult::new("style", GateStatus::Pass, 255);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_warn_does_not_pass() {
        assert!(GateResult::new("style", GateStatus::Pass, 100).passed());
        assert!(!GateResult::new("style", GateStatus::Warn, 80).passed());
        assert!(!GateResult::new("style", GateStatus::Fail, 0).passed());
        assert!(!GateResult::unknown("style", "boom").passed());
    }

    #[test]
    fn test_all_pass() {
        let pass = GateResult::new("a", GateStatus::Pass, 100);
        let fail = GateResult::new("b", GateStatus::Fail, 0);
        assert!(all_pass(&[pass.clone()]));
        assert!(!all_pass(&[pass, fail]));
        assert!(all_pass(&[]));
    }

    #[test]
    fn test_unknown_carries_error_text() {
        let result = GateResult::unknown("perf", "collector timed out");
        assert_eq!(result.status, GateStatus::Unknown);
        assert_eq!(result.raw_details["error"], "collector timed out");
    }
}
