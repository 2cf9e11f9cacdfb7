//! Domain-level error taxonomy for Converge.

use std::path::PathBuf;

/// Converge domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    #[error("invalid run config: {0}")]
    InvalidConfig(String),

    #[error("workspace is not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("workspace lock already held: {0}")]
    WorkspaceLocked(PathBuf),

    #[error("git error: {0}")]
    Git(String),

    #[error("checkpoint creation failed: {0}")]
    CheckpointCreation(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("invalid checkpoint {id}: {reason}")]
    InvalidCheckpoint { id: String, reason: String },

    #[error("rollback verification failed: {0}")]
    RollbackVerification(String),

    #[error(
        "manual recovery required: rollback and backup restore both failed \
         (backup marker {backup_ref}, stash {stash_ref:?}): {reason}"
    )]
    CriticalRecovery {
        backup_ref: String,
        stash_ref: Option<String>,
        reason: String,
    },

    #[error("gate error: {0}")]
    Gate(String),

    #[error("remediation error: {0}")]
    Remediation(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Converge domain operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvergeError::InvalidConfig("gates cannot be empty".to_string());
        assert!(err.to_string().contains("invalid run config"));

        let err = ConvergeError::CheckpointNotFound("cp-0003".to_string());
        assert!(err.to_string().contains("checkpoint not found"));

        let err = ConvergeError::Git("rev-parse failed".to_string());
        assert!(err.to_string().contains("git error"));
    }

    #[test]
    fn test_critical_recovery_reports_markers() {
        let err = ConvergeError::CriticalRecovery {
            backup_ref: "converge/backup/1700000000-7".to_string(),
            stash_ref: Some("deadbeef".to_string()),
            reason: "reset failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("manual recovery required"));
        assert!(msg.contains("converge/backup/1700000000-7"));
        assert!(msg.contains("deadbeef"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = ConvergeError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
