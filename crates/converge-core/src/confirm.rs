//! Pre-loop confirmation gate.
//!
//! Blocks until an operator approves continuation or a deadline elapses.
//! Three independent channels are polled on a fixed interval; the first
//! to signal wins:
//! - a filesystem marker,
//! - a process environment flag,
//! - a single interactive keypress.
//!
//! This is the sole suspending operation before any mutation begins, and
//! its decision is consumed exactly once per run.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::confirm::{ApprovalMethod, ConfirmationDecision};

/// Configuration for the confirmation gate.
#[derive(Debug, Clone)]
pub struct ConfirmationConfig {
    /// When false, the gate is skipped and the run is treated as approved.
    pub enabled: bool,

    /// How long to wait for a signal before the timeout path applies.
    pub timeout: Duration,

    /// Poll interval across the channels.
    pub poll_interval: Duration,

    /// Approve instead of deny when the deadline elapses.
    pub auto_approve: bool,

    /// Filesystem marker whose existence approves the run.
    pub marker_path: PathBuf,

    /// Environment flag; `1`, `true`, or `yes` (case-insensitive) approves.
    pub env_var: String,

    /// Whether to listen for a single keypress on stdin.
    pub interactive: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
            auto_approve: false,
            marker_path: PathBuf::from(".converge/approve"),
            env_var: "CONVERGE_APPROVED".to_string(),
            interactive: false,
        }
    }
}

fn env_is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Polls the approval channels until one signals or the deadline elapses.
pub struct ConfirmationGate {
    config: ConfirmationConfig,
}

impl ConfirmationGate {
    pub fn new(config: ConfirmationConfig) -> Self {
        Self { config }
    }

    /// Block until approved, denied, or timed out.
    pub async fn await_approval(&self) -> ConfirmationDecision {
        if !self.config.enabled {
            tracing::debug!("confirmation gate disabled; treating run as approved");
            return ConfirmationDecision::new(true, ApprovalMethod::TimeoutAuto, 0.0);
        }

        let start = Instant::now();
        let deadline = start + self.config.timeout;

        // Detached stdin reader. The thread blocks on the first byte and is
        // abandoned at process exit if no key is ever pressed.
        let keypress = self.config.interactive.then(|| {
            let (tx, rx) = mpsc::channel::<u8>();
            std::thread::spawn(move || {
                use std::io::Read;
                let mut byte = [0u8; 1];
                if std::io::stdin().read_exact(&mut byte).is_ok() {
                    let _ = tx.send(byte[0]);
                }
            });
            rx
        });

        loop {
            if self.config.marker_path.exists() {
                let decision = ConfirmationDecision::new(
                    true,
                    ApprovalMethod::FileFlag,
                    start.elapsed().as_secs_f64(),
                );
                tracing::info!(marker = %self.config.marker_path.display(), "approved via file flag");
                return decision;
            }

            if let Ok(value) = std::env::var(&self.config.env_var) {
                if env_is_truthy(&value) {
                    tracing::info!(var = %self.config.env_var, "approved via environment flag");
                    return ConfirmationDecision::new(
                        true,
                        ApprovalMethod::EnvVar,
                        start.elapsed().as_secs_f64(),
                    );
                }
            }

            if let Some(rx) = &keypress {
                if let Ok(byte) = rx.try_recv() {
                    let approved = byte == b'y' || byte == b'Y';
                    tracing::info!(approved, "interactive keypress received");
                    return ConfirmationDecision::new(
                        approved,
                        ApprovalMethod::Interactive,
                        start.elapsed().as_secs_f64(),
                    );
                }
            }

            if Instant::now() >= deadline {
                let elapsed = start.elapsed().as_secs_f64();
                if self.config.auto_approve {
                    tracing::info!(elapsed, "confirmation timed out; auto-approve configured");
                    return ConfirmationDecision::new(true, ApprovalMethod::TimeoutAuto, elapsed);
                }
                tracing::warn!(elapsed, "confirmation timed out without approval");
                return ConfirmationDecision::new(false, ApprovalMethod::TimeoutAuto, elapsed);
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
