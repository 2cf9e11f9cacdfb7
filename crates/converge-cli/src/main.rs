//! Converge - autonomous quality-convergence loop CLI
//!
//! ## Commands
//!
//! - `run`: drive a workspace toward gate compliance
//! - `checkpoints`: list or prune checkpoint snapshots
//! - `report`: render a persisted run report
//!
//! `run` exits with the terminal outcome code: 0 SUCCEEDED, 1 FAILED,
//! 2 CIRCUIT_TRIPPED, 3 NOT_APPROVED, 4 CRITICAL_FAILURE.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use converge_core::{
    init_tracing, read_run_artifact, render_run_report_md, runs_dir, CheckpointStore,
    CommandGateRunner, CommandRemediator, ConfirmationConfig, DivergencePolicy, FixOutcome,
    GitBackend, Orchestrator, Remediator, RollbackConfig, RollbackStrategy, RunConfig,
    RunOutcome,
};

#[derive(Parser)]
#[command(name = "converge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Autonomous quality-convergence loop for git workspaces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Reset,
    Revert,
    Checkout,
}

impl From<StrategyArg> for RollbackStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Reset => RollbackStrategy::Reset,
            StrategyArg::Revert => RollbackStrategy::Revert,
            StrategyArg::Checkout => RollbackStrategy::Checkout,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DivergenceArg {
    Warn,
    Fail,
}

impl From<DivergenceArg> for DivergencePolicy {
    fn from(arg: DivergenceArg) -> Self {
        match arg {
            DivergenceArg::Warn => DivergencePolicy::Warn,
            DivergenceArg::Fail => DivergencePolicy::Fail,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the convergence loop against a workspace
    Run {
        /// Workspace to drive (must be a git work tree)
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Gate as `name=command`, repeatable; validated in the given order
        #[arg(short, long = "gate", required = true)]
        gates: Vec<String>,

        /// Remediation command (omitting it makes every fix attempt fail)
        #[arg(long)]
        fix: Option<String>,

        /// Iteration budget
        #[arg(long, default_value_t = 10)]
        max_iterations: u32,

        /// Consecutive-rollback limit for the circuit breaker
        #[arg(long, default_value_t = 3)]
        threshold: u32,

        /// Rollback strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::Reset)]
        strategy: StrategyArg,

        /// Treatment of post-rollback divergence under revert/checkout
        #[arg(long, value_enum, default_value_t = DivergenceArg::Warn)]
        divergence: DivergenceArg,

        /// Derived-cache directory cleared after a rollback, repeatable
        #[arg(long = "cache-dir", default_value = "target")]
        cache_dirs: Vec<String>,

        /// Simulate remediation without mutating or rolling back
        #[arg(long)]
        dry_run: bool,

        /// Commit surviving remediation changes each iteration
        #[arg(long)]
        auto_commit: bool,

        /// Iterate on a dedicated working branch
        #[arg(long)]
        work_branch: bool,

        /// Checkpoint retention window for post-run pruning
        #[arg(long, default_value_t = 7)]
        retention_days: i64,

        /// Skip the confirmation gate
        #[arg(long)]
        no_confirm: bool,

        /// Confirmation timeout in seconds
        #[arg(long, default_value_t = 60)]
        approve_timeout: u64,

        /// Approve automatically when the confirmation timeout elapses
        #[arg(long)]
        auto_approve: bool,

        /// Listen for a single keypress as an approval channel
        #[arg(long)]
        interactive: bool,

        /// Filesystem marker whose existence approves the run
        #[arg(long, default_value = ".converge/approve")]
        approve_marker: PathBuf,

        /// Environment flag checked for approval
        #[arg(long, default_value = "CONVERGE_APPROVED")]
        approve_env: String,

        /// Per-gate command timeout in seconds
        #[arg(long, default_value_t = 600)]
        gate_timeout: u64,

        /// Remediation command timeout in seconds
        #[arg(long, default_value_t = 1800)]
        fix_timeout: u64,
    },

    /// Inspect or prune checkpoint snapshots
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Render a persisted run report
    Report {
        /// Run ID to report on
        #[arg(long)]
        run: String,

        /// Workspace holding the run artifacts
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List checkpoints with their ages
    List {
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },

    /// Delete checkpoints older than the retention window
    Prune {
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        #[arg(long, default_value_t = 7)]
        older_than_days: i64,
    },
}

/// Stands in when no `--fix` command is configured.
struct NoRemediator;

#[async_trait]
impl Remediator for NoRemediator {
    async fn attempt_fix(&self, _workspace: &Path) -> converge_core::Result<FixOutcome> {
        Ok(FixOutcome::failure("no fix command configured"))
    }
}

/// Split repeated `name=command` gate arguments into an ordered name list
/// and a command map.
fn parse_gate_specs(pairs: &[String]) -> Result<(Vec<String>, BTreeMap<String, String>)> {
    let mut names = Vec::new();
    let mut commands = BTreeMap::new();
    for pair in pairs {
        let Some((name, command)) = pair.split_once('=') else {
            bail!("gate must be given as name=command, got: {pair}");
        };
        let name = name.trim();
        let command = command.trim();
        if name.is_empty() || command.is_empty() {
            bail!("gate must be given as name=command, got: {pair}");
        }
        if commands.insert(name.to_string(), command.to_string()).is_some() {
            bail!("duplicate gate name: {name}");
        }
        names.push(name.to_string());
    }
    Ok((names, commands))
}

fn outcome_exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Succeeded => 0,
        RunOutcome::Failed => 1,
        RunOutcome::CircuitTripped => 2,
        RunOutcome::NotApproved => 3,
        RunOutcome::CriticalFailure => 4,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);

    match cli.command {
        Commands::Run {
            workspace,
            gates,
            fix,
            max_iterations,
            threshold,
            strategy,
            divergence,
            cache_dirs,
            dry_run,
            auto_commit,
            work_branch,
            retention_days,
            no_confirm,
            approve_timeout,
            auto_approve,
            interactive,
            approve_marker,
            approve_env,
            gate_timeout,
            fix_timeout,
        } => {
            let (gate_names, gate_commands) = parse_gate_specs(&gates)?;

            let config = RunConfig {
                workspace,
                gates: gate_names,
                max_iterations,
                dry_run,
                auto_commit,
                use_work_branch: work_branch,
                breaker_threshold: threshold,
                retention_days,
                rollback: RollbackConfig {
                    strategy: strategy.into(),
                    divergence: divergence.into(),
                    cache_dirs,
                },
                confirmation: ConfirmationConfig {
                    enabled: !no_confirm,
                    timeout: Duration::from_secs(approve_timeout),
                    auto_approve,
                    marker_path: approve_marker,
                    env_var: approve_env,
                    interactive,
                    ..ConfirmationConfig::default()
                },
            };

            let remediator: Arc<dyn Remediator> = match fix {
                Some(command) => Arc::new(CommandRemediator::new(command, fix_timeout)),
                None => Arc::new(NoRemediator),
            };
            let orchestrator = Orchestrator::new(
                config,
                Arc::new(CommandGateRunner::new(gate_commands, gate_timeout)),
                remediator,
            );

            let summary = orchestrator.run().await.context("run failed")?;
            info!(
                run_id = %summary.run_id,
                outcome = ?summary.outcome,
                iterations = summary.iterations,
                rollbacks = summary.rollbacks,
                "run complete"
            );
            println!(
                "{}: {} iteration(s), {} rollback(s); report under .converge/runs/{}",
                summary.outcome.as_str(),
                summary.iterations,
                summary.rollbacks,
                summary.run_id
            );
            std::process::exit(outcome_exit_code(summary.outcome));
        }

        Commands::Checkpoints { action } => match action {
            CheckpointAction::List { workspace } => {
                let git = GitBackend::open(&workspace)?;
                let store = CheckpointStore::new(&git);
                let checkpoints = store.list()?;
                if checkpoints.is_empty() {
                    println!("no checkpoints");
                }
                for (id, created) in checkpoints {
                    println!("{id}  created_at_unix {created}");
                }
            }
            CheckpointAction::Prune {
                workspace,
                older_than_days,
            } => {
                let git = GitBackend::open(&workspace)?;
                let store = CheckpointStore::new(&git);
                let removed = store.prune(older_than_days)?;
                println!("pruned {removed} checkpoint(s)");
            }
        },

        Commands::Report { run, workspace } => {
            let artifact = read_run_artifact(&run, &runs_dir(&workspace))?;
            print!("{}", render_run_report_md(&artifact));
        }
    }

    Ok(())
}
