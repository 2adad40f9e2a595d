//! Unblock CLI - drive the blocker resolution loop from a shell.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use unblock_core::{
    ArlConfig, BlockerId, BlockerSignal, BlockerType, ConfirmingParty, EmployeeId, GraphSnapshot,
    Severity, SourceKind, TaskId, TaskStatus,
};
use unblock_orchestrator::{CurrentState, Orchestrator, StepOutcome, Ticker};
use unblock_storage::JsonStorage;

#[derive(Parser)]
#[command(name = "unblock")]
#[command(about = "Closed-loop blocker resolution", long_about = None)]
struct Cli {
    /// Storage directory
    #[arg(long, global = true, default_value = ".unblock")]
    storage: PathBuf,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dependency graph commands
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
    /// Submit a blocker signal and advance it as far as it goes
    Submit {
        /// Where the signal came from (check_in, monitor, report)
        #[arg(long, default_value = "report")]
        source: SourceKind,
        /// Who reported it
        #[arg(long)]
        reporter: String,
        /// What is blocked
        #[arg(long)]
        description: String,
        /// Blocked task (repeatable)
        #[arg(long = "task")]
        tasks: Vec<String>,
    },
    /// Run one loop step
    Advance {
        /// Blocker ID
        id: BlockerId,
    },
    /// Record a reply from someone contacted
    Respond {
        /// Blocker ID
        id: BlockerId,
        /// Responder
        #[arg(long)]
        from: String,
        /// Reply text
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Record that the blocker was fixed
    Resolve {
        /// Blocker ID
        id: BlockerId,
        /// Who fixed it
        #[arg(long)]
        by: String,
        /// What was done
        #[arg(long)]
        notes: String,
    },
    /// Confirm a resolution
    Confirm {
        /// Blocker ID
        id: BlockerId,
        /// reporter or resolver
        #[arg(long)]
        party: ConfirmingParty,
    },
    /// Report that a resolved blocker came back
    Returned {
        /// Blocker ID
        id: BlockerId,
        /// What happened
        #[arg(long, default_value = "blocker returned")]
        notes: String,
    },
    /// Clear a review flag, optionally reclassifying
    Approve {
        /// Blocker ID
        id: BlockerId,
        /// Approver
        #[arg(long, default_value = "operator")]
        by: String,
        /// New blocker type (reclassify)
        #[arg(long = "type", requires = "severity")]
        blocker_type: Option<BlockerType>,
        /// New severity (reclassify)
        #[arg(long, requires = "blocker_type")]
        severity: Option<Severity>,
    },
    /// Abandon a blocker
    Deprioritize {
        /// Blocker ID
        id: BlockerId,
        /// Who decided
        #[arg(long)]
        by: String,
        /// Why
        #[arg(long)]
        reason: String,
    },
    /// Show one blocker or all of them
    Status {
        /// Blocker ID
        id: Option<BlockerId>,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List blockers waiting for human review
    Flagged,
    /// Fire due escalations and verification timers once
    Tick,
    /// Run the ticker until Ctrl-C
    Run,
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Load employees, projects, tasks and edges from a JSON file
    Import {
        /// Snapshot file
        file: PathBuf,
    },
    /// Everything transitively waiting on a task
    BlastRadius {
        /// Task ID
        task: String,
    },
    /// Tasks the most work waits on
    Bottlenecks {
        /// How many to show
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// How a slip on a task spreads downstream
    Cascade {
        /// Task ID
        task: String,
        /// Estimated slip in hours
        #[arg(long)]
        hours: f64,
    },
    /// Update a task's status
    SetStatus {
        /// Task ID
        task: String,
        /// New status
        status: TaskStatus,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let orchestrator = open(&cli.storage, config).await?;

    match cli.command {
        Commands::Graph { command } => graph(&orchestrator, command).await?,
        Commands::Submit {
            source,
            reporter,
            description,
            tasks,
        } => {
            let signal = BlockerSignal::new(source, reporter, description, orchestrator.now())
                .with_tasks(tasks.into_iter().map(TaskId::from));
            let id = orchestrator.submit(signal).await?;
            println!("Submitted blocker: {}", id);
            let outcome = orchestrator.advance_until_waiting(id).await?;
            print_outcome(id, &outcome);
        }
        Commands::Advance { id } => {
            let outcome = orchestrator.advance(id).await?;
            print_outcome(id, &outcome);
        }
        Commands::Respond { id, from, message } => {
            orchestrator.record_response(id, EmployeeId::from(from), message).await?;
            let outcome = orchestrator.advance_until_waiting(id).await?;
            print_outcome(id, &outcome);
        }
        Commands::Resolve { id, by, notes } => {
            let outcome = orchestrator.record_resolution(id, EmployeeId::from(by), notes).await?;
            print_outcome(id, &outcome);
        }
        Commands::Confirm { id, party } => {
            let outcome = orchestrator.confirm(id, party).await?;
            print_outcome(id, &outcome);
            if matches!(outcome, StepOutcome::Advanced { .. }) {
                let outcome = orchestrator.advance_until_waiting(id).await?;
                print_outcome(id, &outcome);
            }
        }
        Commands::Returned { id, notes } => {
            orchestrator.report_returned(id, notes).await?;
            let outcome = orchestrator.advance_until_waiting(id).await?;
            print_outcome(id, &outcome);
        }
        Commands::Approve {
            id,
            by,
            blocker_type,
            severity,
        } => {
            let by = EmployeeId::from(by);
            match (blocker_type, severity) {
                (Some(blocker_type), Some(severity)) => {
                    orchestrator.reclassify(id, blocker_type, severity, by).await?
                }
                _ => orchestrator.approve(id, by).await?,
            }
            let outcome = orchestrator.advance_until_waiting(id).await?;
            print_outcome(id, &outcome);
        }
        Commands::Deprioritize { id, by, reason } => {
            let outcome = orchestrator.deprioritize(id, EmployeeId::from(by), reason).await?;
            print_outcome(id, &outcome);
        }
        Commands::Status { id: Some(id), json } => {
            if json {
                let record = orchestrator.record(id).await?;
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_status(&orchestrator.status(id).await?);
            }
        }
        Commands::Status { id: None, json } => {
            let statuses = orchestrator.statuses().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!("Blockers ({})", statuses.len());
                for status in &statuses {
                    println!(
                        "  {} | {} | {} - {}",
                        status.id,
                        status.state,
                        status.severity.map_or("-", |s| s.as_str()),
                        status.description,
                    );
                }
                let metrics = orchestrator.metrics().await;
                println!(
                    "Resolved {} of {} (avg {:.1}h), {} escalated, {} abandoned, {} flagged",
                    metrics.resolved,
                    metrics.detected,
                    metrics.avg_resolution_hours(),
                    metrics.escalated,
                    metrics.abandoned,
                    metrics.flagged,
                );
            }
        }
        Commands::Flagged => {
            let flagged = orchestrator.flagged().await;
            println!("Flagged for review ({})", flagged.len());
            for f in flagged {
                println!("  {} | {} | {} - {}", f.id, f.state, f.reason.as_str(), f.detail);
            }
        }
        Commands::Tick => {
            let polled = orchestrator.poll_adapters().await?;
            let report = orchestrator.tick(orchestrator.now()).await?;
            println!(
                "Fired {} escalations, {} responses polled, {} new blockers, {} exhausted, {} verification failures",
                report.fired,
                polled.responses,
                polled.detected.len(),
                report.exhausted.len(),
                report.verification_failed.len(),
            );
        }
        Commands::Run => {
            let period = orchestrator.config().tick_interval();
            let ticker = Ticker::spawn(Arc::new(orchestrator), period);
            info!(period_secs = period.as_secs(), "Running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            ticker.shutdown().await;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ArlConfig> {
    match path {
        Some(path) => ArlConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ArlConfig::default()),
    }
}

async fn open(root: &Path, config: ArlConfig) -> Result<Orchestrator> {
    let storage = JsonStorage::new(root)
        .await
        .with_context(|| format!("Failed to open storage at {}", root.display()))?;
    let orchestrator = Orchestrator::new(config, Arc::new(storage)).restore().await?;
    Ok(orchestrator)
}

async fn graph(orchestrator: &Orchestrator, command: GraphCommands) -> Result<()> {
    match command {
        GraphCommands::Import { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let snapshot: GraphSnapshot = serde_json::from_str(&json)?;
            let (tasks, edges) = (snapshot.tasks.len(), snapshot.edges.len());
            orchestrator.import_graph(snapshot).await?;
            println!("Imported {} tasks and {} edges", tasks, edges);
        }
        GraphCommands::BlastRadius { task } => {
            let graph = orchestrator.graph();
            let radius = graph.read().await.blast_radius(&TaskId::from(task.as_str()))?;
            println!("Blast radius of {}: {} tasks", task, radius.task_count());
            for t in &radius.affected_tasks {
                println!("  {}", t);
            }
            println!("  employees: {}", join(&radius.affected_employees));
            println!("  projects: {}", join(&radius.affected_projects));
        }
        GraphCommands::Bottlenecks { top } => {
            let graph = orchestrator.graph();
            let bottlenecks = graph.read().await.bottlenecks(top);
            println!("Bottlenecks ({})", bottlenecks.len());
            for b in bottlenecks {
                println!(
                    "  {} | score {:.3} | {} waiting | betweenness {:.3}",
                    b.task, b.score, b.in_degree, b.betweenness
                );
            }
        }
        GraphCommands::Cascade { task, hours } => {
            let graph = orchestrator.graph();
            let cascade = graph.read().await.cascade_delay(&TaskId::from(task.as_str()), hours)?;
            println!(
                "A {:.1}h slip on {} delays {} tasks by {:.1}h in total (worst {:.1}h)",
                hours, task, cascade.tasks_delayed, cascade.total_delay_hours, cascade.max_chain_delay
            );
            for (t, delay) in &cascade.per_task_delay {
                println!("  {} +{:.1}h", t, delay);
            }
        }
        GraphCommands::SetStatus { task, status } => {
            let unblocked = orchestrator
                .set_task_status(&TaskId::from(task.as_str()), status)
                .await?;
            println!("{} is now {}", task, status.as_str());
            for t in unblocked {
                println!("  no longer waiting: {}", t);
            }
        }
    }
    Ok(())
}

fn print_outcome(id: BlockerId, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Advanced { from, to } => println!("{}: {} -> {}", id, from, to),
        StepOutcome::Waiting { state } => println!("{}: waiting in {}", id, state),
        StepOutcome::Flagged { reason } => println!("{}: flagged for review ({})", id, reason.as_str()),
        StepOutcome::Complete => println!("{}: loop complete", id),
        StepOutcome::Terminal => println!("{}: abandoned", id),
    }
}

fn print_status(status: &CurrentState) {
    println!("Blocker: {}", status.id);
    println!("  State: {}", status.state);
    println!("  Description: {}", status.description);
    if let (Some(t), Some(s)) = (status.blocker_type, status.severity) {
        println!("  Classified: {} / {}", t.as_str(), s.as_str());
    }
    println!("  Blast radius: {} tasks", status.blast_radius);
    if let Some(target) = &status.target {
        println!("  Target: {}", target);
    }
    if let Some(flag) = status.flag {
        println!("  Flag: {}", flag.as_str());
    }
    println!("  Loops completed: {}", status.loops_completed);
    for entry in &status.pending_escalations {
        println!("  Pending: {} at {}", entry.stage.as_str(), entry.due_at);
    }
    if let Some(step) = &status.last_step {
        println!("  Last step: {} by {} at {}", step.action, step.actor, step.started_at);
    }
    println!("  Updated: {}", status.updated_at);
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
