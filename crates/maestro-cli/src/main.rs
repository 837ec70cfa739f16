//! `maestro`: submit free-form tasks to the orchestration engine from a terminal.

mod approval;
mod config;
mod executor;
mod oracle;

use anyhow::Context;
use approval::StdinApprovalChannel;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use config::MaestroConfig;
use executor::LocalExecutor;
use maestro_memory::FileLearningStore;
use maestro_orchestrator::{
    ApprovalStatus, Orchestrator, Priority, SubmitOptions, TaskStatus, WorkerRegistry,
};
use oracle::HttpOracle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Critical => Priority::Critical,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify, decompose and execute a task
    Run {
        /// What should be done, in plain language
        description: String,
        /// Extra context lines (repeatable)
        #[arg(long)]
        context: Vec<String>,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        /// Cap on workers assigned to the task
        #[arg(long)]
        max_agents: Option<usize>,
        /// Deadline, in seconds from now
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
        /// Ask on the terminal before running gated actions
        #[arg(long)]
        interactive_approval: bool,
    },
    /// Show the configured worker pool
    Workers,
    /// Decompose a task and print its execution order without running it
    Plan {
        description: String,
        #[arg(long)]
        context: Vec<String>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn build_orchestrator(
    config: &MaestroConfig,
    interactive_approval: bool,
) -> anyhow::Result<Orchestrator> {
    let api_key = config.model.resolved_api_key()?;
    let oracle = HttpOracle::new(
        config.model.clone(),
        api_key,
        Duration::from_secs(config.executor.http_timeout_secs),
    )?;

    tokio::fs::create_dir_all(&config.executor.workspace_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create workspace '{}'",
                config.executor.workspace_root.display()
            )
        })?;
    let executor = LocalExecutor::new(&config.executor)?;

    tokio::fs::create_dir_all(&config.data_dir).await?;
    let learning = FileLearningStore::new(config.data_dir.join("patterns.jsonl")).await?;

    let registry = WorkerRegistry::with_workers(config.worker_pool())?;

    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        Arc::new(oracle),
        Arc::new(registry),
        Arc::new(executor),
        Arc::new(learning),
    );
    Ok(if interactive_approval {
        orchestrator.with_approvals(Arc::new(StdinApprovalChannel::default()))
    } else {
        orchestrator
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = MaestroConfig::load(&cli.config).await?;
    info!(config = %cli.config.display(), "Loaded configuration");

    match cli.command {
        Commands::Run {
            description,
            context,
            priority,
            max_agents,
            deadline_secs,
            json,
            interactive_approval,
        } => {
            let orchestrator = build_orchestrator(&config, interactive_approval).await?;
            let deadline = match deadline_secs {
                Some(secs) => {
                    let offset = chrono::Duration::try_seconds(i64::try_from(secs)?)
                        .context("deadline out of range")?;
                    Some(
                        Utc::now()
                            .checked_add_signed(offset)
                            .context("deadline out of range")?,
                    )
                }
                None => None,
            };
            let options = SubmitOptions {
                priority: priority.into(),
                deadline,
                max_agents,
            };

            let response = orchestrator.submit(&description, &context, options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("task {}: {}", response.task_id, response.status);
                println!("{}", response.summary);
                for outcome in &response.record.outcomes {
                    let detail = outcome
                        .error
                        .as_deref()
                        .or(outcome.output.as_deref())
                        .unwrap_or("");
                    println!(
                        "  [{}] {} on {}: {}",
                        outcome.state,
                        outcome.action_id,
                        outcome.worker_id.as_deref().unwrap_or("-"),
                        detail.lines().next().unwrap_or("")
                    );
                }
            }
            if response.status == TaskStatus::Failed {
                anyhow::bail!("task {} did not complete", response.task_id);
            }
        }
        Commands::Workers => {
            for worker in config.worker_pool() {
                let caps: Vec<&str> = worker.capabilities.iter().map(String::as_str).collect();
                println!(
                    "{:<24} {:<12} load {}/{}  [{}]",
                    worker.id,
                    worker.role.to_string(),
                    worker.current_load,
                    worker.max_load,
                    caps.join(", ")
                );
            }
        }
        Commands::Plan {
            description,
            context,
        } => {
            let orchestrator = build_orchestrator(&config, false).await?;
            let plan = orchestrator.plan(&description, &context).await?;
            println!(
                "task {} ({}, ~{}s)",
                plan.task.id, plan.task.complexity, plan.task.estimated_duration_secs
            );
            for (step, id) in plan.order.iter().enumerate() {
                let Some(action) = plan.task.actions.iter().find(|a| &a.id == id) else {
                    continue;
                };
                let gate = if action.approval == ApprovalStatus::PendingApproval {
                    " (needs approval)"
                } else {
                    ""
                };
                println!("{:>3}. {} {}{gate}", step + 1, action.id, action.payload.brief());
                if !action.dependencies.is_empty() {
                    println!("       after {}", action.dependencies.join(", "));
                }
            }
            println!("candidates: {}", plan.candidate_worker_ids.join(", "));
        }
    }

    Ok(())
}
