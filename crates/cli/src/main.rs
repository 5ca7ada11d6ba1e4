//! Archon CLI - plan, route and arbitrate task graphs.

mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archon_core::{ExecutorProfile, PhaseContext, ProjectPhase, Task, TaskId};
use archon_execution::{build_graph, critical_path, estimate_completion_hours, get_levels, graph_stats, TaskGraph};
use archon_routing::{load_config, Arbitrator, ModelScorer, RoutingConfig, ToolRouter};
use archon_storage::{JsonStorage, Storage};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archon")]
#[command(about = "Task graph scheduling and executor routing", long_about = None)]
struct Cli {
    /// Directory holding decisions, tasks and performance history
    #[arg(long, global = true, default_value = ".archon")]
    store: PathBuf,

    /// Routing configuration file
    #[arg(long, global = true, default_value = "archon.toml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show levels, critical path and completion estimate for a task file
    Plan {
        /// Tasks file (JSON or TOML)
        file: PathBuf,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which executor each task would be routed to
    Route {
        /// Tasks file (JSON or TOML)
        file: PathBuf,
    },
    /// Resolve competing proposals for a task and record the decision
    Arbitrate {
        /// Proposals file (JSON or TOML)
        file: PathBuf,
        /// Task the proposals are for
        #[arg(long)]
        task: String,
        /// Project phase
        #[arg(long, default_value = "iteration")]
        phase: ProjectPhase,
    },
    /// Print recorded decisions
    Decisions {
        /// Only decisions for this task
        #[arg(long)]
        task: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.config).with_context(|| format!("invalid config {}", cli.config.display()))?;

    match cli.command {
        Commands::Plan { file, json } => plan(&file, json),
        Commands::Route { file } => route(&file, &cli.store, &config).await,
        Commands::Arbitrate { file, task, phase } => arbitrate(&file, task, phase, &cli.store, &config).await,
        Commands::Decisions { task } => decisions(task, &cli.store).await,
    }
}

fn load_graph(file: &Path) -> Result<TaskGraph> {
    let tasks = input::load_tasks(file)?;
    debug!("Loaded {} tasks from {}", tasks.len(), file.display());
    Ok(build_graph(tasks)?)
}

fn plan(file: &Path, json: bool) -> Result<()> {
    let graph = load_graph(file)?;
    let levels = get_levels(&graph);
    let path = critical_path(&graph);
    let estimate = estimate_completion_hours(&graph);
    let stats = graph_stats(&graph);

    if json {
        let out = serde_json::json!({
            "levels": levels,
            "critical_path": path,
            "estimated_hours": estimate,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Plan: {} tasks, {} dependencies, {} levels (max {} in parallel)",
        stats.total_tasks, stats.total_dependencies, stats.levels, stats.max_parallelism
    );
    for (i, level) in levels.iter().enumerate() {
        let ids: Vec<&str> = level.iter().map(TaskId::as_str).collect();
        println!("  Level {}: {}", i, ids.join(", "));
    }
    let chain: Vec<&str> = path.tasks.iter().map(TaskId::as_str).collect();
    println!("Critical path ({:.1}h): {}", path.total_hours, chain.join(" -> "));
    println!("Estimated completion: {:.1}h", estimate);
    Ok(())
}

async fn route(file: &Path, store: &Path, config: &RoutingConfig) -> Result<()> {
    let graph = load_graph(file)?;
    let storage = JsonStorage::new(store).await?;
    let history = storage.load_performance().await?;

    let scorer = ModelScorer::new(config.scoring, config.penalties)?;
    let tools = ToolRouter::new(config.tools.clone())?;
    let catalog = ExecutorProfile::default_catalog();

    for id in graph.topological_order() {
        let Some(task) = graph.task(&id) else { continue };
        print_route(task, &scorer, &tools, &catalog, &history);
    }
    Ok(())
}

fn print_route(
    task: &Task,
    scorer: &ModelScorer,
    tools: &ToolRouter,
    catalog: &[ExecutorProfile],
    history: &archon_core::PerformanceHistory,
) {
    println!("{} [{}] {}", task.id, task.category, task.description);

    let decision = tools.should_use_tool(task);
    if decision.use_tool {
        println!("  -> tool {} ({})", decision.tool.as_deref().unwrap_or("?"), decision.reasoning);
        return;
    }
    debug!("{}", decision.reasoning);

    match scorer.score_executors(task, catalog, history) {
        Ok(selection) => {
            println!("  -> {} ({:.3})", selection.best, selection.best_score());
            for (executor, score) in &selection.scores {
                let marker = if *executor == selection.best { "*" } else { " " };
                println!("     {} {:<20} {:.3}", marker, executor, score);
            }
        }
        Err(e) => println!("  -> unroutable: {}", e),
    }
}

async fn arbitrate(
    file: &Path,
    task_id: String,
    phase: ProjectPhase,
    store: &Path,
    config: &RoutingConfig,
) -> Result<()> {
    let proposals = input::load_proposals(file)?;
    let storage = JsonStorage::new(store).await?;

    let task_id = TaskId::new(task_id);
    let task = match storage.load_task(&task_id).await? {
        Some(task) => task,
        None => {
            warn!("Task {} is not in {}, arbitrating by id only", task_id, store.display());
            Task::new(task_id.clone(), task_id.as_str())
        }
    };

    let mut arbitrator = Arbitrator::new(storage, config.arbitration)?;
    let decision = arbitrator
        .resolve_conflict(&task, proposals, PhaseContext::new(phase))
        .await?;

    info!("Recorded decision {}", decision.id);
    println!("Decision {} for {}", decision.id, decision.task_id);
    println!("  {}", decision.reasoning);
    for candidate in &decision.candidates {
        println!("  {:.3}  {}  {}", candidate.score, candidate.proposal.proposer, candidate.proposal.summary);
    }
    Ok(())
}

async fn decisions(task: Option<String>, store: &Path) -> Result<()> {
    let storage = JsonStorage::new(store).await?;
    let filter = task.map(TaskId::new);
    let decisions = storage.list_decisions(filter.as_ref()).await?;

    println!("Decisions ({})", decisions.len());
    for decision in decisions {
        let margin = decision
            .margin
            .map(|m| format!("{m:.3}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} | {} | {} | {} | {:.3} (margin {})",
            decision.timestamp.format("%Y-%m-%d %H:%M:%S"),
            decision.task_id,
            decision.phase,
            decision.winner(),
            decision.chosen.score,
            margin,
        );
    }
    Ok(())
}
