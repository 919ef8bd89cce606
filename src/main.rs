use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use shardflow_config::RunConfig;
use shardflow_engine::{Pipeline, RunEngine};
use shardflow_gather::ConcatMerger;
use shardflow_scheduler::{NodeState, RunStatus};
use shardflow_task_executor::ProcessExecutor;

/// Shardflow - scatter-gather pipeline runner
#[derive(Parser)]
#[command(name = "shardflow")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the partition plan as JSON
  Plan {
    /// Path to the run config (JSON)
    config: PathBuf,
    /// Units file, one unit per line
    units: PathBuf,
  },

  /// Print the task graph as JSON
  Graph {
    /// Path to the run config (JSON)
    config: PathBuf,
    /// Units file, one unit per line
    units: PathBuf,
  },

  /// Run the pipeline, invoking a program once per task
  Run {
    /// Path to the run config (JSON)
    config: PathBuf,
    /// Units file, one unit per line
    units: PathBuf,
    /// Program invoked for every non-gather task
    #[arg(long)]
    program: PathBuf,
    /// Argument templates passed to the program (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,
    /// Directory for merged outputs
    #[arg(long)]
    out: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(EnvFilter::from_default_env().add_directive("shardflow=info".parse()?))
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Plan { config, units } => plan(&config, &units),
    Commands::Graph { config, units } => graph(&config, &units),
    Commands::Run {
      config,
      units,
      program,
      args,
      out,
    } => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(&config, &units, program, args, out).await })
    }
  }
}

fn load_config(path: &Path) -> Result<RunConfig> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config file: {}", path.display()))?;
  RunConfig::from_json(&content)
    .with_context(|| format!("invalid config file: {}", path.display()))
}

fn load_units(path: &Path) -> Result<Vec<String>> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read units file: {}", path.display()))?;
  Ok(
    content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect(),
  )
}

fn pipeline(config_file: &Path) -> Result<Pipeline> {
  let config = load_config(config_file)?;
  Pipeline::new(config).context("invalid run config")
}

fn plan(config_file: &Path, units_file: &Path) -> Result<()> {
  let pipeline = pipeline(config_file)?;
  let units = load_units(units_file)?;

  let partitions = pipeline.plan(&units).context("failed to plan partitions")?;

  eprintln!("Planned {} partitions over {} units", partitions.len(), units.len());
  println!("{}", serde_json::to_string_pretty(&partitions)?);
  Ok(())
}

fn graph(config_file: &Path, units_file: &Path) -> Result<()> {
  let pipeline = pipeline(config_file)?;
  let units = load_units(units_file)?;

  let (partitions, graph) = pipeline
    .build(&units)
    .context("failed to build task graph")?;

  eprintln!("Built {} tasks over {} partitions", graph.len(), partitions.len());
  let output = serde_json::json!({
    "partitions": partitions.len(),
    "kinds": graph.kind_histogram(),
    "nodes": graph.nodes(),
  });
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn run(
  config_file: &Path,
  units_file: &Path,
  program: PathBuf,
  args: Vec<String>,
  out: PathBuf,
) -> Result<()> {
  let config = load_config(config_file)?;
  let units = load_units(units_file)?;

  let executor = Arc::new(ProcessExecutor::new(program, args));
  let merger = Arc::new(ConcatMerger::new(out));
  let engine = RunEngine::new(config, executor, merger).context("failed to create run engine")?;

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupted, cancelling run");
      on_interrupt.cancel();
    }
  });

  let outcome = engine
    .run(&units, cancel)
    .await
    .context("run failed")?;

  eprintln!("Execution {}: {:?}", outcome.execution_id, outcome.status);
  println!("{}", serde_json::to_string_pretty(&outcome.outputs)?);

  match outcome.status {
    RunStatus::Succeeded => Ok(()),
    RunStatus::Failed => bail!(
      "run {} failed: {:?}",
      outcome.execution_id,
      outcome.report.tasks_in(NodeState::Failed)
    ),
    RunStatus::Cancelled => bail!("run {} cancelled", outcome.execution_id),
  }
}
