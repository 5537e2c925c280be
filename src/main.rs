use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use menhir_engine::ExecutionEngine;
use menhir_node::ServiceContainer;
use menhir_nodes::builtin_registry;
use menhir_runner::{RunnerConfig, TickCallback, TickResults, WorkflowRunner};
use menhir_workflow::WorkflowDoc;

/// Menhir - a node-based workflow platform for autonomous agents
#[derive(Parser)]
#[command(name = "menhir")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow
  Run {
    #[command(subcommand)]
    target: RunTarget,
  },
}

#[derive(Subcommand)]
enum RunTarget {
  /// Execute a workflow once and print its results
  Workflow {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow continuously until interrupted, printing tick results
  Continuous {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run { target }) => match target {
      RunTarget::Workflow { workflow_file } => run_workflow(workflow_file)?,
      RunTarget::Continuous { workflow_file } => run_continuous(workflow_file)?,
    },
    None => {
      println!("menhir - use --help to see available commands");
    }
  }

  Ok(())
}

fn default_engine() -> ExecutionEngine {
  ExecutionEngine::new(
    Arc::new(builtin_registry()),
    Arc::new(ServiceContainer::empty()),
  )
}

fn load_graph(workflow_file: &PathBuf) -> Result<menhir_workflow::NodeGraph> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  let doc: WorkflowDoc = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))?;
  Ok(doc.into_graph())
}

fn run_workflow(workflow_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let graph = load_graph(&workflow_file)?;
    eprintln!("Loaded workflow: {} ({} nodes)", graph.name, graph.nodes.len());

    let variables = read_variables_from_stdin()?;
    let engine = default_engine();
    let result = engine.execute(&graph, variables).await;

    eprintln!(
      "Execution {}: {} nodes in {:.3}s",
      if result.success { "completed" } else { "failed" },
      result.node_results.len(),
      result.total_execution_time
    );
    if let Some(error) = &result.error {
      eprintln!("Error: {error}");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
  })
}

fn run_continuous(workflow_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let graph = load_graph(&workflow_file)?;
    eprintln!(
      "Starting continuous workflow: {} ({} nodes)",
      graph.name,
      graph.nodes.len()
    );

    let variables = read_variables_from_stdin()?;
    let runner = WorkflowRunner::new(default_engine(), RunnerConfig::default());

    let on_tick: TickCallback = Arc::new(|results: &TickResults| {
      match serde_json::to_string(results) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("failed to serialize tick results: {e}"),
      }
    });

    let workflow_id = runner
      .start_workflow(graph, variables, Some(on_tick), None)
      .await
      .context("failed to start workflow")?;

    if runner.get_status(&workflow_id).await.is_none() {
      // One-shot shortcut already ran; nothing to keep alive.
      return Ok(());
    }

    eprintln!("Workflow {workflow_id} running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    runner.stop_all().await;
    eprintln!("Stopped");
    Ok(())
  })
}

fn read_variables_from_stdin() -> Result<serde_json::Map<String, serde_json::Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read variables from stdin")?;

  if input.trim().is_empty() {
    return Ok(serde_json::Map::new());
  }

  let value: serde_json::Value =
    serde_json::from_str(&input).context("failed to parse variables JSON from stdin")?;
  match value {
    serde_json::Value::Object(map) => Ok(map),
    _ => anyhow::bail!("variables must be a JSON object"),
  }
}
