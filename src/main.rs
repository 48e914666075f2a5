use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use quarry_config::StackDef;
use quarry_engine::{Engine, EngineConfig};
use quarry_graph::Stack;
use quarry_provider::EchoProvider;

/// Quarry - a declarative resource-graph engine
#[derive(Parser)]
#[command(name = "quarry")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a stack against the built-in echo provider
  Up {
    /// Path to the stack file (JSON)
    stack_file: PathBuf,

    /// Maximum number of resources applied concurrently
    #[arg(long, default_value_t = 8)]
    parallelism: usize,
  },

  /// Validate a stack and print its dependency plan
  Plan {
    /// Path to the stack file (JSON)
    stack_file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Up {
      stack_file,
      parallelism,
    } => run_up(stack_file, parallelism),
    Commands::Plan { stack_file } => run_plan(stack_file),
  }
}

fn run_up(stack_file: PathBuf, parallelism: usize) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_up_async(stack_file, parallelism).await })
}

async fn run_up_async(stack_file: PathBuf, parallelism: usize) -> Result<()> {
  let stack = load_stack(&stack_file).await?;
  eprintln!("Locked stack '{}' with {} resources", stack.name, stack.len());

  let engine = Engine::new(EngineConfig { parallelism }, Arc::new(EchoProvider));

  // Ctrl-C stops dispatching and drains in-flight resources.
  let cancel = CancellationToken::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("interrupt received; draining in-flight resources");
        cancel.cancel();
      }
    });
  }

  let result = engine
    .evaluate(&stack, cancel)
    .await
    .context("stack evaluation failed")?;

  eprintln!(
    "Evaluation completed: {} ({})",
    result.evaluation_id,
    if result.succeeded() {
      "succeeded"
    } else {
      "with failures"
    }
  );

  println!("{}", serde_json::to_string_pretty(&result)?);

  Ok(())
}

fn run_plan(stack_file: PathBuf) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_plan_async(stack_file).await })
}

async fn run_plan_async(stack_file: PathBuf) -> Result<()> {
  let stack = load_stack(&stack_file).await?;

  let order = stack
    .graph()
    .topological_order()
    .context("stack has no valid evaluation order")?;

  let plan = json!({
    "stack_id": stack.stack_id,
    "entry_points": stack.graph().entry_points(),
    "order": order,
    "edges": stack.edges(),
  });

  println!("{}", serde_json::to_string_pretty(&plan)?);

  Ok(())
}

async fn load_stack(stack_file: &Path) -> Result<Stack> {
  let content = tokio::fs::read_to_string(stack_file)
    .await
    .with_context(|| format!("failed to read stack file: {}", stack_file.display()))?;

  let def: StackDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse stack file: {}", stack_file.display()))?;

  Stack::lock(def).context("failed to lock stack")
}
