use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use certloom_capability::CapabilityRegistry;
use certloom_config::WorkflowDef;
use certloom_engine::{EngineConfig, Executor, Scheduler};
use certloom_store::{MemoryWorkflowStore, Recorder, RunStatus, SqliteRecorder, TriggerReason};
use certloom_workflow::Validator;

/// Certloom - certificate lifecycle workflows
#[derive(Parser)]
#[command(name = "certloom")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.certloom)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Sibling branches in flight at once (overrides config.json)
  #[arg(long, global = true)]
  max_parallelism: Option<usize>,

  /// Per-attempt timeout for action nodes, in milliseconds (overrides config.json)
  #[arg(long, global = true)]
  default_timeout_ms: Option<u64>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Validate a workflow's content and draft graphs
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow's published content once
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Schedule every workflow in a directory until interrupted
  Serve {
    /// Directory of workflow files (*.json)
    workflows_dir: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".certloom"),
  };

  let overrides = Overrides {
    max_parallelism: cli.max_parallelism,
    default_timeout_ms: cli.default_timeout_ms,
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Commands::Validate { workflow_file } => validate(&workflow_file),
    Commands::Run { workflow_file } => rt.block_on(run_once(workflow_file, data_dir, overrides)),
    Commands::Serve { workflows_dir } => rt.block_on(serve(workflows_dir, data_dir, overrides)),
  }
}

/// Engine settings given on the command line.
struct Overrides {
  max_parallelism: Option<usize>,
  default_timeout_ms: Option<u64>,
}

impl Overrides {
  fn apply(&self, mut config: EngineConfig) -> EngineConfig {
    if let Some(n) = self.max_parallelism {
      config.max_parallelism = n;
    }
    if let Some(ms) = self.default_timeout_ms {
      config.default_timeout_ms = ms;
    }
    config
  }
}

fn registry() -> Arc<CapabilityRegistry> {
  Arc::new(certloom_providers::builtin_registry())
}

fn read_workflow(path: &Path) -> Result<WorkflowDef> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read workflow file: {}", path.display()))?;
  serde_json::from_str(&raw)
    .with_context(|| format!("failed to parse workflow file: {}", path.display()))
}

/// Build an executor backed by the SQLite recorder in the data directory.
async fn open_executor(
  data_dir: &Path,
  overrides: &Overrides,
) -> Result<(Arc<Executor>, Arc<SqliteRecorder>)> {
  std::fs::create_dir_all(data_dir)
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let config = overrides.apply(EngineConfig::load(&data_dir.join("config.json"))?);
  let db_path = data_dir.join("certloom.db");
  let recorder = Arc::new(
    SqliteRecorder::open(&db_path)
      .await
      .with_context(|| format!("failed to open run database: {}", db_path.display()))?,
  );

  let executor = Executor::new(registry(), recorder.clone(), config);
  Ok((Arc::new(executor), recorder))
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = read_workflow(workflow_file)?;
  let registry = registry();
  let validator = Validator::new(registry.as_ref());

  let mut content_valid = false;
  for (label, graph) in [("content", &workflow.content), ("draft", &workflow.draft)] {
    let Some(graph) = graph else {
      eprintln!("{label}: none");
      continue;
    };
    let report = validator.validate(graph);
    if report.is_valid() {
      eprintln!("{label}: valid");
    } else {
      eprintln!("{label}: {} violation(s)", report.violations().len());
      for violation in report.violations() {
        eprintln!("  - {violation}");
      }
    }
    if label == "content" {
      content_valid = report.is_valid();
    }
  }

  if !content_valid {
    bail!("workflow '{}' has no valid content", workflow.id);
  }
  Ok(())
}

async fn run_once(workflow_file: PathBuf, data_dir: PathBuf, overrides: Overrides) -> Result<()> {
  let workflow = read_workflow(&workflow_file)?;
  let (executor, recorder) = open_executor(&data_dir, &overrides).await?;

  let cancel = CancellationToken::new();
  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      ctrl_c.cancel();
    }
  });

  let report = executor
    .run(&workflow, TriggerReason::Manual, cancel)
    .await
    .context("workflow run failed to start")?;
  let timeline = recorder.timeline(&report.run_id).await?;

  let output = serde_json::json!({
    "report": report,
    "timeline": timeline,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);

  if report.status != RunStatus::Succeeded {
    bail!("run {} ended {}", report.run_id, report.status);
  }
  Ok(())
}

async fn serve(workflows_dir: PathBuf, data_dir: PathBuf, overrides: Overrides) -> Result<()> {
  let mut workflows = Vec::new();
  let entries = std::fs::read_dir(&workflows_dir)
    .with_context(|| format!("failed to read directory: {}", workflows_dir.display()))?;
  for entry in entries {
    let path = entry?.path();
    if path.extension().is_some_and(|ext| ext == "json") {
      let workflow = read_workflow(&path)?;
      info!(
        workflow_id = %workflow.id,
        scheduled = workflow.is_auto_scheduled(),
        "workflow_loaded"
      );
      workflows.push(workflow);
    }
  }

  let (executor, _recorder) = open_executor(&data_dir, &overrides).await?;
  let store: MemoryWorkflowStore = workflows.into_iter().collect();
  let scheduler = Arc::new(Scheduler::new(executor, Arc::new(store)));

  let stopper = scheduler.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupt received, stopping scheduler");
      stopper.shutdown();
    }
  });

  scheduler.run().await?;

  // Runs were cancelled by the shutdown; let them record their outcome.
  let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
  while !scheduler.in_flight().is_empty() && tokio::time::Instant::now() < deadline {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
  }
  Ok(())
}
