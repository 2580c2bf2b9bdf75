//! Certloom Store
//!
//! Persistence for workflow records and run history.
//!
//! The [`Recorder`] trait is the append-only run log the executor writes to:
//! - Creating a run and moving it to running
//! - Appending every node transition, durably, before dependents execute
//! - Finalizing the run exactly once
//! - Reading back runs and their per-node timelines
//!
//! The [`WorkflowStore`] trait holds workflow records.

mod memory;
mod sqlite;
mod types;
mod workflows;

pub use memory::MemoryRecorder;
pub use sqlite::SqliteRecorder;
pub use types::{
  IssuedCertificate, NodeEntry, NodeEvent, NodeStatus, ProviderIdentifier, RunArtifacts,
  RunOutcome, RunRecord, RunStatus, TriggerReason,
};
pub use workflows::MemoryWorkflowStore;

use async_trait::async_trait;
use certloom_config::WorkflowDef;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// The run already reached a terminal state.
  #[error("run {0} is already finalized")]
  AlreadyFinalized(String),

  /// Runs can only be finalized with a terminal status.
  #[error("{0} is not a terminal run status")]
  NotTerminal(RunStatus),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Append-only record of runs and their node transitions.
///
/// Implementations must accept concurrent appends to the same run.
#[async_trait]
pub trait Recorder: Send + Sync {
  /// Store a new run.
  async fn create_run(&self, run: &RunRecord) -> Result<(), StoreError>;

  /// Move a pending run to running.
  async fn mark_running(&self, run_id: &str) -> Result<(), StoreError>;

  /// Append a node transition. Durable once this returns.
  async fn append(&self, run_id: &str, entry: NodeEntry) -> Result<NodeEvent, StoreError>;

  /// Close a run. Fails if the run is already terminal.
  async fn finalize(&self, run_id: &str, outcome: RunOutcome) -> Result<(), StoreError>;

  /// Get a run by ID.
  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError>;

  /// Every node transition of a run, in recording order.
  async fn timeline(&self, run_id: &str) -> Result<Vec<NodeEvent>, StoreError>;

  /// Runs of a workflow, newest first.
  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError>;

  /// The most recent run of a workflow.
  async fn latest_run(&self, workflow_id: &str) -> Result<Option<RunRecord>, StoreError> {
    Ok(self.list_runs(workflow_id).await?.into_iter().next())
  }
}

/// Storage for workflow records.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
  async fn get(&self, workflow_id: &str) -> Result<WorkflowDef, StoreError>;

  async fn list(&self) -> Result<Vec<WorkflowDef>, StoreError>;

  /// Insert or replace a workflow record.
  async fn save(&self, workflow: &WorkflowDef) -> Result<(), StoreError>;
}
