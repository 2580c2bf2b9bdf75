//! Engine errors.

use std::path::PathBuf;

use certloom_capability::{CapabilityError, RegistryError};
use certloom_resolver::ResolveError;
use certloom_store::StoreError;
use certloom_workflow::ValidationReport;

/// Errors that can occur while executing a run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// The workflow has never been published.
  #[error("workflow '{0}' has no published content")]
  NoContent(String),

  /// The content graph failed validation at run start.
  #[error("invalid workflow graph: {0}")]
  Validation(ValidationReport),

  /// A required input has nothing bound to it; the graph changed after it
  /// was validated.
  #[error("node '{node_id}' has an unbound input")]
  UnboundInput {
    node_id: String,
    #[source]
    source: ResolveError,
  },

  /// An input could not be filled from upstream outputs.
  #[error("failed to resolve inputs for node '{node_id}'")]
  Resolution {
    node_id: String,
    #[source]
    source: ResolveError,
  },

  #[error("no provider for node '{node_id}'")]
  UnknownProvider {
    node_id: String,
    #[source]
    source: RegistryError,
  },

  /// A deploy node ran without certificate material.
  #[error("node '{node_id}' has no certificate input")]
  MissingCertificate { node_id: String },

  /// A capability call failed.
  #[error("{provider} {operation} failed for node '{node_id}': {source}")]
  Provider {
    node_id: String,
    provider: String,
    operation: &'static str,
    #[source]
    source: CapabilityError,
  },

  #[error("node '{node_id}' timed out after {timeout_ms}ms")]
  Timeout { node_id: String, timeout_ms: u64 },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Canceled,

  #[error("recorder error: {0}")]
  Store(#[from] StoreError),
}

impl ExecutionError {
  /// Failures a node's retry policy applies to.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ExecutionError::Provider { .. } | ExecutionError::Timeout { .. }
    )
  }

  /// Failures that end the run even on a `continueOnError` node.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      ExecutionError::Validation(_)
        | ExecutionError::UnboundInput { .. }
        | ExecutionError::Store(_)
    )
  }

  /// The error and its sources, joined for recording.
  pub fn chain(&self) -> String {
    let mut message = self.to_string();
    let mut source = std::error::Error::source(self);
    while let Some(e) = source {
      let text = e.to_string();
      if !message.contains(&text) {
        message.push_str(": ");
        message.push_str(&text);
      }
      source = e.source();
    }
    message
  }
}

/// Errors returned to callers of the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
  /// A run for the workflow is already in flight. Distinct from a failed run.
  #[error("workflow '{workflow_id}' already has run '{run_id}' in flight")]
  Conflict { workflow_id: String, run_id: String },

  #[error("workflow '{0}' not found")]
  WorkflowNotFound(String),

  #[error("run '{0}' is not in flight")]
  RunNotFound(String),

  #[error("invalid cron expression '{expression}': {message}")]
  InvalidCron { expression: String, message: String },

  #[error(transparent)]
  Execution(#[from] ExecutionError),

  #[error("store error: {0}")]
  Store(#[from] StoreError),

  /// The task driving a run panicked or was aborted.
  #[error("run task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}
