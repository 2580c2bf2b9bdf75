use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Canceled,
}

impl RunStatus {
  /// Terminal states are absorbing.
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      RunStatus::Succeeded | RunStatus::Failed | RunStatus::Canceled
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      RunStatus::Pending => "pending",
      RunStatus::Running => "running",
      RunStatus::Succeeded => "succeeded",
      RunStatus::Failed => "failed",
      RunStatus::Canceled => "canceled",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

impl NodeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeStatus::Pending => "pending",
      NodeStatus::Running => "running",
      NodeStatus::Succeeded => "succeeded",
      NodeStatus::Failed => "failed",
      NodeStatus::Skipped => "skipped",
    }
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Why a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TriggerReason {
  Auto,
  Manual,
}

/// Certificate material issued during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCertificate {
  pub node_id: String,
  pub domains: Vec<String>,
  pub certificate: String,
  pub private_key: String,
}

/// An identifier a provider assigned during a run, e.g. an uploaded cert id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderIdentifier {
  pub node_id: String,
  pub provider: String,
  pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
  #[serde(default)]
  pub certificates: Vec<IssuedCertificate>,
  #[serde(default)]
  pub identifiers: Vec<ProviderIdentifier>,
}

impl RunArtifacts {
  pub fn is_empty(&self) -> bool {
    self.certificates.is_empty() && self.identifiers.is_empty()
  }
}

/// A run as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
  pub run_id: String,
  pub workflow_id: String,
  pub reason: TriggerReason,
  pub status: RunStatus,
  /// Snapshot of the content graph this run executed.
  pub graph: Json<serde_json::Value>,
  /// The first fatal error, if the run failed.
  pub error: Option<String>,
  pub error_node: Option<String>,
  pub artifacts: Json<RunArtifacts>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
  /// A new pending run.
  pub fn pending(
    run_id: impl Into<String>,
    workflow_id: impl Into<String>,
    reason: TriggerReason,
    graph: serde_json::Value,
  ) -> Self {
    Self {
      run_id: run_id.into(),
      workflow_id: workflow_id.into(),
      reason,
      status: RunStatus::Pending,
      graph: Json(graph),
      error: None,
      error_node: None,
      artifacts: Json(RunArtifacts::default()),
      started_at: Utc::now(),
      completed_at: None,
    }
  }
}

/// A node transition to append to a run's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
  pub node_id: String,
  pub status: NodeStatus,
  pub attempt: u32,
  pub output: Option<serde_json::Value>,
  pub error: Option<String>,
}

impl NodeEntry {
  pub fn new(node_id: impl Into<String>, status: NodeStatus) -> Self {
    Self {
      node_id: node_id.into(),
      status,
      attempt: 0,
      output: None,
      error: None,
    }
  }

  pub fn attempt(mut self, attempt: u32) -> Self {
    self.attempt = attempt;
    self
  }

  pub fn output(mut self, output: serde_json::Value) -> Self {
    self.output = Some(output);
    self
  }

  pub fn error(mut self, error: impl Into<String>) -> Self {
    self.error = Some(error.into());
    self
  }
}

/// One recorded node transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NodeEvent {
  pub run_id: String,
  /// Position in the run's timeline, starting at 1.
  pub seq: i64,
  pub node_id: String,
  pub status: NodeStatus,
  pub attempt: i64,
  pub output: Option<Json<serde_json::Value>>,
  pub error: Option<String>,
  pub recorded_at: DateTime<Utc>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
  pub status: RunStatus,
  pub error: Option<String>,
  pub error_node: Option<String>,
  pub artifacts: RunArtifacts,
}

impl RunOutcome {
  pub fn new(status: RunStatus) -> Self {
    Self {
      status,
      error: None,
      error_node: None,
      artifacts: RunArtifacts::default(),
    }
  }
}
