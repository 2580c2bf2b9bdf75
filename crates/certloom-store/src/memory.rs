use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::Mutex;

use crate::{NodeEntry, NodeEvent, Recorder, RunOutcome, RunRecord, RunStatus, StoreError};

#[derive(Default)]
struct State {
  /// Runs in creation order.
  runs: Vec<RunRecord>,
  events: HashMap<String, Vec<NodeEvent>>,
}

impl State {
  fn run_mut(&mut self, run_id: &str) -> Result<&mut RunRecord, StoreError> {
    self
      .runs
      .iter_mut()
      .find(|r| r.run_id == run_id)
      .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
  }
}

/// In-process recorder.
#[derive(Default)]
pub struct MemoryRecorder {
  state: Mutex<State>,
}

impl MemoryRecorder {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Recorder for MemoryRecorder {
  async fn create_run(&self, run: &RunRecord) -> Result<(), StoreError> {
    let mut state = self.state.lock().await;
    state.runs.push(run.clone());
    state.events.insert(run.run_id.clone(), Vec::new());
    Ok(())
  }

  async fn mark_running(&self, run_id: &str) -> Result<(), StoreError> {
    let mut state = self.state.lock().await;
    let run = state.run_mut(run_id)?;
    if run.status.is_terminal() {
      return Err(StoreError::AlreadyFinalized(run_id.to_string()));
    }
    run.status = RunStatus::Running;
    Ok(())
  }

  async fn append(&self, run_id: &str, entry: NodeEntry) -> Result<NodeEvent, StoreError> {
    let mut state = self.state.lock().await;
    let events = state
      .events
      .get_mut(run_id)
      .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
    let event = NodeEvent {
      run_id: run_id.to_string(),
      seq: events.len() as i64 + 1,
      node_id: entry.node_id,
      status: entry.status,
      attempt: i64::from(entry.attempt),
      output: entry.output.map(Json),
      error: entry.error,
      recorded_at: Utc::now(),
    };
    events.push(event.clone());
    Ok(event)
  }

  async fn finalize(&self, run_id: &str, outcome: RunOutcome) -> Result<(), StoreError> {
    if !outcome.status.is_terminal() {
      return Err(StoreError::NotTerminal(outcome.status));
    }
    let mut state = self.state.lock().await;
    let run = state.run_mut(run_id)?;
    if run.status.is_terminal() {
      return Err(StoreError::AlreadyFinalized(run_id.to_string()));
    }
    run.status = outcome.status;
    run.error = outcome.error;
    run.error_node = outcome.error_node;
    run.artifacts = Json(outcome.artifacts);
    run.completed_at = Some(Utc::now());
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<RunRecord, StoreError> {
    let mut state = self.state.lock().await;
    state.run_mut(run_id).map(|r| r.clone())
  }

  async fn timeline(&self, run_id: &str) -> Result<Vec<NodeEvent>, StoreError> {
    let state = self.state.lock().await;
    state
      .events
      .get(run_id)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
  }

  async fn list_runs(&self, workflow_id: &str) -> Result<Vec<RunRecord>, StoreError> {
    let state = self.state.lock().await;
    let mut runs: Vec<RunRecord> = state
      .runs
      .iter()
      .rev()
      .filter(|r| r.workflow_id == workflow_id)
      .cloned()
      .collect();
    // Stable: equal start times keep newest-created first.
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(runs)
  }
}
