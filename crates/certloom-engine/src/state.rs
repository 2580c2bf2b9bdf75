//! Per-run mutable state shared by the sub-walks of one run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use certloom_capability::{NodeSummary, RunSummary};
use certloom_resolver::{OutputLookup, ProducerState};
use certloom_store::{NodeStatus, RunArtifacts, RunStatus};
use certloom_workflow::{NodeIndex, ValidatedGraph};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone)]
struct Slot {
  status: NodeStatus,
  output: Option<JsonMap>,
}

/// The first fatal node failure of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
  pub node_id: String,
  pub message: String,
}

pub(crate) struct RunState {
  pub workflow_id: String,
  pub run_id: String,
  pub graph: Arc<ValidatedGraph>,
  /// Child of the caller's token; also cancelled by the first fatal failure.
  pub token: CancellationToken,
  slots: Mutex<Vec<Slot>>,
  failure: Mutex<Option<Failure>>,
  artifacts: Mutex<RunArtifacts>,
  interrupted: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunState {
  pub fn new(
    workflow_id: String,
    run_id: String,
    graph: Arc<ValidatedGraph>,
    external: CancellationToken,
  ) -> Self {
    let slots = vec![
      Slot {
        status: NodeStatus::Pending,
        output: None,
      };
      graph.graph().len()
    ];
    Self {
      workflow_id,
      run_id,
      token: external.child_token(),
      graph,
      slots: Mutex::new(slots),
      failure: Mutex::new(None),
      artifacts: Mutex::new(RunArtifacts::default()),
      interrupted: AtomicBool::new(false),
    }
  }

  pub fn status(&self, index: NodeIndex) -> NodeStatus {
    lock(&self.slots)[index].status
  }

  pub fn set(&self, index: NodeIndex, status: NodeStatus, output: Option<JsonMap>) {
    let mut slots = lock(&self.slots);
    slots[index].status = status;
    if output.is_some() {
      slots[index].output = output;
    }
  }

  /// Record the first fatal failure and stop every other sub-walk.
  pub fn fail(&self, node_id: &str, message: String) {
    {
      let mut failure = lock(&self.failure);
      if failure.is_none() {
        *failure = Some(Failure {
          node_id: node_id.to_string(),
          message,
        });
      }
    }
    self.token.cancel();
  }

  pub fn failure(&self) -> Option<Failure> {
    lock(&self.failure).clone()
  }

  /// Note that a node was stopped by cancellation.
  pub fn interrupt(&self) {
    self.interrupted.store(true, Ordering::SeqCst);
  }

  pub fn was_interrupted(&self) -> bool {
    self.interrupted.load(Ordering::SeqCst)
  }

  pub fn artifacts(&self) -> MutexGuard<'_, RunArtifacts> {
    lock(&self.artifacts)
  }

  pub fn take_artifacts(&self) -> RunArtifacts {
    std::mem::take(&mut *lock(&self.artifacts))
  }

  /// Nodes that never started, in graph order.
  pub fn pending(&self) -> Vec<NodeIndex> {
    lock(&self.slots)
      .iter()
      .enumerate()
      .filter(|(_, slot)| slot.status == NodeStatus::Pending)
      .map(|(index, _)| index)
      .collect()
  }

  pub fn node_statuses(&self) -> Vec<NodeStatus> {
    lock(&self.slots).iter().map(|slot| slot.status).collect()
  }

  /// The run as seen by a notifier at this point.
  pub fn summary(&self, subject: String, message: String) -> RunSummary {
    let failure = self.failure();
    let status = if failure.is_some() {
      RunStatus::Failed
    } else {
      RunStatus::Running
    };
    let nodes = self
      .graph
      .graph()
      .nodes()
      .zip(self.node_statuses())
      .map(|((_, node), status)| NodeSummary {
        id: node.id.clone(),
        name: node.name.clone(),
        status: status.to_string(),
      })
      .collect();
    RunSummary {
      workflow_id: self.workflow_id.clone(),
      run_id: self.run_id.clone(),
      status: status.to_string(),
      subject,
      message,
      nodes,
      error: failure.map(|f| f.message),
    }
  }
}

impl OutputLookup for RunState {
  fn producer(&self, node_id: &str) -> ProducerState {
    let Some(index) = self.graph.graph().get(node_id) else {
      return ProducerState::NotExecuted;
    };
    let slots = lock(&self.slots);
    let slot = &slots[index];
    match slot.status {
      NodeStatus::Succeeded => ProducerState::Succeeded(slot.output.clone().unwrap_or_default()),
      NodeStatus::Skipped => ProducerState::Skipped,
      NodeStatus::Failed => ProducerState::Failed,
      NodeStatus::Pending | NodeStatus::Running => ProducerState::NotExecuted,
    }
  }
}
