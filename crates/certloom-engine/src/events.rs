//! Execution events and notifiers for observability.
//!
//! The executor reports progress through an [`ExecutionNotifier`] handed to
//! it at construction, so consumers can persist, stream, or ignore events.

use certloom_store::RunStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  RunStarted {
    run_id: String,
    workflow_id: String,
  },

  /// An attempt of a node has started.
  NodeStarted {
    run_id: String,
    node_id: String,
    attempt: u32,
  },

  NodeSucceeded {
    run_id: String,
    node_id: String,
    output: serde_json::Value,
  },

  /// An attempt of a node has failed. Not final if the node retries.
  NodeFailed {
    run_id: String,
    node_id: String,
    attempt: u32,
    error: String,
  },

  NodeSkipped {
    run_id: String,
    node_id: String,
  },

  RunFinished {
    run_id: String,
    status: RunStatus,
    error: Option<String>,
  },
}

/// Receives execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Sends events to an unbounded channel.
///
/// The volume is a handful of events per node, so an unbounded channel never
/// makes the executor wait on a slow consumer.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }

  /// A notifier and the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // The receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
