use std::collections::HashMap;

/// What the current run knows about a producer node.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerState {
  NotExecuted,
  Skipped,
  Failed,
  Succeeded(serde_json::Map<String, serde_json::Value>),
}

/// Read access to the outputs recorded so far in a run.
pub trait OutputLookup {
  fn producer(&self, node_id: &str) -> ProducerState;
}

impl OutputLookup for HashMap<String, ProducerState> {
  fn producer(&self, node_id: &str) -> ProducerState {
    self
      .get(node_id)
      .cloned()
      .unwrap_or(ProducerState::NotExecuted)
  }
}
