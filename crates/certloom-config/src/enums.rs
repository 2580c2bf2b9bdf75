use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a workflow node, serialized as the node's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  Start,
  End,
  Apply,
  Deploy,
  Notify,
  Branch,
  Condition,
  /// Any `type` string this build does not recognize. Kept so the validator
  /// can report it instead of failing deserialization of the whole graph.
  #[serde(other)]
  Unknown,
}

impl NodeKind {
  /// Whether nodes of this kind invoke an external capability.
  pub fn is_action(&self) -> bool {
    matches!(self, NodeKind::Apply | NodeKind::Deploy | NodeKind::Notify)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      NodeKind::Start => "start",
      NodeKind::End => "end",
      NodeKind::Apply => "apply",
      NodeKind::Deploy => "deploy",
      NodeKind::Notify => "notify",
      NodeKind::Branch => "branch",
      NodeKind::Condition => "condition",
      NodeKind::Unknown => "unknown",
    }
  }
}

impl fmt::Display for NodeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How runs of a workflow are started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
  /// Fired by the scheduler from `triggerCron`.
  Auto,
  /// Fired only by an explicit request.
  #[default]
  Manual,
}

impl fmt::Display for TriggerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TriggerKind::Auto => f.write_str("auto"),
      TriggerKind::Manual => f.write_str("manual"),
    }
  }
}

/// Scalar kind of a node port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
  #[default]
  String,
  Number,
  Boolean,
  Object,
  /// Certificate material produced by an apply node.
  Certificate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  #[default]
  Constant,
  Linear,
  Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
  Eq,
  Neq,
  Gt,
  Gte,
  Lt,
  Lte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
  And,
  Or,
}
