use std::fmt;

use certloom_config::NodeKind;
use thiserror::Error;

/// A single problem found while validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("graph must begin with a start node, found {kind} node {node_id}")]
  RootNotStart { node_id: String, kind: NodeKind },

  #[error("start node {node_id} is not at the head of the graph")]
  MisplacedStart { node_id: String },

  #[error("duplicate node id: {node_id}")]
  DuplicateId { node_id: String },

  #[error("node {node_id} sets both next and branches")]
  NextAndBranches { node_id: String },

  #[error("graph does not terminate: last node {node_id} is not an end or branch node")]
  Unterminated { node_id: String },

  #[error("end node {node_id} has a successor")]
  EndHasSuccessor { node_id: String },

  #[error("node {node_id} has an unrecognized type")]
  UnknownType { node_id: String },

  #[error("branch node {node_id} needs at least two branches, has {count}")]
  TooFewBranches { node_id: String, count: usize },

  #[error("condition node {node_id} has no predicate expression")]
  MissingPredicate { node_id: String },

  #[error("condition node {node_id} must not set branches")]
  ConditionHasBranches { node_id: String },

  #[error("{kind} node {node_id} must not set branches")]
  BranchesOnNonBranch { node_id: String, kind: NodeKind },

  #[error("node {node_id}: {message}")]
  InvalidConfig { node_id: String, message: String },

  #[error("start node {node_id} is triggered automatically but has no cron expression")]
  MissingCron { node_id: String },

  #[error("apply node {node_id} has no domains")]
  MissingDomains { node_id: String },

  #[error("required input {port} of node {node_id} has no value or selector")]
  MissingInput { node_id: String, port: String },

  #[error("selector on {port} of node {node_id} is malformed")]
  MalformedSelector { node_id: String, port: String },

  #[error("{port} of node {node_id} references unknown node {producer}")]
  UnknownProducer {
    node_id: String,
    port: String,
    producer: String,
  },

  #[error("{port} of node {node_id} references {producer}, which does not precede it on all paths")]
  NotAPredecessor {
    node_id: String,
    port: String,
    producer: String,
  },

  #[error("{port} of node {node_id} references output {output} not declared by {producer}")]
  UndeclaredOutput {
    node_id: String,
    port: String,
    producer: String,
    output: String,
  },

  #[error("{kind} node {node_id} has no providerType")]
  MissingProvider { node_id: String, kind: NodeKind },

  #[error("{kind} node {node_id} uses unregistered provider {provider}")]
  UnknownProvider {
    node_id: String,
    kind: NodeKind,
    provider: String,
  },
}

impl Violation {
  /// The node the violation is attributed to.
  pub fn node_id(&self) -> &str {
    match self {
      Violation::RootNotStart { node_id, .. }
      | Violation::MisplacedStart { node_id }
      | Violation::DuplicateId { node_id }
      | Violation::NextAndBranches { node_id }
      | Violation::Unterminated { node_id }
      | Violation::EndHasSuccessor { node_id }
      | Violation::UnknownType { node_id }
      | Violation::TooFewBranches { node_id, .. }
      | Violation::MissingPredicate { node_id }
      | Violation::ConditionHasBranches { node_id }
      | Violation::BranchesOnNonBranch { node_id, .. }
      | Violation::InvalidConfig { node_id, .. }
      | Violation::MissingCron { node_id }
      | Violation::MissingDomains { node_id }
      | Violation::MissingInput { node_id, .. }
      | Violation::MalformedSelector { node_id, .. }
      | Violation::UnknownProducer { node_id, .. }
      | Violation::NotAPredecessor { node_id, .. }
      | Violation::UndeclaredOutput { node_id, .. }
      | Violation::MissingProvider { node_id, .. }
      | Violation::UnknownProvider { node_id, .. } => node_id,
    }
  }
}

/// Every violation found in one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
  violations: Vec<Violation>,
}

impl ValidationReport {
  pub fn new(violations: Vec<Violation>) -> Self {
    Self { violations }
  }

  pub fn is_valid(&self) -> bool {
    self.violations.is_empty()
  }

  pub fn violations(&self) -> &[Violation] {
    &self.violations
  }

  pub fn into_violations(self) -> Vec<Violation> {
    self.violations
  }

  /// Whether no violation is attributed to the given node.
  pub fn node_is_valid(&self, node_id: &str) -> bool {
    !self
      .violations
      .iter()
      .any(|v| v.node_id() == node_id)
  }
}

impl fmt::Display for ValidationReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} validation error(s)", self.violations.len())?;
    for violation in &self.violations {
      write!(f, "; {}", violation)?;
    }
    Ok(())
  }
}

impl std::error::Error for ValidationReport {}

/// Errors from the draft/content save path.
#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("workflow {0} has no draft to publish")]
  NoDraft(String),

  #[error("graph is invalid: {0}")]
  Invalid(ValidationReport),
}
