use std::collections::HashSet;

use certloom_config::{NodeConfig, NodeKind, TriggerKind, ValueSelector, WorkflowNode};
use tracing::debug;

use crate::catalog::ProviderCatalog;
use crate::error::{ValidationReport, Violation};
use crate::graph::{Graph, GraphNode, NodeIndex};

/// A graph that passed every check, with each node's configuration parsed.
///
/// Only obtainable through [`Validator::check`], so holding one is proof the
/// graph was valid against the catalog it was checked with.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
  graph: Graph,
  configs: Vec<NodeConfig>,
}

impl ValidatedGraph {
  pub fn graph(&self) -> &Graph {
    &self.graph
  }

  pub fn config(&self, index: NodeIndex) -> &NodeConfig {
    &self.configs[index]
  }

  pub fn node(&self, index: NodeIndex) -> &GraphNode {
    self.graph.node(index)
  }

  /// The start node.
  pub fn start(&self) -> NodeIndex {
    self.graph.root()
  }
}

/// Structural and semantic checker for workflow graphs.
///
/// Validation is exhaustive: every violation is collected rather than
/// stopping at the first.
pub struct Validator<'a> {
  catalog: &'a dyn ProviderCatalog,
}

impl<'a> Validator<'a> {
  pub fn new(catalog: &'a dyn ProviderCatalog) -> Self {
    Self { catalog }
  }

  /// Collect every violation in the graph rooted at `root`.
  pub fn validate(&self, root: &WorkflowNode) -> ValidationReport {
    self.inspect(root).2
  }

  /// Validate and, if the graph is valid, return its runnable form.
  pub fn check(&self, root: &WorkflowNode) -> Result<ValidatedGraph, ValidationReport> {
    let (graph, configs, report) = self.inspect(root);
    if !report.is_valid() {
      return Err(report);
    }
    // Every node parsed: type and config failures are violations.
    let configs = configs.into_iter().flatten().collect::<Vec<_>>();
    Ok(ValidatedGraph { graph, configs })
  }

  fn inspect(&self, root: &WorkflowNode) -> (Graph, Vec<Option<NodeConfig>>, ValidationReport) {
    let graph = Graph::from_tree(root);
    let mut violations = Vec::new();

    check_structure(&graph, &mut violations);
    let configs = check_types(&graph, &mut violations);
    check_ports(&graph, &configs, &mut violations);
    self.check_providers(&graph, &configs, &mut violations);

    debug!(
      root = %root.id,
      nodes = graph.len(),
      violations = violations.len(),
      "graph_validated"
    );
    (graph, configs, ValidationReport::new(violations))
  }

  fn check_providers(
    &self,
    graph: &Graph,
    configs: &[Option<NodeConfig>],
    out: &mut Vec<Violation>,
  ) {
    for (index, node) in graph.nodes() {
      let Some(action) = configs[index].as_ref().and_then(NodeConfig::action) else {
        continue;
      };
      let provider = action.provider_type.trim();
      if provider.is_empty() {
        out.push(Violation::MissingProvider {
          node_id: node.id.clone(),
          kind: node.kind,
        });
      } else if !self.catalog.contains(node.kind, provider) {
        out.push(Violation::UnknownProvider {
          node_id: node.id.clone(),
          kind: node.kind,
          provider: provider.to_string(),
        });
      }
    }
  }
}

fn check_structure(graph: &Graph, out: &mut Vec<Violation>) {
  let root = graph.node(graph.root());
  if root.kind != NodeKind::Start {
    out.push(Violation::RootNotStart {
      node_id: root.id.clone(),
      kind: root.kind,
    });
  }

  let mut seen = HashSet::new();
  let mut reported = HashSet::new();
  for (index, node) in graph.nodes() {
    if node.kind == NodeKind::Start && index != graph.root() {
      out.push(Violation::MisplacedStart {
        node_id: node.id.clone(),
      });
    }
    if !seen.insert(node.id.as_str()) && reported.insert(node.id.as_str()) {
      out.push(Violation::DuplicateId {
        node_id: node.id.clone(),
      });
    }
    if node.next.is_some() && !node.branches.is_empty() {
      out.push(Violation::NextAndBranches {
        node_id: node.id.clone(),
      });
    }
    if node.kind == NodeKind::End && node.next.is_some() {
      out.push(Violation::EndHasSuccessor {
        node_id: node.id.clone(),
      });
    }
  }

  // Sub-chains end at their branch node's join; only the root chain must
  // finish at an end node or a graph-ending branch.
  if let Some(last) = graph.chain(graph.root()).last() {
    let last = graph.node(last);
    if !matches!(last.kind, NodeKind::End | NodeKind::Branch) {
      out.push(Violation::Unterminated {
        node_id: last.id.clone(),
      });
    }
  }
}

fn check_types(graph: &Graph, out: &mut Vec<Violation>) -> Vec<Option<NodeConfig>> {
  graph
    .nodes()
    .map(|(_, node)| {
      let node_id = node.id.clone();
      match node.kind {
        NodeKind::Unknown => {
          out.push(Violation::UnknownType { node_id });
          return None;
        }
        NodeKind::Branch if node.branches.len() < 2 => {
          out.push(Violation::TooFewBranches {
            node_id: node_id.clone(),
            count: node.branches.len(),
          });
        }
        NodeKind::Branch => {}
        NodeKind::Condition if !node.branches.is_empty() => {
          out.push(Violation::ConditionHasBranches {
            node_id: node_id.clone(),
          });
        }
        kind if !node.branches.is_empty() => {
          out.push(Violation::BranchesOnNonBranch {
            node_id: node_id.clone(),
            kind,
          });
        }
        _ => {}
      }

      let config = match NodeConfig::parse(node.kind, &node.config) {
        Ok(config) => config,
        Err(e) => {
          out.push(Violation::InvalidConfig {
            node_id,
            message: e.to_string(),
          });
          return None;
        }
      };

      match &config {
        NodeConfig::Condition(condition) if condition.expression.is_none() => {
          out.push(Violation::MissingPredicate { node_id });
        }
        NodeConfig::Start(start)
          if start.trigger == TriggerKind::Auto
            && start.trigger_cron.as_deref().is_none_or(|c| c.trim().is_empty()) =>
        {
          out.push(Violation::MissingCron { node_id });
        }
        NodeConfig::Apply { params, .. } if params.domains.is_empty() => {
          out.push(Violation::MissingDomains { node_id });
        }
        _ => {}
      }
      Some(config)
    })
    .collect()
}

fn check_ports(graph: &Graph, configs: &[Option<NodeConfig>], out: &mut Vec<Violation>) {
  for (index, node) in graph.nodes() {
    for port in &node.inputs {
      if let Some(selector) = &port.value_selector
        && !selector.is_empty()
      {
        check_selector(graph, index, &port.name, selector, out);
      } else if port.required && port.literal().is_none() {
        out.push(Violation::MissingInput {
          node_id: node.id.clone(),
          port: port.name.clone(),
        });
      }
    }

    if let Some(NodeConfig::Condition(condition)) = &configs[index]
      && let Some(expression) = &condition.expression
    {
      for selector in expression.selectors() {
        check_selector(graph, index, "expression", selector, out);
      }
    }
  }
}

fn check_selector(
  graph: &Graph,
  consumer: NodeIndex,
  port: &str,
  selector: &ValueSelector,
  out: &mut Vec<Violation>,
) {
  let node_id = graph.node(consumer).id.clone();
  let port = port.to_string();

  if !selector.is_well_formed() {
    out.push(Violation::MalformedSelector { node_id, port });
    return;
  }
  let Some(producer) = graph.get(&selector.id) else {
    out.push(Violation::UnknownProducer {
      node_id,
      port,
      producer: selector.id.clone(),
    });
    return;
  };
  if !graph.is_predecessor(producer, consumer) {
    out.push(Violation::NotAPredecessor {
      node_id,
      port,
      producer: selector.id.clone(),
    });
    return;
  }
  if !graph.node(producer).declares_output(&selector.name) {
    out.push(Violation::UndeclaredOutput {
      node_id,
      port,
      producer: selector.id.clone(),
      output: selector.name.clone(),
    });
  }
}
