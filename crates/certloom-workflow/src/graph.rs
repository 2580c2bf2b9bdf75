use std::collections::HashMap;

use certloom_config::{NodeIo, NodeKind, WorkflowNode};

/// Position of a node in the [`Graph`] arena.
pub type NodeIndex = usize;

/// A node of the arena with its links made explicit.
#[derive(Debug, Clone)]
pub struct GraphNode {
  pub id: String,
  pub name: String,
  pub kind: NodeKind,
  pub config: serde_json::Map<String, serde_json::Value>,
  pub inputs: Vec<NodeIo>,
  pub outputs: Vec<NodeIo>,
  /// Successor in the same chain.
  pub next: Option<NodeIndex>,
  /// Heads of the sub-chains of a branch node.
  pub branches: Vec<NodeIndex>,
  /// Predecessor in the same chain; `None` for a chain head.
  pub prev: Option<NodeIndex>,
  /// The branch node owning the chain this node belongs to; `None` on the root chain.
  pub parent: Option<NodeIndex>,
}

impl GraphNode {
  pub fn declares_output(&self, name: &str) -> bool {
    self.outputs.iter().any(|o| o.name == name)
  }
}

/// Flat node table built from the nested persisted tree.
///
/// Nodes are stored in pre-order, so every `next` and branch head index is
/// strictly greater than the index of the node linking to it.
#[derive(Debug, Clone)]
pub struct Graph {
  nodes: Vec<GraphNode>,
  /// First occurrence of every id.
  by_id: HashMap<String, NodeIndex>,
}

impl Graph {
  pub fn from_tree(root: &WorkflowNode) -> Self {
    let mut graph = Self {
      nodes: Vec::new(),
      by_id: HashMap::new(),
    };
    graph.push_chain(root, None);
    graph
  }

  /// Append a chain starting at `head`, returning the head's index.
  fn push_chain(&mut self, head: &WorkflowNode, parent: Option<NodeIndex>) -> NodeIndex {
    let mut cursor = Some(head);
    let mut prev: Option<NodeIndex> = None;
    let mut first = None;

    while let Some(node) = cursor {
      let index = self.nodes.len();
      self.nodes.push(GraphNode {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind,
        config: node.config.clone(),
        inputs: node.inputs.clone(),
        outputs: node.outputs.clone(),
        next: None,
        branches: Vec::new(),
        prev,
        parent,
      });
      self.by_id.entry(node.id.clone()).or_insert(index);

      if let Some(p) = prev {
        self.nodes[p].next = Some(index);
      }
      first.get_or_insert(index);

      let heads: Vec<NodeIndex> = node
        .branches
        .iter()
        .map(|branch| self.push_chain(branch, Some(index)))
        .collect();
      self.nodes[index].branches = heads;

      prev = Some(index);
      cursor = node.next.as_deref();
    }

    first.unwrap_or_default()
  }

  pub fn root(&self) -> NodeIndex {
    0
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, index: NodeIndex) -> &GraphNode {
    &self.nodes[index]
  }

  pub fn get(&self, id: &str) -> Option<NodeIndex> {
    self.by_id.get(id).copied()
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode)> {
    self.nodes.iter().enumerate()
  }

  /// The chain starting at `head`, following `next` links.
  pub fn chain(&self, head: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
    std::iter::successors(Some(head), move |&i| self.nodes[i].next)
  }

  /// Every node `index` itself links to, directly or through branches.
  pub fn descendants(&self, index: NodeIndex) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeIndex> = self.nodes[index].branches.clone();
    stack.extend(self.nodes[index].next);
    while let Some(i) = stack.pop() {
      out.push(i);
      stack.extend(self.nodes[i].branches.iter().copied());
      stack.extend(self.nodes[i].next);
    }
    out.sort_unstable();
    out
  }

  /// Nodes that have completed on every path reaching `index`: earlier nodes
  /// of its own chain, then the owning branch node and its predecessors.
  ///
  /// Nodes inside sibling sub-chains are never predecessors.
  pub fn predecessors(&self, index: NodeIndex) -> Vec<NodeIndex> {
    let mut out = Vec::new();
    let mut cursor = index;
    loop {
      let node = &self.nodes[cursor];
      match node.prev.or(node.parent) {
        Some(p) => {
          out.push(p);
          cursor = p;
        }
        None => break,
      }
    }
    out
  }

  pub fn is_predecessor(&self, producer: NodeIndex, consumer: NodeIndex) -> bool {
    producer < consumer && self.predecessors(consumer).contains(&producer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(graph: &Graph, indexes: &[NodeIndex]) -> Vec<String> {
    indexes.iter().map(|&i| graph.node(i).id.clone()).collect()
  }

  // start -> fork{ [c1 -> n1], [d1] } -> end
  fn forked() -> Graph {
    let root = WorkflowNode::new("start", NodeKind::Start).with_next(
      WorkflowNode::new("fork", NodeKind::Branch)
        .with_branches(vec![
          WorkflowNode::new("c1", NodeKind::Condition)
            .with_next(WorkflowNode::new("n1", NodeKind::Notify)),
          WorkflowNode::new("d1", NodeKind::Deploy),
        ])
        .with_next(WorkflowNode::new("end", NodeKind::End)),
    );
    Graph::from_tree(&root)
  }

  #[test]
  fn test_arena_links() {
    let graph = forked();
    assert_eq!(graph.len(), 6);

    let fork = graph.get("fork").unwrap();
    assert_eq!(ids(&graph, &graph.node(fork).branches), vec!["c1", "d1"]);
    assert_eq!(graph.node(fork).next, graph.get("end"));

    let n1 = graph.get("n1").unwrap();
    assert_eq!(graph.node(n1).prev, graph.get("c1"));
    assert_eq!(graph.node(n1).parent, Some(fork));

    let chain: Vec<NodeIndex> = graph.chain(graph.root()).collect();
    assert_eq!(ids(&graph, &chain), vec!["start", "fork", "end"]);
  }

  #[test]
  fn test_predecessors_exclude_sibling_branches() {
    let graph = forked();

    let n1 = graph.get("n1").unwrap();
    assert_eq!(ids(&graph, &graph.predecessors(n1)), vec!["c1", "fork", "start"]);

    let d1 = graph.get("d1").unwrap();
    assert!(!graph.is_predecessor(graph.get("c1").unwrap(), d1));

    let end = graph.get("end").unwrap();
    assert_eq!(ids(&graph, &graph.predecessors(end)), vec!["fork", "start"]);
    assert!(!graph.is_predecessor(n1, end));
  }

  #[test]
  fn test_descendants() {
    let graph = forked();
    let fork = graph.get("fork").unwrap();
    assert_eq!(
      ids(&graph, &graph.descendants(fork)),
      vec!["c1", "n1", "d1", "end"]
    );
  }
}
