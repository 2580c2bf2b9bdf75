use serde::{Deserialize, Serialize};

use crate::de::null_as_default;
use crate::enums::{NodeKind, ValueType};

/// One step of a workflow graph, in its persisted shape.
///
/// Nodes form a forward chain through `next`. A `branch` node fans out into
/// `branches` instead, each entry being the head of an independent sub-chain,
/// and ends the chain it sits on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  #[serde(rename = "type")]
  pub kind: NodeKind,
  #[serde(default, deserialize_with = "null_as_default")]
  pub config: serde_json::Map<String, serde_json::Value>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub inputs: Vec<NodeIo>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub outputs: Vec<NodeIo>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub next: Option<Box<WorkflowNode>>,
  #[serde(
    default,
    deserialize_with = "null_as_default",
    skip_serializing_if = "Vec::is_empty"
  )]
  pub branches: Vec<WorkflowNode>,
  /// Cached validator verdict for this node.
  #[serde(default)]
  pub validated: bool,
}

impl WorkflowNode {
  pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
    let id = id.into();
    Self {
      name: id.clone(),
      id,
      kind,
      config: serde_json::Map::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
      next: None,
      branches: Vec::new(),
      validated: false,
    }
  }

  pub fn with_config(mut self, config: serde_json::Value) -> Self {
    if let serde_json::Value::Object(map) = config {
      self.config = map;
    }
    self
  }

  pub fn with_input(mut self, input: NodeIo) -> Self {
    self.inputs.push(input);
    self
  }

  pub fn with_output(mut self, output: NodeIo) -> Self {
    self.outputs.push(output);
    self
  }

  pub fn with_next(mut self, next: WorkflowNode) -> Self {
    self.next = Some(Box::new(next));
    self
  }

  pub fn with_branches(mut self, branches: Vec<WorkflowNode>) -> Self {
    self.branches = branches;
    self
  }

  /// Visit this node and every node reachable from it, depth first.
  pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a WorkflowNode)) {
    let mut cursor = Some(self);
    while let Some(node) = cursor {
      f(node);
      for branch in &node.branches {
        branch.visit(f);
      }
      cursor = node.next.as_deref();
    }
  }

  /// Mutable counterpart of [`WorkflowNode::visit`].
  pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut WorkflowNode)) {
    let mut cursor = Some(self);
    while let Some(node) = cursor {
      f(node);
      for branch in &mut node.branches {
        branch.visit_mut(f);
      }
      cursor = node.next.as_deref_mut();
    }
  }

  /// Find a node by id anywhere below (and including) this one.
  pub fn find(&self, id: &str) -> Option<&WorkflowNode> {
    let mut found = None;
    self.visit(&mut |node| {
      if found.is_none() && node.id == id {
        found = Some(node);
      }
    });
    found
  }
}

/// A named, typed port on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIo {
  #[serde(default, deserialize_with = "null_as_default")]
  pub label: String,
  pub name: String,
  #[serde(rename = "type", default)]
  pub value_type: ValueType,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub value_selector: Option<ValueSelector>,
}

impl NodeIo {
  pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
    let name = name.into();
    Self {
      label: name.clone(),
      name,
      value_type,
      required: false,
      value: None,
      value_selector: None,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn with_value(mut self, value: serde_json::Value) -> Self {
    self.value = Some(value);
    self
  }

  pub fn with_selector(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
    self.value_selector = Some(ValueSelector::new(id, name));
    self
  }

  /// The selector, if one is present and non-empty. A non-empty selector
  /// takes precedence over a literal value.
  pub fn selector(&self) -> Option<&ValueSelector> {
    self.value_selector.as_ref().filter(|s| !s.is_empty())
  }

  /// The literal value, if one is present and non-empty.
  pub fn literal(&self) -> Option<&serde_json::Value> {
    self.value.as_ref().filter(|v| match v {
      serde_json::Value::Null => false,
      serde_json::Value::String(s) => !s.is_empty(),
      _ => true,
    })
  }
}

/// Reference from a node input to a named output of another node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueSelector {
  /// Producer node id.
  #[serde(default, deserialize_with = "null_as_default")]
  pub id: String,
  /// Output name on the producer.
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
}

impl ValueSelector {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.id.is_empty() && self.name.is_empty()
  }

  /// Both the producer id and the output name are present.
  pub fn is_well_formed(&self) -> bool {
    !self.id.is_empty() && !self.name.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_accepts_null_collections() {
    let node: WorkflowNode = serde_json::from_value(json!({
      "id": "start-1",
      "name": "Start",
      "type": "start",
      "config": null,
      "inputs": null,
      "outputs": null,
      "next": null,
      "branches": null,
      "validated": true
    }))
    .unwrap();

    assert_eq!(node.kind, NodeKind::Start);
    assert!(node.config.is_empty());
    assert!(node.branches.is_empty());
    assert!(node.next.is_none());
  }

  #[test]
  fn test_selector_precedence() {
    let port = NodeIo::new("certificate", ValueType::Certificate)
      .with_value(json!("literal"))
      .with_selector("apply-1", "certificate");
    assert_eq!(port.selector().map(|s| s.id.as_str()), Some("apply-1"));

    let port = NodeIo {
      value_selector: Some(ValueSelector::default()),
      ..NodeIo::new("domain", ValueType::String).with_value(json!("example.com"))
    };
    assert!(port.selector().is_none());
    assert_eq!(port.literal(), Some(&json!("example.com")));
  }

  #[test]
  fn test_visit_reaches_nested_branches() {
    let root = WorkflowNode::new("start", NodeKind::Start).with_next(
      WorkflowNode::new("fork", NodeKind::Branch)
        .with_branches(vec![
          WorkflowNode::new("c1", NodeKind::Condition)
            .with_next(WorkflowNode::new("n1", NodeKind::Notify)),
          WorkflowNode::new("c2", NodeKind::Condition),
        ])
        .with_next(WorkflowNode::new("end", NodeKind::End)),
    );

    let mut ids = Vec::new();
    root.visit(&mut |n| ids.push(n.id.clone()));
    assert_eq!(ids, vec!["start", "fork", "c1", "n1", "c2", "end"]);
    assert!(root.find("n1").is_some());
    assert!(root.find("missing").is_none());
  }
}
