use serde::{Deserialize, Serialize};

use crate::config::StartConfig;
use crate::de::null_as_default;
use crate::enums::{NodeKind, TriggerKind};
use crate::node::WorkflowNode;

/// A workflow record: metadata plus its published and draft graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDef {
  pub id: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub name: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub description: String,
  #[serde(default)]
  pub trigger: TriggerKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_cron: Option<String>,
  #[serde(default)]
  pub enabled: bool,
  /// The published graph. Only this graph is ever executed.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content: Option<WorkflowNode>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub draft: Option<WorkflowNode>,
  /// Materialized: recomputed whenever `draft` or `content` changes.
  #[serde(default)]
  pub has_draft: bool,
}

impl WorkflowDef {
  pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      description: String::new(),
      trigger: TriggerKind::Manual,
      trigger_cron: None,
      enabled: true,
      content: None,
      draft: None,
      has_draft: false,
    }
  }

  pub fn with_content(mut self, content: WorkflowNode) -> Self {
    self.set_content(content);
    self
  }

  /// Replace the published graph, taking trigger settings from its start node.
  pub fn set_content(&mut self, content: WorkflowNode) {
    self.content = Some(content);
    self.sync_trigger();
    self.refresh_has_draft();
  }

  /// Replace the draft graph and recompute `has_draft`.
  pub fn set_draft(&mut self, draft: WorkflowNode) {
    self.draft = Some(draft);
    self.refresh_has_draft();
  }

  /// Recompute `has_draft`. Cached validator verdicts do not count as edits.
  pub fn refresh_has_draft(&mut self) {
    self.has_draft = match (&self.draft, &self.content) {
      (None, _) => false,
      (Some(_), None) => true,
      (Some(draft), Some(content)) => !same_graph(draft, content),
    };
  }

  /// Move the draft into `content`. Returns false when there is no draft.
  ///
  /// Callers are responsible for validating the draft first.
  pub fn promote_draft(&mut self) -> bool {
    let Some(draft) = self.draft.clone() else {
      return false;
    };
    self.set_content(draft);
    true
  }

  /// Whether the scheduler should fire this workflow from its cron expression.
  pub fn is_auto_scheduled(&self) -> bool {
    self.enabled
      && self.trigger == TriggerKind::Auto
      && self
        .trigger_cron
        .as_deref()
        .is_some_and(|cron| !cron.trim().is_empty())
  }

  /// Copy the start node's trigger settings into the record.
  fn sync_trigger(&mut self) {
    let Some(content) = &self.content else {
      return;
    };
    if content.kind != NodeKind::Start {
      return;
    }
    let value = serde_json::Value::Object(content.config.clone());
    if let Ok(start) = serde_json::from_value::<StartConfig>(value) {
      self.trigger = start.trigger;
      self.trigger_cron = start.trigger_cron;
    }
  }
}

fn same_graph(a: &WorkflowNode, b: &WorkflowNode) -> bool {
  let mut a = a.clone();
  let mut b = b.clone();
  a.visit_mut(&mut |node| node.validated = false);
  b.visit_mut(&mut |node| node.validated = false);
  a == b
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn graph(apply_name: &str) -> WorkflowNode {
    WorkflowNode::new("start", NodeKind::Start)
      .with_config(json!({ "trigger": "auto", "triggerCron": "0 3 * * *" }))
      .with_next(
        WorkflowNode::new("apply", NodeKind::Apply)
          .with_config(json!({ "providerType": "local", "domains": apply_name }))
          .with_next(WorkflowNode::new("end", NodeKind::End)),
      )
  }

  #[test]
  fn test_has_draft_tracks_edits() {
    let mut workflow = WorkflowDef::new("wf", "Renew").with_content(graph("a.example.com"));
    assert!(!workflow.has_draft);

    workflow.set_draft(graph("b.example.com"));
    assert!(workflow.has_draft);

    workflow.set_draft(graph("a.example.com"));
    assert!(!workflow.has_draft);
  }

  #[test]
  fn test_validated_flag_is_not_an_edit() {
    let mut workflow = WorkflowDef::new("wf", "Renew").with_content(graph("a.example.com"));
    let mut draft = graph("a.example.com");
    draft.visit_mut(&mut |node| node.validated = true);
    workflow.set_draft(draft);
    assert!(!workflow.has_draft);
  }

  #[test]
  fn test_promote_draft_syncs_trigger() {
    let mut workflow = WorkflowDef::new("wf", "Renew");
    assert!(!workflow.promote_draft());

    workflow.set_draft(graph("a.example.com"));
    assert!(workflow.has_draft);
    assert!(workflow.promote_draft());
    assert!(!workflow.has_draft);
    assert_eq!(workflow.trigger, TriggerKind::Auto);
    assert_eq!(workflow.trigger_cron.as_deref(), Some("0 3 * * *"));
    assert!(workflow.is_auto_scheduled());

    workflow.enabled = false;
    assert!(!workflow.is_auto_scheduled());
  }

  #[test]
  fn test_deserialize_record() {
    let record: WorkflowDef = serde_json::from_value(json!({
      "id": "wf-1",
      "name": "Renew example.com",
      "description": null,
      "trigger": "manual",
      "enabled": true,
      "content": {
        "id": "start",
        "type": "start",
        "next": { "id": "end", "type": "end" }
      },
      "hasDraft": false
    }))
    .unwrap();

    assert_eq!(record.description, "");
    assert!(record.draft.is_none());
    let content = record.content.unwrap();
    assert_eq!(content.next.unwrap().kind, NodeKind::End);
  }
}
