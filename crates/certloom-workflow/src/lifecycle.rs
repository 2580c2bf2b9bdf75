//! The save path for workflow graphs.
//!
//! A draft may be saved in any state; content must always be valid.

use certloom_config::{WorkflowDef, WorkflowNode};
use tracing::info;

use crate::error::{LifecycleError, ValidationReport};
use crate::validator::Validator;

/// Store a new draft. Invalid drafts are kept; the returned report says
/// what is wrong with them and each node's `validated` flag caches its verdict.
pub fn save_draft(
  workflow: &mut WorkflowDef,
  mut draft: WorkflowNode,
  validator: &Validator<'_>,
) -> ValidationReport {
  let report = validator.validate(&draft);
  mark_validated(&mut draft, &report);
  workflow.set_draft(draft);
  info!(
    workflow_id = %workflow.id,
    valid = report.is_valid(),
    has_draft = workflow.has_draft,
    "draft_saved"
  );
  report
}

/// Publish the current draft as content. Rejected if the draft is invalid.
pub fn publish_draft(
  workflow: &mut WorkflowDef,
  validator: &Validator<'_>,
) -> Result<(), LifecycleError> {
  let Some(draft) = workflow.draft.as_mut() else {
    return Err(LifecycleError::NoDraft(workflow.id.clone()));
  };
  let report = validator.validate(draft);
  if !report.is_valid() {
    return Err(LifecycleError::Invalid(report));
  }
  mark_validated(draft, &report);
  workflow.promote_draft();
  info!(workflow_id = %workflow.id, "draft_published");
  Ok(())
}

/// Replace content directly. Rejected if the graph is invalid.
pub fn save_content(
  workflow: &mut WorkflowDef,
  mut content: WorkflowNode,
  validator: &Validator<'_>,
) -> Result<(), LifecycleError> {
  let report = validator.validate(&content);
  if !report.is_valid() {
    return Err(LifecycleError::Invalid(report));
  }
  mark_validated(&mut content, &report);
  workflow.set_content(content);
  info!(workflow_id = %workflow.id, "content_saved");
  Ok(())
}

fn mark_validated(root: &mut WorkflowNode, report: &ValidationReport) {
  root.visit_mut(&mut |node| node.validated = report.node_is_valid(&node.id));
}
