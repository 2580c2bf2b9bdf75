use certloom_config::{NodeIo, NodeKind, TriggerKind, ValueType, WorkflowDef, WorkflowNode};
use certloom_workflow::lifecycle::{publish_draft, save_content, save_draft};
use certloom_workflow::{KnownProviders, LifecycleError, Validator, Violation};
use serde_json::json;

fn catalog() -> KnownProviders {
  KnownProviders::new()
    .with(NodeKind::Apply, "local")
    .with(NodeKind::Deploy, "local")
    .with(NodeKind::Notify, "webhook")
}

fn start() -> WorkflowNode {
  WorkflowNode::new("start", NodeKind::Start).with_config(json!({ "trigger": "manual" }))
}

fn apply(id: &str) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Apply)
    .with_config(json!({ "providerType": "local", "domains": "example.com" }))
    .with_output(NodeIo::new("certificate", ValueType::Certificate))
}

fn deploy(id: &str, producer: &str) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Deploy)
    .with_config(json!({ "providerType": "local" }))
    .with_input(
      NodeIo::new("certificate", ValueType::Certificate)
        .required()
        .with_selector(producer, "certificate"),
    )
}

fn notify(id: &str) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Notify).with_config(json!({
    "providerType": "webhook",
    "subject": "done",
    "message": "{{ status }}"
  }))
}

fn condition(id: &str, value: bool) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Condition).with_config(json!({
    "expression": { "type": "const", "value": value }
  }))
}

fn end() -> WorkflowNode {
  WorkflowNode::new("end", NodeKind::End)
}

fn linear() -> WorkflowNode {
  start().with_next(apply("apply").with_next(deploy("deploy", "apply").with_next(end())))
}

#[test]
fn test_linear_graph_is_valid() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let graph = validator.check(&linear()).unwrap();
  assert_eq!(graph.graph().len(), 4);
  assert_eq!(graph.node(graph.start()).kind, NodeKind::Start);
}

#[test]
fn test_branch_graph_is_valid() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let root = start().with_next(apply("apply").with_next(
    WorkflowNode::new("fork", NodeKind::Branch).with_branches(vec![
      condition("gate", false).with_next(notify("notify")),
      deploy("deploy", "apply"),
    ]),
  ));
  let report = validator.validate(&root);
  assert!(report.is_valid(), "{}", report);
}

#[test]
fn test_rejects_second_start() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let root = start().with_next(WorkflowNode::new("start-2", NodeKind::Start).with_next(end()));
  let report = validator.validate(&root);
  assert!(report.violations().contains(&Violation::MisplacedStart {
    node_id: "start-2".to_string()
  }));
}

#[test]
fn test_rejects_forward_selector() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let root =
    start().with_next(deploy("deploy", "apply").with_next(apply("apply").with_next(end())));
  let report = validator.validate(&root);
  assert_eq!(
    report.violations(),
    &[Violation::NotAPredecessor {
      node_id: "deploy".to_string(),
      port: "certificate".to_string(),
      producer: "apply".to_string(),
    }]
  );
}

#[test]
fn test_rejects_sibling_branch_selector() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let root = start().with_next(WorkflowNode::new("fork", NodeKind::Branch).with_branches(vec![
    apply("apply").with_next(end()),
    deploy("deploy", "apply"),
  ]));
  let report = validator.validate(&root);
  assert!(!report.is_valid());
  assert!(matches!(
    report.violations(),
    [Violation::NotAPredecessor { node_id, .. }] if node_id == "deploy"
  ));
}

#[test]
fn test_rejects_branch_with_single_entry() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let root = start().with_next(
    WorkflowNode::new("fork", NodeKind::Branch).with_branches(vec![notify("notify")]),
  );
  let report = validator.validate(&root);
  assert_eq!(
    report.violations(),
    &[Violation::TooFewBranches {
      node_id: "fork".to_string(),
      count: 1
    }]
  );
}

#[test]
fn test_collects_every_violation() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let mut bad_deploy = deploy("deploy", "apply");
  bad_deploy.inputs[0].value_selector = None;
  bad_deploy.config = json!({ "providerType": "ftp" }).as_object().cloned().unwrap();

  let root = start().with_next(
    apply("apply").with_next(
      bad_deploy.with_next(
        WorkflowNode::new("gate", NodeKind::Condition)
          .with_next(WorkflowNode::new("dup", NodeKind::Notify).with_next(
            WorkflowNode::new("dup", NodeKind::End)
              .with_next(WorkflowNode::new("x", NodeKind::Unknown)),
          )),
      ),
    ),
  );

  let report = validator.validate(&root);
  let violations = report.violations();
  assert!(violations.contains(&Violation::DuplicateId { node_id: "dup".into() }));
  assert!(violations.contains(&Violation::EndHasSuccessor { node_id: "dup".into() }));
  assert!(violations.contains(&Violation::Unterminated { node_id: "x".into() }));
  assert!(violations.contains(&Violation::UnknownType { node_id: "x".into() }));
  assert!(violations.contains(&Violation::MissingPredicate { node_id: "gate".into() }));
  assert!(violations.contains(&Violation::MissingInput {
    node_id: "deploy".into(),
    port: "certificate".into()
  }));
  assert!(violations.contains(&Violation::UnknownProvider {
    node_id: "deploy".into(),
    kind: NodeKind::Deploy,
    provider: "ftp".into()
  }));
  assert!(violations.contains(&Violation::MissingProvider {
    node_id: "dup".into(),
    kind: NodeKind::Notify
  }));
  assert!(!report.node_is_valid("deploy"));
  assert!(report.node_is_valid("apply"));
}

#[test]
fn test_condition_selectors_are_checked() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);

  let gate = WorkflowNode::new("gate", NodeKind::Condition).with_config(json!({
    "expression": {
      "type": "compare",
      "left": { "type": "var", "selector": { "id": "apply", "name": "expiresIn" } },
      "operator": "lt",
      "right": { "type": "const", "value": 30 }
    }
  }));
  let root = start().with_next(apply("apply").with_next(gate.with_next(end())));

  let report = validator.validate(&root);
  assert_eq!(
    report.violations(),
    &[Violation::UndeclaredOutput {
      node_id: "gate".into(),
      port: "expression".into(),
      producer: "apply".into(),
      output: "expiresIn".into(),
    }]
  );
}

#[test]
fn test_draft_lifecycle() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);
  let mut workflow = WorkflowDef::new("wf", "Renew");

  // An invalid draft is kept, with per-node verdicts cached.
  let broken = start().with_next(deploy("deploy", "missing").with_next(end()));
  let report = save_draft(&mut workflow, broken, &validator);
  assert!(!report.is_valid());
  assert!(workflow.has_draft);
  let draft = workflow.draft.as_ref().unwrap();
  assert!(draft.validated);
  assert!(!draft.find("deploy").unwrap().validated);

  assert!(matches!(
    publish_draft(&mut workflow, &validator),
    Err(LifecycleError::Invalid(_))
  ));
  assert!(workflow.content.is_none());

  let report = save_draft(&mut workflow, linear(), &validator);
  assert!(report.is_valid());
  assert!(workflow.has_draft);

  publish_draft(&mut workflow, &validator).unwrap();
  assert!(!workflow.has_draft);
  assert_eq!(workflow.trigger, TriggerKind::Manual);
  assert!(workflow.content.as_ref().unwrap().validated);
}

#[test]
fn test_save_content_rejects_invalid_graph() {
  let catalog = catalog();
  let validator = Validator::new(&catalog);
  let mut workflow = WorkflowDef::new("wf", "Renew");

  let err = save_content(&mut workflow, start(), &validator).unwrap_err();
  assert!(matches!(err, LifecycleError::Invalid(report) if !report.is_valid()));
  assert!(workflow.content.is_none());

  save_content(&mut workflow, linear(), &validator).unwrap();
  assert!(workflow.content.is_some());
}
