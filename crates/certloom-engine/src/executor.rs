//! The run state machine.
//!
//! A run walks the validated graph from the start node along `next` links.
//! Branch nodes fan out into their sub-chains concurrently, bounded by
//! `max_parallelism`, and complete once every sub-chain has finished. The
//! first fatal failure cancels the run token, which stops sibling sub-walks
//! and interrupts in-flight capability calls.

use std::sync::Arc;
use std::time::Duration;

use certloom_capability::{
  Capability, CapabilityRegistry, CertificateBundle, DomainParams, InvokeContext,
};
use certloom_config::{ActionConfig, ApplyParams, NodeConfig, NotifyParams, WorkflowDef};
use certloom_resolver::{evaluate, render, resolve_inputs};
use certloom_store::{
  IssuedCertificate, NodeEntry, NodeStatus, ProviderIdentifier, Recorder, RunArtifacts,
  RunOutcome, RunRecord, RunStatus, TriggerReason,
};
use certloom_workflow::{Graph, NodeIndex, ValidatedGraph, ValidationReport, Validator};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::ExecutionError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::state::{Failure, RunState};

type JsonMap = serde_json::Map<String, Value>;

/// Whether the walk of a chain continues past a node.
enum Flow {
  Continue,
  Halt,
}

/// A run that has been recorded as pending and is ready to execute.
pub struct PreparedRun {
  run_id: String,
  workflow_id: String,
  graph: Result<Arc<ValidatedGraph>, Rejected>,
}

impl PreparedRun {
  pub fn run_id(&self) -> &str {
    &self.run_id
  }
}

/// Content that failed validation. The flattened graph still names every
/// node so the run can report them.
struct Rejected {
  report: ValidationReport,
  graph: Graph,
}

/// Final state of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
  pub id: String,
  pub name: String,
  pub kind: String,
  pub status: NodeStatus,
}

/// Outcome of a run, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
  pub run_id: String,
  pub workflow_id: String,
  pub status: RunStatus,
  /// First fatal failure, if the run failed.
  pub failure: Option<Failure>,
  pub nodes: Vec<NodeReport>,
  pub artifacts: RunArtifacts,
}

impl RunReport {
  pub fn node(&self, node_id: &str) -> Option<&NodeReport> {
    self.nodes.iter().find(|n| n.id == node_id)
  }

  pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
    self.node(node_id).map(|n| n.status)
  }
}

/// Executes workflow runs against a capability registry and a recorder.
pub struct Executor {
  registry: Arc<CapabilityRegistry>,
  recorder: Arc<dyn Recorder>,
  notifier: Arc<dyn ExecutionNotifier>,
  config: EngineConfig,
}

impl Executor {
  pub fn new(
    registry: Arc<CapabilityRegistry>,
    recorder: Arc<dyn Recorder>,
    config: EngineConfig,
  ) -> Self {
    Self {
      registry,
      recorder,
      notifier: Arc::new(NoopNotifier),
      config,
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn recorder(&self) -> &Arc<dyn Recorder> {
    &self.recorder
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Snapshot and validate the workflow's content and record a pending run.
  ///
  /// An invalid graph still yields a run; it fails as soon as it executes.
  pub async fn prepare(
    &self,
    workflow: &WorkflowDef,
    reason: TriggerReason,
  ) -> Result<PreparedRun, ExecutionError> {
    self
      .prepare_with_id(workflow, reason, uuid::Uuid::new_v4().to_string())
      .await
  }

  /// Like [`Executor::prepare`], under a run id chosen by the caller.
  pub async fn prepare_with_id(
    &self,
    workflow: &WorkflowDef,
    reason: TriggerReason,
    run_id: String,
  ) -> Result<PreparedRun, ExecutionError> {
    let content = workflow
      .content
      .as_ref()
      .ok_or_else(|| ExecutionError::NoContent(workflow.id.clone()))?;

    let graph = Validator::new(self.registry.as_ref())
      .check(content)
      .map(Arc::new)
      .map_err(|report| Rejected {
        report,
        graph: Graph::from_tree(content),
      });
    let snapshot = serde_json::to_value(content).unwrap_or(Value::Null);

    self
      .recorder
      .create_run(&RunRecord::pending(&run_id, &workflow.id, reason, snapshot))
      .await?;

    Ok(PreparedRun {
      run_id,
      workflow_id: workflow.id.clone(),
      graph,
    })
  }

  /// Prepare and execute in one step.
  pub async fn run(
    &self,
    workflow: &WorkflowDef,
    reason: TriggerReason,
    cancel: CancellationToken,
  ) -> Result<RunReport, ExecutionError> {
    let prepared = self.prepare(workflow, reason).await?;
    self.execute(prepared, cancel).await
  }

  /// Execute a prepared run to a terminal state.
  #[instrument(
    name = "run_execute",
    skip(self, run, cancel),
    fields(workflow_id = %run.workflow_id, run_id = %run.run_id)
  )]
  pub async fn execute(
    &self,
    run: PreparedRun,
    cancel: CancellationToken,
  ) -> Result<RunReport, ExecutionError> {
    self.recorder.mark_running(&run.run_id).await?;
    info!(run_id = %run.run_id, workflow_id = %run.workflow_id, "run_started");
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run.run_id.clone(),
      workflow_id: run.workflow_id.clone(),
    });

    let graph = match run.graph {
      Ok(graph) => graph,
      Err(rejected) => return self.reject(run.run_id, run.workflow_id, rejected).await,
    };

    let state = RunState::new(run.workflow_id, run.run_id, graph, cancel);
    self.walk_chain(&state, state.graph.start()).await;
    self.conclude(state).await
  }

  /// Fail a run whose content did not validate. No node runs; each is
  /// recorded as skipped so the timeline still lists the whole graph.
  async fn reject(
    &self,
    run_id: String,
    workflow_id: String,
    rejected: Rejected,
  ) -> Result<RunReport, ExecutionError> {
    let err = ExecutionError::Validation(rejected.report);
    error!(run_id = %run_id, error = %err, "run_rejected");

    let mut nodes = Vec::new();
    for (_, node) in rejected.graph.nodes() {
      self
        .recorder
        .append(&run_id, NodeEntry::new(&node.id, NodeStatus::Skipped))
        .await?;
      self.notifier.notify(ExecutionEvent::NodeSkipped {
        run_id: run_id.clone(),
        node_id: node.id.clone(),
      });
      nodes.push(NodeReport {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind.to_string(),
        status: NodeStatus::Skipped,
      });
    }

    let failure = Failure {
      node_id: String::new(),
      message: err.to_string(),
    };
    self
      .finish(
        run_id,
        workflow_id,
        RunStatus::Failed,
        Some(failure),
        nodes,
        RunArtifacts::default(),
      )
      .await
  }

  /// Walk one chain until it ends or halts.
  fn walk_chain<'a>(&'a self, state: &'a RunState, head: NodeIndex) -> BoxFuture<'a, ()> {
    async move {
      let mut cursor = Some(head);
      while let Some(index) = cursor {
        if state.token.is_cancelled() {
          state.interrupt();
          return;
        }
        match self.step(state, index).await {
          Flow::Continue => cursor = state.graph.node(index).next,
          Flow::Halt => return,
        }
      }
    }
    .boxed()
  }

  async fn step(&self, state: &RunState, index: NodeIndex) -> Flow {
    match state.graph.config(index) {
      NodeConfig::Start(_) | NodeConfig::End => flow(
        self.started(state, index, 1).await
          && self.succeeded(state, index, 1, JsonMap::new()).await,
      ),
      NodeConfig::Branch => self.run_branch(state, index).await,
      NodeConfig::Condition(condition) => {
        if !self.started(state, index, 1).await {
          return Flow::Halt;
        }
        let verdict = match &condition.expression {
          Some(expression) => evaluate(expression, state),
          None => Ok(true),
        };
        match verdict {
          Ok(result) => {
            let mut output = JsonMap::new();
            output.insert("result".to_string(), Value::Bool(result));
            if !self.succeeded(state, index, 1, output).await {
              return Flow::Halt;
            }
            if result {
              Flow::Continue
            } else {
              info!(node_id = %state.graph.node(index).id, "condition_false");
              self.skip_all(state, &state.graph.graph().descendants(index)).await;
              Flow::Halt
            }
          }
          Err(source) => {
            let err = ExecutionError::Resolution {
              node_id: state.graph.node(index).id.clone(),
              source,
            };
            self.failed(state, index, 1, &err).await;
            state.fail(&state.graph.node(index).id, err.chain());
            Flow::Halt
          }
        }
      }
      NodeConfig::Apply { .. } | NodeConfig::Deploy { .. } | NodeConfig::Notify { .. } => {
        self.run_action(state, index).await
      }
    }
  }

  async fn run_branch(&self, state: &RunState, index: NodeIndex) -> Flow {
    if !self.started(state, index, 1).await {
      return Flow::Halt;
    }
    let heads = state.graph.node(index).branches.clone();
    let parallelism = self.config.max_parallelism.max(1);

    stream::iter(heads)
      .map(|head| self.walk_chain(state, head))
      .buffer_unordered(parallelism)
      .collect::<Vec<()>>()
      .await;

    if state.token.is_cancelled() {
      state.interrupt();
      self.failed(state, index, 1, &ExecutionError::Canceled).await;
      return Flow::Halt;
    }
    flow(self.succeeded(state, index, 1, JsonMap::new()).await)
  }

  #[instrument(
    name = "node_execute",
    skip_all,
    fields(run_id = %state.run_id, node_id = %state.graph.node(index).id)
  )]
  async fn run_action(&self, state: &RunState, index: NodeIndex) -> Flow {
    let node = state.graph.node(index);
    let config = state.graph.config(index);
    let Some(action) = config.action() else {
      return Flow::Continue;
    };

    match self.invoke_with_retry(state, index, config, action).await {
      Ok((attempt, produced)) => {
        // Only declared outputs become visible to downstream selectors.
        let outputs: JsonMap = produced
          .into_iter()
          .filter(|(name, _)| node.declares_output(name))
          .collect();
        flow(self.succeeded(state, index, attempt, outputs).await)
      }
      Err((attempt, err)) => {
        self.failed(state, index, attempt, &err).await;
        if matches!(err, ExecutionError::Canceled) {
          state.interrupt();
          Flow::Halt
        } else if action.continue_on_error && !err.is_fatal() {
          warn!(node_id = %node.id, error = %err, "node_failed_continuing");
          Flow::Continue
        } else {
          state.fail(&node.id, err.chain());
          Flow::Halt
        }
      }
    }
  }

  /// Resolve inputs once, then invoke the capability under the node's retry
  /// policy. Returns the attempt number alongside the result.
  async fn invoke_with_retry(
    &self,
    state: &RunState,
    index: NodeIndex,
    config: &NodeConfig,
    action: &ActionConfig,
  ) -> Result<(u32, JsonMap), (u32, ExecutionError)> {
    let node = state.graph.node(index);
    let inputs = resolve_inputs(&node.inputs, state).map_err(|source| {
      let err = if source.is_validation() {
        ExecutionError::UnboundInput {
          node_id: node.id.clone(),
          source,
        }
      } else {
        ExecutionError::Resolution {
          node_id: node.id.clone(),
          source,
        }
      };
      (1, err)
    })?;

    let capability = self
      .registry
      .lookup(node.kind, action.provider_type.trim())
      .map_err(|source| {
        (
          1,
          ExecutionError::UnknownProvider {
            node_id: node.id.clone(),
            source,
          },
        )
      })?;

    let policy = action
      .retry
      .clone()
      .unwrap_or_else(|| self.config.default_retry.clone());
    let timeout = action
      .timeout()
      .unwrap_or_else(|| self.config.default_timeout());
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
      if !self.started(state, index, attempt).await {
        return Err((attempt, ExecutionError::Canceled));
      }
      let result = self
        .attempt(state, index, &capability, config, action, &inputs, attempt, timeout)
        .await;

      match result {
        Ok(produced) => return Ok((attempt, produced)),
        Err(err) if err.is_retryable() && attempt < attempts => {
          let delay = policy.delay_after(attempt);
          warn!(
            node_id = %node.id,
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "node_attempt_failed"
          );
          self.failed(state, index, attempt, &err).await;
          tokio::select! {
            _ = state.token.cancelled() => return Err((attempt, ExecutionError::Canceled)),
            _ = tokio::time::sleep(delay) => {}
          }
          attempt += 1;
        }
        Err(err) => return Err((attempt, err)),
      }
    }
  }

  /// One bounded capability call.
  #[allow(clippy::too_many_arguments)]
  async fn attempt(
    &self,
    state: &RunState,
    index: NodeIndex,
    capability: &Capability,
    config: &NodeConfig,
    action: &ActionConfig,
    inputs: &JsonMap,
    attempt: u32,
    timeout: Duration,
  ) -> Result<JsonMap, ExecutionError> {
    let node = state.graph.node(index);
    let ctx = InvokeContext {
      workflow_id: state.workflow_id.clone(),
      run_id: state.run_id.clone(),
      node_id: node.id.clone(),
      provider_type: action.provider_type.trim().to_string(),
      attempt,
      params: action.params.clone(),
      deadline: Some(Instant::now() + timeout),
      cancel: state.token.child_token(),
    };

    let call = self.dispatch(state, &ctx, capability, config, inputs);
    tokio::select! {
      _ = state.token.cancelled() => {
        ctx.cancel.cancel();
        Err(ExecutionError::Canceled)
      }
      result = tokio::time::timeout(timeout, call) => match result {
        Ok(result) => result,
        Err(_) => {
          ctx.cancel.cancel();
          Err(ExecutionError::Timeout {
            node_id: node.id.clone(),
            timeout_ms: timeout.as_millis() as u64,
          })
        }
      },
    }
  }

  /// Invoke the capability and turn its result into produced values.
  async fn dispatch(
    &self,
    state: &RunState,
    ctx: &InvokeContext,
    capability: &Capability,
    config: &NodeConfig,
    inputs: &JsonMap,
  ) -> Result<JsonMap, ExecutionError> {
    let provider_error = |operation: &'static str| {
      let node_id = ctx.node_id.clone();
      let provider = ctx.provider_type.clone();
      move |source| ExecutionError::Provider {
        node_id,
        provider,
        operation,
        source,
      }
    };
    let mut produced = JsonMap::new();

    match (capability, config) {
      (Capability::Issuer(issuer), NodeConfig::Apply { params, .. }) => {
        let bundle = issuer
          .apply(ctx, &domain_params(params))
          .await
          .map_err(provider_error("apply"))?;
        state.artifacts().certificates.push(IssuedCertificate {
          node_id: ctx.node_id.clone(),
          domains: params.domains.clone(),
          certificate: bundle.certificate.clone(),
          private_key: bundle.private_key.clone(),
        });
        produced.insert("certificate".to_string(), bundle.to_value());
      }
      (Capability::Deployer(deployer), NodeConfig::Deploy { .. }) => {
        let bundle = certificate_input(&ctx.node_id, inputs)?;
        let result = deployer
          .deploy(ctx, &bundle)
          .await
          .map_err(provider_error("deploy"))?;
        produced.extend(result.outputs);
      }
      (Capability::Uploader(uploader), NodeConfig::Deploy { .. }) => {
        let bundle = certificate_input(&ctx.node_id, inputs)?;
        let result = uploader
          .upload(ctx, &bundle)
          .await
          .map_err(provider_error("upload"))?;
        state.artifacts().identifiers.push(ProviderIdentifier {
          node_id: ctx.node_id.clone(),
          provider: ctx.provider_type.clone(),
          id: result.cert_id.clone(),
        });
        produced.insert("certId".to_string(), Value::String(result.cert_id));
      }
      (Capability::Notifier(notifier), NodeConfig::Notify { params, .. }) => {
        let summary = self.render_summary(state, &ctx.node_id, params, inputs)?;
        notifier
          .notify(ctx, &summary)
          .await
          .map_err(provider_error("notify"))?;
      }
      (capability, config) => {
        return Err(ExecutionError::Provider {
          node_id: ctx.node_id.clone(),
          provider: ctx.provider_type.clone(),
          operation: "dispatch",
          source: certloom_capability::CapabilityError::InvalidParams(format!(
            "{:?} cannot serve a {} node",
            capability,
            config.kind()
          )),
        });
      }
    }
    Ok(produced)
  }

  fn render_summary(
    &self,
    state: &RunState,
    node_id: &str,
    params: &NotifyParams,
    inputs: &JsonMap,
  ) -> Result<certloom_capability::RunSummary, ExecutionError> {
    let draft = state.summary(String::new(), String::new());
    let context = json!({
      "workflow_id": draft.workflow_id,
      "run_id": draft.run_id,
      "status": draft.status,
      "nodes": draft.nodes,
      "error": draft.error,
      "inputs": inputs,
    });
    let to_err = |source| ExecutionError::Resolution {
      node_id: node_id.to_string(),
      source,
    };
    let subject = render("subject", &params.subject, &context).map_err(to_err)?;
    let message = render("message", &params.message, &context).map_err(to_err)?;
    Ok(certloom_capability::RunSummary {
      subject,
      message,
      ..draft
    })
  }

  async fn started(&self, state: &RunState, index: NodeIndex, attempt: u32) -> bool {
    let node_id = state.graph.node(index).id.clone();
    let recorded = self
      .record(
        state,
        index,
        NodeEntry::new(&node_id, NodeStatus::Running).attempt(attempt),
        None,
      )
      .await;
    if recorded {
      self.notifier.notify(ExecutionEvent::NodeStarted {
        run_id: state.run_id.clone(),
        node_id,
        attempt,
      });
    }
    recorded
  }

  async fn succeeded(
    &self,
    state: &RunState,
    index: NodeIndex,
    attempt: u32,
    output: JsonMap,
  ) -> bool {
    let node_id = state.graph.node(index).id.clone();
    let value = Value::Object(output.clone());
    let entry = NodeEntry::new(&node_id, NodeStatus::Succeeded)
      .attempt(attempt)
      .output(value.clone());
    let recorded = self.record(state, index, entry, Some(output)).await;
    if recorded {
      info!(node_id = %node_id, attempt, "node_succeeded");
      self.notifier.notify(ExecutionEvent::NodeSucceeded {
        run_id: state.run_id.clone(),
        node_id,
        output: value,
      });
    }
    recorded
  }

  async fn failed(&self, state: &RunState, index: NodeIndex, attempt: u32, err: &ExecutionError) {
    let node_id = state.graph.node(index).id.clone();
    let message = err.chain();
    let entry = NodeEntry::new(&node_id, NodeStatus::Failed)
      .attempt(attempt)
      .error(&message);
    if self.record(state, index, entry, None).await {
      error!(node_id = %node_id, attempt, error = %message, "node_failed");
      self.notifier.notify(ExecutionEvent::NodeFailed {
        run_id: state.run_id.clone(),
        node_id,
        attempt,
        error: message,
      });
    }
  }

  /// Mark nodes that never started as skipped.
  async fn skip_all(&self, state: &RunState, indexes: &[NodeIndex]) {
    for &index in indexes {
      if state.status(index) != NodeStatus::Pending {
        continue;
      }
      let node_id = state.graph.node(index).id.clone();
      let entry = NodeEntry::new(&node_id, NodeStatus::Skipped);
      if self.record(state, index, entry, None).await {
        self.notifier.notify(ExecutionEvent::NodeSkipped {
          run_id: state.run_id.clone(),
          node_id,
        });
      }
    }
  }

  /// Append a transition and update in-memory state once it is durable.
  /// A recorder failure is fatal to the run.
  async fn record(
    &self,
    state: &RunState,
    index: NodeIndex,
    entry: NodeEntry,
    output: Option<JsonMap>,
  ) -> bool {
    let status = entry.status;
    match self.recorder.append(&state.run_id, entry).await {
      Ok(_) => {
        state.set(index, status, output);
        true
      }
      Err(e) => {
        let node_id = &state.graph.node(index).id;
        error!(node_id = %node_id, error = %e, "record_failed");
        state.fail(node_id, ExecutionError::Store(e).chain());
        false
      }
    }
  }

  /// Skip whatever never ran, decide the run status and finalize.
  async fn conclude(&self, state: RunState) -> Result<RunReport, ExecutionError> {
    self.skip_all(&state, &state.pending()).await;

    let failure = state.failure();
    let status = if failure.is_some() {
      RunStatus::Failed
    } else if state.was_interrupted() {
      RunStatus::Canceled
    } else {
      RunStatus::Succeeded
    };
    let artifacts = if status == RunStatus::Succeeded {
      state.take_artifacts()
    } else {
      RunArtifacts::default()
    };
    let nodes = state
      .graph
      .graph()
      .nodes()
      .zip(state.node_statuses())
      .map(|((_, node), status)| NodeReport {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind.to_string(),
        status,
      })
      .collect();

    self
      .finish(state.run_id, state.workflow_id, status, failure, nodes, artifacts)
      .await
  }

  async fn finish(
    &self,
    run_id: String,
    workflow_id: String,
    status: RunStatus,
    failure: Option<Failure>,
    nodes: Vec<NodeReport>,
    artifacts: RunArtifacts,
  ) -> Result<RunReport, ExecutionError> {
    let mut outcome = RunOutcome::new(status);
    outcome.error = failure.as_ref().map(|f| f.message.clone());
    outcome.error_node = failure
      .as_ref()
      .map(|f| f.node_id.clone())
      .filter(|id| !id.is_empty());
    outcome.artifacts = artifacts.clone();
    self.recorder.finalize(&run_id, outcome).await?;

    match status {
      RunStatus::Failed => {
        error!(run_id = %run_id, error = ?failure.as_ref().map(|f| &f.message), "run_finished")
      }
      _ => info!(run_id = %run_id, status = %status, "run_finished"),
    }
    self.notifier.notify(ExecutionEvent::RunFinished {
      run_id: run_id.clone(),
      status,
      error: failure.as_ref().map(|f| f.message.clone()),
    });

    Ok(RunReport {
      run_id,
      workflow_id,
      status,
      failure,
      nodes,
      artifacts,
    })
  }
}

/// Continue only if the node's transitions were recorded.
fn flow(recorded: bool) -> Flow {
  if recorded { Flow::Continue } else { Flow::Halt }
}

fn domain_params(params: &ApplyParams) -> DomainParams {
  DomainParams {
    domains: params.domains.clone(),
    contact_email: params.contact_email.clone(),
    provider_access_id: params.provider_access_id.clone(),
    key_algorithm: params.key_algorithm.clone(),
    nameservers: params.nameservers.clone(),
    propagation_timeout: params.propagation_timeout.map(Duration::from_secs),
    disable_follow_cname: params.disable_follow_cname,
  }
}

fn certificate_input(node_id: &str, inputs: &JsonMap) -> Result<CertificateBundle, ExecutionError> {
  inputs
    .get("certificate")
    .and_then(CertificateBundle::from_value)
    .ok_or_else(|| ExecutionError::MissingCertificate {
      node_id: node_id.to_string(),
    })
}
