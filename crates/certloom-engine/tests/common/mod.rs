//! Fake capabilities and graph builders shared by the engine tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use certloom_capability::{
  CapabilityError, CapabilityRegistry, CertificateBundle, DeployResult, Deployer, DomainParams,
  InvokeContext, Issuer, Notifier, RunSummary, UploadResult, Uploader,
};
use certloom_config::{NodeIo, NodeKind, ValueType, WorkflowDef, WorkflowNode};
use certloom_engine::{EngineConfig, Executor};
use certloom_store::MemoryRecorder;
use serde_json::{Value, json};

/// Issues a certificate after failing a set number of times.
#[derive(Default)]
pub struct FakeIssuer {
  pub failures: AtomicU32,
  pub calls: AtomicU32,
}

impl FakeIssuer {
  pub fn failing(times: u32) -> Self {
    Self {
      failures: AtomicU32::new(times),
      calls: AtomicU32::new(0),
    }
  }

  pub fn calls(&self) -> u32 {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Issuer for FakeIssuer {
  async fn apply(
    &self,
    _ctx: &InvokeContext,
    params: &DomainParams,
  ) -> Result<CertificateBundle, CapabilityError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let remaining = self.failures.load(Ordering::SeqCst);
    if remaining > 0 {
      self.failures.store(remaining - 1, Ordering::SeqCst);
      return Err(CapabilityError::Failed("acme order rejected".to_string()));
    }
    Ok(CertificateBundle::new(
      format!("CERT:{}", params.domains.join(",")),
      "KEY",
    ))
  }
}

/// Records every bundle it is asked to deploy.
#[derive(Default)]
pub struct RecordingDeployer {
  pub deployed: Mutex<Vec<CertificateBundle>>,
}

impl RecordingDeployer {
  pub fn deployed(&self) -> Vec<CertificateBundle> {
    self.deployed.lock().unwrap().clone()
  }
}

#[async_trait]
impl Deployer for RecordingDeployer {
  async fn deploy(
    &self,
    ctx: &InvokeContext,
    bundle: &CertificateBundle,
  ) -> Result<DeployResult, CapabilityError> {
    self.deployed.lock().unwrap().push(bundle.clone());
    let mut result = DeployResult::default();
    result
      .outputs
      .insert("target".to_string(), json!(ctx.node_id));
    Ok(result)
  }
}

/// Blocks until cancelled or until its delay passes.
pub struct SlowDeployer {
  pub delay: Duration,
  pub started: tokio::sync::Notify,
  pub cancelled: AtomicU32,
}

impl SlowDeployer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      started: tokio::sync::Notify::new(),
      cancelled: AtomicU32::new(0),
    }
  }
}

#[async_trait]
impl Deployer for SlowDeployer {
  async fn deploy(
    &self,
    ctx: &InvokeContext,
    _bundle: &CertificateBundle,
  ) -> Result<DeployResult, CapabilityError> {
    self.started.notify_one();
    tokio::select! {
      _ = ctx.cancel.cancelled() => {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        Err(CapabilityError::Canceled)
      }
      _ = tokio::time::sleep(self.delay) => Ok(DeployResult::default()),
    }
  }
}

/// Tracks how many deploys are in flight at once.
pub struct CountingDeployer {
  pub delay: Duration,
  pub active: AtomicU32,
  pub peak: AtomicU32,
}

impl CountingDeployer {
  pub fn new(delay: Duration) -> Self {
    Self {
      delay,
      active: AtomicU32::new(0),
      peak: AtomicU32::new(0),
    }
  }

  pub fn peak(&self) -> u32 {
    self.peak.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Deployer for CountingDeployer {
  async fn deploy(
    &self,
    _ctx: &InvokeContext,
    _bundle: &CertificateBundle,
  ) -> Result<DeployResult, CapabilityError> {
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(self.delay).await;
    self.active.fetch_sub(1, Ordering::SeqCst);
    Ok(DeployResult::default())
  }
}

pub struct FakeUploader;

#[async_trait]
impl Uploader for FakeUploader {
  async fn upload(
    &self,
    _ctx: &InvokeContext,
    _bundle: &CertificateBundle,
  ) -> Result<UploadResult, CapabilityError> {
    Ok(UploadResult {
      cert_id: "cdn-cert-42".to_string(),
    })
  }
}

#[derive(Default)]
pub struct RecordingNotifier {
  pub sent: Mutex<Vec<RunSummary>>,
}

impl RecordingNotifier {
  pub fn sent(&self) -> Vec<RunSummary> {
    self.sent.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn notify(
    &self,
    _ctx: &InvokeContext,
    summary: &RunSummary,
  ) -> Result<(), CapabilityError> {
    self.sent.lock().unwrap().push(summary.clone());
    Ok(())
  }
}

/// Fakes registered under the provider types the builders below use.
pub struct Harness {
  pub issuer: Arc<FakeIssuer>,
  pub deployer: Arc<RecordingDeployer>,
  pub slow: Arc<SlowDeployer>,
  pub counting: Arc<CountingDeployer>,
  pub notifier: Arc<RecordingNotifier>,
  pub recorder: Arc<MemoryRecorder>,
  pub executor: Arc<Executor>,
}

impl Harness {
  pub fn new(issuer: FakeIssuer) -> Self {
    Self::with_config(issuer, EngineConfig::default())
  }

  pub fn with_config(issuer: FakeIssuer, config: EngineConfig) -> Self {
    let issuer = Arc::new(issuer);
    let deployer = Arc::new(RecordingDeployer::default());
    let slow = Arc::new(SlowDeployer::new(Duration::from_secs(3600)));
    let counting = Arc::new(CountingDeployer::new(Duration::from_millis(30)));
    let notifier = Arc::new(RecordingNotifier::default());
    let recorder = Arc::new(MemoryRecorder::new());

    let registry = CapabilityRegistry::builder()
      .issuer("acme", issuer.clone())
      .deployer("ssh", deployer.clone())
      .deployer("slow", slow.clone())
      .deployer("counting", counting.clone())
      .uploader("cdn", Arc::new(FakeUploader))
      .notifier("email", notifier.clone())
      .build();
    let executor = Arc::new(Executor::new(
      Arc::new(registry),
      recorder.clone(),
      config,
    ));

    Self {
      issuer,
      deployer,
      slow,
      counting,
      notifier,
      recorder,
      executor,
    }
  }
}

pub fn start() -> WorkflowNode {
  WorkflowNode::new("start", NodeKind::Start).with_config(json!({ "trigger": "manual" }))
}

pub fn scheduled_start(cron: &str) -> WorkflowNode {
  WorkflowNode::new("start", NodeKind::Start)
    .with_config(json!({ "trigger": "auto", "triggerCron": cron }))
}

pub fn apply(id: &str, config: Value) -> WorkflowNode {
  let mut base = json!({ "providerType": "acme", "domains": "example.com" });
  merge(&mut base, config);
  WorkflowNode::new(id, NodeKind::Apply)
    .with_config(base)
    .with_output(NodeIo::new("certificate", ValueType::Certificate))
}

pub fn deploy(id: &str, provider: &str, producer: &str) -> WorkflowNode {
  deploy_with(id, producer, json!({ "providerType": provider }))
}

pub fn deploy_with(id: &str, producer: &str, config: Value) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Deploy)
    .with_config(config)
    .with_input(
      NodeIo::new("certificate", ValueType::Certificate)
        .required()
        .with_selector(producer, "certificate"),
    )
}

pub fn notify(id: &str) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Notify).with_config(json!({
    "providerType": "email",
    "subject": "[{{ status }}] {{ workflow_id }}",
    "message": "{{ nodes | length }} nodes"
  }))
}

pub fn condition(id: &str, value: bool) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Condition).with_config(json!({
    "expression": { "type": "const", "value": value }
  }))
}

pub fn branch(id: &str, branches: Vec<WorkflowNode>) -> WorkflowNode {
  WorkflowNode::new(id, NodeKind::Branch).with_branches(branches)
}

pub fn end() -> WorkflowNode {
  WorkflowNode::new("end", NodeKind::End)
}

pub fn workflow(id: &str, content: WorkflowNode) -> WorkflowDef {
  WorkflowDef::new(id, id).with_content(content)
}

fn merge(base: &mut Value, extra: Value) {
  if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
    base.extend(extra);
  }
}
