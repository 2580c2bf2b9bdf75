use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything a capability call knows about where it runs.
#[derive(Debug, Clone)]
pub struct InvokeContext {
  pub workflow_id: String,
  pub run_id: String,
  pub node_id: String,
  pub provider_type: String,
  /// 1-based attempt number.
  pub attempt: u32,
  /// Provider-specific parameters from the node config.
  pub params: serde_json::Map<String, serde_json::Value>,
  pub deadline: Option<Instant>,
  pub cancel: CancellationToken,
}

impl InvokeContext {
  pub fn new(
    workflow_id: impl Into<String>,
    run_id: impl Into<String>,
    node_id: impl Into<String>,
  ) -> Self {
    Self {
      workflow_id: workflow_id.into(),
      run_id: run_id.into(),
      node_id: node_id.into(),
      provider_type: String::new(),
      attempt: 1,
      params: serde_json::Map::new(),
      deadline: None,
      cancel: CancellationToken::new(),
    }
  }

  /// Look up a provider parameter as a string.
  pub fn param_str(&self, key: &str) -> Option<&str> {
    self.params.get(key).and_then(|v| v.as_str())
  }

  /// Time left before the deadline, if one is set.
  pub fn remaining(&self) -> Option<Duration> {
    self
      .deadline
      .map(|d| d.saturating_duration_since(Instant::now()))
  }
}

/// Issued certificate material. Serialized as the `certificate` output of an
/// apply node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBundle {
  /// PEM encoded certificate chain.
  pub certificate: String,
  /// PEM encoded private key.
  pub private_key: String,
}

impl CertificateBundle {
  pub fn new(certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
    Self {
      certificate: certificate.into(),
      private_key: private_key.into(),
    }
  }

  pub fn to_value(&self) -> serde_json::Value {
    serde_json::json!({
      "certificate": self.certificate,
      "privateKey": self.private_key,
    })
  }

  pub fn from_value(value: &serde_json::Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}

impl fmt::Debug for CertificateBundle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CertificateBundle")
      .field("certificate", &format_args!("{} bytes", self.certificate.len()))
      .field("private_key", &"<redacted>")
      .finish()
  }
}

/// What an issuer is asked to obtain.
#[derive(Debug, Clone, Default)]
pub struct DomainParams {
  pub domains: Vec<String>,
  pub contact_email: String,
  pub provider_access_id: Option<String>,
  pub key_algorithm: String,
  pub nameservers: Vec<String>,
  pub propagation_timeout: Option<Duration>,
  pub disable_follow_cname: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeployResult {
  /// Extra values recorded as node outputs when the node declares them.
  pub outputs: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
  /// Identifier the provider assigned to the uploaded certificate.
  pub cert_id: String,
}

/// Outcome of one node, as seen by a notifier.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
  pub id: String,
  pub name: String,
  pub status: String,
}

/// The run as handed to a notifier, with its templates already rendered.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
  pub workflow_id: String,
  pub run_id: String,
  pub status: String,
  pub subject: String,
  pub message: String,
  pub nodes: Vec<NodeSummary>,
  pub error: Option<String>,
}
