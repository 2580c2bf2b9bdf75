//! Typed node configuration.
//!
//! The persisted `config` of a node is an untyped JSON map whose shape depends
//! on the node's `type`. [`NodeConfig::parse`] turns it into a tagged union so
//! the rest of the system never performs raw key lookups.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::de::{delimited_list, lenient_u64};
use crate::enums::{NodeKind, RetryBackoff, TriggerKind};
use crate::error::ConfigError;
use crate::expr::Expr;

type JsonMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
  Start(StartConfig),
  End,
  Apply {
    action: ActionConfig,
    params: ApplyParams,
  },
  Deploy {
    action: ActionConfig,
  },
  Notify {
    action: ActionConfig,
    params: NotifyParams,
  },
  Branch,
  Condition(ConditionConfig),
}

impl NodeConfig {
  /// Parse the raw config map of a node of the given kind.
  pub fn parse(kind: NodeKind, config: &JsonMap) -> Result<Self, ConfigError> {
    match kind {
      NodeKind::Start => Ok(NodeConfig::Start(from_map(kind, config)?)),
      NodeKind::End => Ok(NodeConfig::End),
      NodeKind::Branch => Ok(NodeConfig::Branch),
      NodeKind::Condition => Ok(NodeConfig::Condition(from_map(kind, config)?)),
      NodeKind::Apply => {
        let action: ActionConfig = from_map(kind, config)?;
        let params: ApplyParams = from_map(kind, &action.params)?;
        Ok(NodeConfig::Apply { action, params })
      }
      NodeKind::Deploy => Ok(NodeConfig::Deploy {
        action: from_map(kind, config)?,
      }),
      NodeKind::Notify => {
        let action: ActionConfig = from_map(kind, config)?;
        let params: NotifyParams = from_map(kind, &action.params)?;
        Ok(NodeConfig::Notify { action, params })
      }
      NodeKind::Unknown => Err(ConfigError::UnknownNodeKind),
    }
  }

  pub fn kind(&self) -> NodeKind {
    match self {
      NodeConfig::Start(_) => NodeKind::Start,
      NodeConfig::End => NodeKind::End,
      NodeConfig::Apply { .. } => NodeKind::Apply,
      NodeConfig::Deploy { .. } => NodeKind::Deploy,
      NodeConfig::Notify { .. } => NodeKind::Notify,
      NodeConfig::Branch => NodeKind::Branch,
      NodeConfig::Condition(_) => NodeKind::Condition,
    }
  }

  /// The action settings of an apply, deploy or notify node.
  pub fn action(&self) -> Option<&ActionConfig> {
    match self {
      NodeConfig::Apply { action, .. }
      | NodeConfig::Deploy { action }
      | NodeConfig::Notify { action, .. } => Some(action),
      _ => None,
    }
  }
}

fn from_map<T: serde::de::DeserializeOwned>(
  kind: NodeKind,
  config: &JsonMap,
) -> Result<T, ConfigError> {
  serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|e| {
    ConfigError::Invalid {
      kind,
      message: e.to_string(),
    }
  })
}

/// Trigger settings carried on the start node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConfig {
  #[serde(default)]
  pub trigger: TriggerKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger_cron: Option<String>,
}

/// Settings shared by every node that invokes a capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
  /// Selects the capability implementation in the registry.
  #[serde(default)]
  pub provider_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retry: Option<RetryPolicy>,
  /// A failure of this node does not fail the run.
  #[serde(default)]
  pub continue_on_error: bool,
  /// Everything else in the config map; handed to the provider untouched.
  #[serde(flatten)]
  pub params: JsonMap,
}

impl ActionConfig {
  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_ms.map(Duration::from_millis)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default)]
  pub backoff: RetryBackoff,
  #[serde(default)]
  pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
  1
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      backoff: RetryBackoff::Constant,
      initial_delay_ms: 0,
    }
  }
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, backoff: RetryBackoff, initial_delay_ms: u64) -> Self {
    Self {
      max_attempts,
      backoff,
      initial_delay_ms,
    }
  }

  /// Total attempts allowed, never less than one.
  pub fn attempts(&self) -> u32 {
    self.max_attempts.max(1)
  }

  /// Delay before retrying after the given failed attempt (1-based).
  pub fn delay_after(&self, failed_attempt: u32) -> Duration {
    let base = self.initial_delay_ms;
    let n = failed_attempt.max(1);
    let ms = match self.backoff {
      RetryBackoff::Constant => base,
      RetryBackoff::Linear => base.saturating_mul(u64::from(n)),
      RetryBackoff::Exponential => {
        base.saturating_mul(1u64.checked_shl(n - 1).unwrap_or(u64::MAX))
      }
    };
    Duration::from_millis(ms)
  }
}

/// Parameters of an apply (certificate issuance) node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyParams {
  #[serde(default, deserialize_with = "delimited_list")]
  pub domains: Vec<String>,
  #[serde(default)]
  pub contact_email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provider_access_id: Option<String>,
  #[serde(default = "default_key_algorithm")]
  pub key_algorithm: String,
  #[serde(default, deserialize_with = "delimited_list")]
  pub nameservers: Vec<String>,
  /// DNS propagation timeout in seconds.
  #[serde(
    default,
    deserialize_with = "lenient_u64",
    skip_serializing_if = "Option::is_none"
  )]
  pub propagation_timeout: Option<u64>,
  #[serde(default = "default_true", rename = "disableFollowCNAME")]
  pub disable_follow_cname: bool,
}

fn default_key_algorithm() -> String {
  "RSA2048".to_string()
}

fn default_true() -> bool {
  true
}

/// Parameters of a notify node. Both fields are templates rendered against
/// the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyParams {
  #[serde(default)]
  pub subject: String,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expression: Option<Expr>,
}
