use std::path::Path;
use std::time::Duration;

use certloom_config::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::EngineConfigError;

/// Engine settings. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Sibling branches in flight at once, per branch node.
  pub max_parallelism: usize,
  /// Per-attempt timeout for action nodes that do not set `timeoutMs`.
  pub default_timeout_ms: u64,
  /// Expiry of a single-flight lease, in case a run never releases it.
  pub lease_ttl_ms: u64,
  pub tick_interval_ms: u64,
  /// Retry policy for action nodes that do not set `retry`.
  pub default_retry: RetryPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_parallelism: 4,
      default_timeout_ms: 300_000,
      lease_ttl_ms: 7_200_000,
      tick_interval_ms: 1_000,
      default_retry: RetryPolicy::default(),
    }
  }
}

impl EngineConfig {
  /// Load from a JSON file. A missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, EngineConfigError> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| EngineConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&raw).map_err(|source| EngineConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn default_timeout(&self) -> Duration {
    Duration::from_millis(self.default_timeout_ms)
  }

  pub fn lease_ttl(&self) -> Duration {
    Duration::from_millis(self.lease_ttl_ms)
  }

  pub fn tick_interval(&self) -> Duration {
    Duration::from_millis(self.tick_interval_ms.max(1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use certloom_config::RetryBackoff;

  #[test]
  fn test_load_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
      &path,
      r#"{ "max_parallelism": 2, "default_retry": { "maxAttempts": 3, "backoff": "linear" } }"#,
    )
    .unwrap();

    let config = EngineConfig::load(&path).unwrap();
    assert_eq!(config.max_parallelism, 2);
    assert_eq!(config.default_timeout_ms, 300_000);
    assert_eq!(config.default_retry.max_attempts, 3);
    assert_eq!(config.default_retry.backoff, RetryBackoff::Linear);
  }

  #[test]
  fn test_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, EngineConfig::default());
  }

  #[test]
  fn test_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
      EngineConfig::load(&path),
      Err(EngineConfigError::Parse { .. })
    ));
  }
}
