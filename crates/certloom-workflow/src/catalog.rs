use std::collections::HashSet;

use certloom_config::NodeKind;

/// The set of provider types registered per action kind.
///
/// Validation checks provider names against a catalog only; no credentials
/// are consulted.
pub trait ProviderCatalog: Send + Sync {
  fn contains(&self, kind: NodeKind, provider_type: &str) -> bool;
}

/// A fixed catalog, typically for tests and offline validation.
#[derive(Debug, Clone, Default)]
pub struct KnownProviders {
  entries: HashSet<(NodeKind, String)>,
}

impl KnownProviders {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, kind: NodeKind, provider_type: impl Into<String>) -> Self {
    self.entries.insert((kind, provider_type.into()));
    self
  }
}

impl ProviderCatalog for KnownProviders {
  fn contains(&self, kind: NodeKind, provider_type: &str) -> bool {
    self.entries.contains(&(kind, provider_type.to_string()))
  }
}
