use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use certloom_config::NodeKind;
use certloom_workflow::ProviderCatalog;

use crate::capability::{Deployer, Issuer, Notifier, Uploader};
use crate::error::RegistryError;

/// A capability implementation resolved for one node.
#[derive(Clone)]
pub enum Capability {
  Issuer(Arc<dyn Issuer>),
  Deployer(Arc<dyn Deployer>),
  Uploader(Arc<dyn Uploader>),
  Notifier(Arc<dyn Notifier>),
}

impl fmt::Debug for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Capability::Issuer(_) => "Issuer",
      Capability::Deployer(_) => "Deployer",
      Capability::Uploader(_) => "Uploader",
      Capability::Notifier(_) => "Notifier",
    };
    f.write_str(name)
  }
}

/// Provider implementations keyed by provider-type string.
///
/// Populated once at startup; lookups never perform I/O.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
  issuers: HashMap<String, Arc<dyn Issuer>>,
  deployers: HashMap<String, Arc<dyn Deployer>>,
  uploaders: HashMap<String, Arc<dyn Uploader>>,
  notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl CapabilityRegistry {
  pub fn builder() -> RegistryBuilder {
    RegistryBuilder::default()
  }

  /// Resolve the capability an action node of `kind` invokes.
  ///
  /// Deploy nodes prefer a [`Deployer`] and fall back to an [`Uploader`]
  /// registered under the same provider type.
  pub fn lookup(&self, kind: NodeKind, provider: &str) -> Result<Capability, RegistryError> {
    let found = match kind {
      NodeKind::Apply => self.issuers.get(provider).cloned().map(Capability::Issuer),
      NodeKind::Deploy => self
        .deployers
        .get(provider)
        .cloned()
        .map(Capability::Deployer)
        .or_else(|| self.uploaders.get(provider).cloned().map(Capability::Uploader)),
      NodeKind::Notify => self.notifiers.get(provider).cloned().map(Capability::Notifier),
      other => return Err(RegistryError::NotAnAction(other)),
    };
    found.ok_or_else(|| RegistryError::UnknownProvider {
      kind,
      provider: provider.to_string(),
    })
  }

  /// Registered provider types per action kind, sorted.
  pub fn providers(&self) -> Vec<(NodeKind, String)> {
    let mut out: Vec<(NodeKind, String)> = self
      .issuers
      .keys()
      .map(|k| (NodeKind::Apply, k.clone()))
      .chain(self.deployers.keys().map(|k| (NodeKind::Deploy, k.clone())))
      .chain(self.uploaders.keys().map(|k| (NodeKind::Deploy, k.clone())))
      .chain(self.notifiers.keys().map(|k| (NodeKind::Notify, k.clone())))
      .collect();
    out.sort_by(|a, b| (a.0.as_str(), &a.1).cmp(&(b.0.as_str(), &b.1)));
    out.dedup();
    out
  }
}

impl fmt::Debug for CapabilityRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CapabilityRegistry")
      .field("providers", &self.providers())
      .finish()
  }
}

impl ProviderCatalog for CapabilityRegistry {
  fn contains(&self, kind: NodeKind, provider_type: &str) -> bool {
    self.lookup(kind, provider_type).is_ok()
  }
}

#[derive(Default)]
pub struct RegistryBuilder {
  registry: CapabilityRegistry,
}

impl RegistryBuilder {
  pub fn issuer(mut self, provider: impl Into<String>, issuer: Arc<dyn Issuer>) -> Self {
    self.registry.issuers.insert(provider.into(), issuer);
    self
  }

  pub fn deployer(mut self, provider: impl Into<String>, deployer: Arc<dyn Deployer>) -> Self {
    self.registry.deployers.insert(provider.into(), deployer);
    self
  }

  pub fn uploader(mut self, provider: impl Into<String>, uploader: Arc<dyn Uploader>) -> Self {
    self.registry.uploaders.insert(provider.into(), uploader);
    self
  }

  pub fn notifier(mut self, provider: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
    self.registry.notifiers.insert(provider.into(), notifier);
    self
  }

  pub fn build(self) -> CapabilityRegistry {
    self.registry
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CapabilityError;
  use crate::types::{CertificateBundle, DeployResult, InvokeContext, UploadResult};
  use async_trait::async_trait;

  struct NullDeployer;

  #[async_trait]
  impl Deployer for NullDeployer {
    async fn deploy(
      &self,
      _ctx: &InvokeContext,
      _bundle: &CertificateBundle,
    ) -> Result<DeployResult, CapabilityError> {
      Ok(DeployResult::default())
    }
  }

  struct NullUploader;

  #[async_trait]
  impl Uploader for NullUploader {
    async fn upload(
      &self,
      _ctx: &InvokeContext,
      _bundle: &CertificateBundle,
    ) -> Result<UploadResult, CapabilityError> {
      Ok(UploadResult {
        cert_id: "cert-1".to_string(),
      })
    }
  }

  fn registry() -> CapabilityRegistry {
    CapabilityRegistry::builder()
      .deployer("ssh", Arc::new(NullDeployer))
      .uploader("cdn", Arc::new(NullUploader))
      .uploader("ssh", Arc::new(NullUploader))
      .build()
  }

  #[test]
  fn test_deploy_prefers_deployer() {
    let registry = registry();
    assert!(matches!(
      registry.lookup(NodeKind::Deploy, "ssh"),
      Ok(Capability::Deployer(_))
    ));
    assert!(matches!(
      registry.lookup(NodeKind::Deploy, "cdn"),
      Ok(Capability::Uploader(_))
    ));
  }

  #[test]
  fn test_unknown_provider() {
    let registry = registry();
    let err = registry.lookup(NodeKind::Apply, "ssh").unwrap_err();
    assert!(matches!(
      err,
      RegistryError::UnknownProvider { kind: NodeKind::Apply, ref provider } if provider == "ssh"
    ));
    assert!(matches!(
      registry.lookup(NodeKind::Branch, "ssh"),
      Err(RegistryError::NotAnAction(NodeKind::Branch))
    ));
  }

  #[test]
  fn test_catalog_and_listing() {
    let registry = registry();
    assert!(registry.contains(NodeKind::Deploy, "cdn"));
    assert!(!registry.contains(NodeKind::Notify, "cdn"));
    assert_eq!(
      registry.providers(),
      vec![
        (NodeKind::Deploy, "cdn".to_string()),
        (NodeKind::Deploy, "ssh".to_string()),
      ]
    );
  }

  #[tokio::test]
  async fn test_invoke_through_lookup() {
    let registry = registry();
    let ctx = InvokeContext::new("wf", "run", "deploy");
    let bundle = CertificateBundle::new("cert", "key");
    let Ok(Capability::Uploader(uploader)) = registry.lookup(NodeKind::Deploy, "cdn") else {
      panic!("expected uploader");
    };
    let result = uploader.upload(&ctx, &bundle).await.unwrap();
    assert_eq!(result.cert_id, "cert-1");
  }
}
