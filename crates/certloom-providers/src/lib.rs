//! Providers that ship with certloom.
//!
//! - `local`: issue from PEM files on disk, deploy or upload by writing files
//! - `webhook`: POST the run summary as JSON

mod local;
mod webhook;

use std::sync::Arc;

use certloom_capability::{CapabilityRegistry, RegistryBuilder};

pub use local::{LocalDeployer, LocalIssuer, LocalUploader};
pub use webhook::WebhookNotifier;

/// Add the built-in providers to a registry under construction.
pub fn register_builtin(builder: RegistryBuilder) -> RegistryBuilder {
  builder
    .issuer("local", Arc::new(LocalIssuer))
    .deployer("local", Arc::new(LocalDeployer))
    .uploader("local-store", Arc::new(LocalUploader))
    .notifier("webhook", Arc::new(WebhookNotifier::new()))
}

/// A registry holding only the built-in providers.
pub fn builtin_registry() -> CapabilityRegistry {
  register_builtin(CapabilityRegistry::builder()).build()
}
