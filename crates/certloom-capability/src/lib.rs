//! Certloom Capability
//!
//! The contracts action nodes dispatch to ([`Issuer`], [`Deployer`],
//! [`Uploader`], [`Notifier`]) and the [`CapabilityRegistry`] that selects an
//! implementation by the provider type named in a node's config. Adding a
//! provider means registering an implementation; the executor never changes.

mod capability;
mod error;
mod registry;
mod types;

pub use capability::{Deployer, Issuer, Notifier, Uploader};
pub use error::{CapabilityError, RegistryError};
pub use registry::{Capability, CapabilityRegistry, RegistryBuilder};
pub use types::{
  CertificateBundle, DeployResult, DomainParams, InvokeContext, NodeSummary, RunSummary,
  UploadResult,
};
