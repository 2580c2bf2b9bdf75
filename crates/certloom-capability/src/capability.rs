use async_trait::async_trait;

use crate::error::CapabilityError;
use crate::types::{
  CertificateBundle, DeployResult, DomainParams, InvokeContext, RunSummary, UploadResult,
};

/// Obtains certificates.
#[async_trait]
pub trait Issuer: Send + Sync {
  async fn apply(
    &self,
    ctx: &InvokeContext,
    params: &DomainParams,
  ) -> Result<CertificateBundle, CapabilityError>;
}

/// Installs a certificate on a target system.
#[async_trait]
pub trait Deployer: Send + Sync {
  async fn deploy(
    &self,
    ctx: &InvokeContext,
    bundle: &CertificateBundle,
  ) -> Result<DeployResult, CapabilityError>;
}

/// Uploads a certificate to a provider's certificate store.
#[async_trait]
pub trait Uploader: Send + Sync {
  async fn upload(
    &self,
    ctx: &InvokeContext,
    bundle: &CertificateBundle,
  ) -> Result<UploadResult, CapabilityError>;
}

/// Delivers a run summary.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, ctx: &InvokeContext, summary: &RunSummary) -> Result<(), CapabilityError>;
}
