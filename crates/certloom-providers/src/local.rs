//! Filesystem-backed providers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use certloom_capability::{
  CapabilityError, CertificateBundle, DeployResult, Deployer, DomainParams, InvokeContext, Issuer,
  UploadResult, Uploader,
};
use serde_json::json;
use tracing::info;

const CERT_FILE: &str = "fullchain.pem";
const KEY_FILE: &str = "privkey.pem";

fn required<'a>(ctx: &'a InvokeContext, key: &str) -> Result<&'a str, CapabilityError> {
  ctx
    .param_str(key)
    .filter(|v| !v.trim().is_empty())
    .ok_or_else(|| CapabilityError::InvalidParams(format!("missing '{key}'")))
}

async fn write_bundle(
  dir: &Path,
  cert_file: &str,
  key_file: &str,
  bundle: &CertificateBundle,
) -> Result<(PathBuf, PathBuf), CapabilityError> {
  tokio::fs::create_dir_all(dir).await?;
  let cert_path = dir.join(cert_file);
  let key_path = dir.join(key_file);
  tokio::fs::write(&cert_path, &bundle.certificate).await?;
  tokio::fs::write(&key_path, &bundle.private_key).await?;
  Ok((cert_path, key_path))
}

/// Reads an existing certificate and key from `certPath` and `keyPath`.
pub struct LocalIssuer;

#[async_trait]
impl Issuer for LocalIssuer {
  async fn apply(
    &self,
    ctx: &InvokeContext,
    params: &DomainParams,
  ) -> Result<CertificateBundle, CapabilityError> {
    let cert_path = required(ctx, "certPath")?;
    let key_path = required(ctx, "keyPath")?;

    let certificate = tokio::fs::read_to_string(cert_path).await?;
    let private_key = tokio::fs::read_to_string(key_path).await?;
    if !certificate.contains("BEGIN CERTIFICATE") {
      return Err(CapabilityError::Failed(format!(
        "{cert_path} does not contain a PEM certificate"
      )));
    }

    info!(
      node_id = %ctx.node_id,
      domains = ?params.domains,
      cert_path = %cert_path,
      "certificate_loaded"
    );
    Ok(CertificateBundle::new(certificate, private_key))
  }
}

/// Writes the certificate and key into the directory `dir`.
///
/// `certFile` and `keyFile` override the file names. The written paths are
/// returned as the `certPath` and `keyPath` outputs.
pub struct LocalDeployer;

#[async_trait]
impl Deployer for LocalDeployer {
  async fn deploy(
    &self,
    ctx: &InvokeContext,
    bundle: &CertificateBundle,
  ) -> Result<DeployResult, CapabilityError> {
    let dir = PathBuf::from(required(ctx, "dir")?);
    let cert_file = ctx.param_str("certFile").unwrap_or(CERT_FILE);
    let key_file = ctx.param_str("keyFile").unwrap_or(KEY_FILE);

    let (cert_path, key_path) = write_bundle(&dir, cert_file, key_file, bundle).await?;
    info!(node_id = %ctx.node_id, dir = %dir.display(), "certificate_deployed");

    let mut result = DeployResult::default();
    result
      .outputs
      .insert("certPath".to_string(), json!(cert_path.display().to_string()));
    result
      .outputs
      .insert("keyPath".to_string(), json!(key_path.display().to_string()));
    Ok(result)
  }
}

/// Stores each upload under `dir/<certId>/`, with a fresh id per upload.
pub struct LocalUploader;

#[async_trait]
impl Uploader for LocalUploader {
  async fn upload(
    &self,
    ctx: &InvokeContext,
    bundle: &CertificateBundle,
  ) -> Result<UploadResult, CapabilityError> {
    let root = PathBuf::from(required(ctx, "dir")?);
    let cert_id = uuid::Uuid::new_v4().to_string();

    write_bundle(&root.join(&cert_id), CERT_FILE, KEY_FILE, bundle).await?;
    info!(node_id = %ctx.node_id, cert_id = %cert_id, "certificate_uploaded");
    Ok(UploadResult { cert_id })
  }
}
