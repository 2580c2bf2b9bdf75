use certloom_config::NodeKind;
use thiserror::Error;

/// Failure reported by a capability implementation.
#[derive(Debug, Error)]
pub enum CapabilityError {
  #[error("invalid parameters: {0}")]
  InvalidParams(String),

  #[error("{0}")]
  Failed(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("canceled")]
  Canceled,
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("no {kind} provider registered as {provider}")]
  UnknownProvider { kind: NodeKind, provider: String },

  #[error("{0} nodes do not invoke a capability")]
  NotAnAction(NodeKind),
}
