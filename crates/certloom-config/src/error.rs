use thiserror::Error;

use crate::enums::NodeKind;

#[derive(Debug, Error)]
pub enum ConfigError {
  /// The node's config map does not match the shape required by its kind.
  #[error("invalid {kind} node config: {message}")]
  Invalid { kind: NodeKind, message: String },

  /// Nodes of an unrecognized type carry no typed configuration.
  #[error("unrecognized node type")]
  UnknownNodeKind,
}
