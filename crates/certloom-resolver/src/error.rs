use certloom_config::ValueType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
  /// A required port has neither a literal nor a selector. Save-time
  /// validation rejects this, so seeing it at run time means the graph
  /// changed after it was validated.
  #[error("required input '{port}' has no value or selector")]
  MissingValue { port: String },

  #[error("input '{port}': producer {producer} has not executed")]
  NotExecuted { port: String, producer: String },

  #[error("input '{port}': producer {producer} was skipped")]
  ProducerSkipped { port: String, producer: String },

  #[error("input '{port}': producer {producer} failed")]
  ProducerFailed { port: String, producer: String },

  #[error("input '{port}': producer {producer} did not emit output '{output}'")]
  MissingOutput {
    port: String,
    producer: String,
    output: String,
  },

  #[error("input '{port}' expected {expected:?}, got {found}")]
  TypeMismatch {
    port: String,
    expected: ValueType,
    found: String,
  },

  #[error("cannot compare {left} with {right}")]
  Incomparable { left: String, right: String },

  #[error("failed to render template '{name}': {message}")]
  Template { name: String, message: String },
}

impl ResolveError {
  /// Whether the error means the graph itself is broken rather than an
  /// upstream node not having produced what was expected.
  pub fn is_validation(&self) -> bool {
    matches!(self, ResolveError::MissingValue { .. })
  }
}
