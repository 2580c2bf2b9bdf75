//! Rendering of notification templates with minijinja.

use minijinja::{Environment, Value};
use serde::Serialize;

use crate::error::ResolveError;

/// Render a template against any serializable context.
///
/// ```text
/// "[{{ status }}] {{ workflow_id }}"  ->  "[succeeded] renew-example"
/// ```
pub fn render(
  name: &str,
  template: &str,
  context: &impl Serialize,
) -> Result<String, ResolveError> {
  let env = Environment::new();
  env
    .render_str(template, Value::from_serialize(context))
    .map_err(|e| ResolveError::Template {
      name: name.to_string(),
      message: e.to_string(),
    })
}
