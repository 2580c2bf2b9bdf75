//! Resolution of node input ports.
//!
//! A port is resolved from the output of an upstream node when it carries a
//! selector, otherwise from its literal value. Either way the result is
//! coerced to the port's declared type.

use certloom_config::{NodeIo, ValueSelector, ValueType};
use serde_json::Value;

use crate::error::ResolveError;
use crate::lookup::{OutputLookup, ProducerState};

/// Resolve one port. Returns `None` for an optional port with nothing bound.
pub fn resolve_port(
  port: &NodeIo,
  outputs: &dyn OutputLookup,
) -> Result<Option<Value>, ResolveError> {
  if let Some(selector) = port.selector() {
    let value = lookup_selector(&port.name, selector, outputs)?;
    return coerce_value(&port.name, value, port.value_type).map(Some);
  }
  match port.literal() {
    Some(value) => coerce_value(&port.name, value.clone(), port.value_type).map(Some),
    None if port.required => Err(ResolveError::MissingValue {
      port: port.name.clone(),
    }),
    None => Ok(None),
  }
}

/// Resolve every input of a node into a map keyed by port name.
pub fn resolve_inputs(
  inputs: &[NodeIo],
  outputs: &dyn OutputLookup,
) -> Result<serde_json::Map<String, Value>, ResolveError> {
  let mut resolved = serde_json::Map::new();
  for port in inputs {
    if let Some(value) = resolve_port(port, outputs)? {
      resolved.insert(port.name.clone(), value);
    }
  }
  Ok(resolved)
}

/// Fetch the output a selector points at.
pub(crate) fn lookup_selector(
  port: &str,
  selector: &ValueSelector,
  outputs: &dyn OutputLookup,
) -> Result<Value, ResolveError> {
  let producer = selector.id.clone();
  match outputs.producer(&selector.id) {
    ProducerState::Succeeded(map) => {
      map
        .get(&selector.name)
        .cloned()
        .ok_or_else(|| ResolveError::MissingOutput {
          port: port.to_string(),
          producer,
          output: selector.name.clone(),
        })
    }
    ProducerState::NotExecuted => Err(ResolveError::NotExecuted {
      port: port.to_string(),
      producer,
    }),
    ProducerState::Skipped => Err(ResolveError::ProducerSkipped {
      port: port.to_string(),
      producer,
    }),
    ProducerState::Failed => Err(ResolveError::ProducerFailed {
      port: port.to_string(),
      producer,
    }),
  }
}

/// Coerce a value to the declared port type. Strings are parsed when the
/// target is not a string.
fn coerce_value(port: &str, value: Value, value_type: ValueType) -> Result<Value, ResolveError> {
  let mismatch = |found: &Value| ResolveError::TypeMismatch {
    port: port.to_string(),
    expected: value_type,
    found: found.to_string(),
  };

  match (value_type, value) {
    (ValueType::String, Value::String(s)) => Ok(Value::String(s)),
    (ValueType::String, v @ (Value::Number(_) | Value::Bool(_))) => {
      Ok(Value::String(v.to_string()))
    }

    (ValueType::Number, Value::Number(n)) => Ok(Value::Number(n)),
    (ValueType::Number, Value::String(s)) => {
      if let Ok(i) = s.trim().parse::<i64>() {
        return Ok(Value::Number(i.into()));
      }
      s.trim()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| mismatch(&Value::String(s)))
    }

    (ValueType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
    (ValueType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
      "true" => Ok(Value::Bool(true)),
      "false" => Ok(Value::Bool(false)),
      _ => Err(mismatch(&Value::String(s))),
    },

    (ValueType::Object, Value::Object(m)) => Ok(Value::Object(m)),
    (ValueType::Object, Value::String(s)) => match serde_json::from_str::<Value>(&s) {
      Ok(v @ Value::Object(_)) => Ok(v),
      _ => Err(mismatch(&Value::String(s))),
    },

    (ValueType::Certificate, value) => {
      let parsed = match value {
        Value::String(s) => {
          serde_json::from_str::<Value>(&s).map_err(|_| mismatch(&Value::String(s)))?
        }
        other => other,
      };
      let is_bundle = parsed
        .as_object()
        .is_some_and(|m| m.get("certificate").is_some_and(Value::is_string));
      if is_bundle { Ok(parsed) } else { Err(mismatch(&parsed)) }
    }

    (_, other) => Err(mismatch(&other)),
  }
}
