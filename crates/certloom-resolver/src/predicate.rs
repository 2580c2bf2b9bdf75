//! Evaluation of condition node predicates.

use std::cmp::Ordering;

use certloom_config::{CompareOp, Expr, LogicalOp};
use serde_json::Value;

use crate::error::ResolveError;
use crate::lookup::OutputLookup;
use crate::resolver::lookup_selector;

/// Evaluate a predicate to a boolean.
pub fn evaluate(expr: &Expr, outputs: &dyn OutputLookup) -> Result<bool, ResolveError> {
  eval(expr, outputs).map(|v| truthy(&v))
}

fn eval(expr: &Expr, outputs: &dyn OutputLookup) -> Result<Value, ResolveError> {
  match expr {
    Expr::Const { value } => Ok(value.clone()),
    Expr::Var { selector } => lookup_selector("expression", selector, outputs),
    Expr::Not { expr } => Ok(Value::Bool(!evaluate(expr, outputs)?)),
    Expr::Logical {
      left,
      operator,
      right,
    } => {
      let left = evaluate(left, outputs)?;
      // Short-circuit: the right side is not evaluated once the result is known.
      let result = match operator {
        LogicalOp::And => left && evaluate(right, outputs)?,
        LogicalOp::Or => left || evaluate(right, outputs)?,
      };
      Ok(Value::Bool(result))
    }
    Expr::Compare {
      left,
      operator,
      right,
    } => {
      let left = eval(left, outputs)?;
      let right = eval(right, outputs)?;
      compare(&left, *operator, &right).map(Value::Bool)
    }
  }
}

fn compare(left: &Value, operator: CompareOp, right: &Value) -> Result<bool, ResolveError> {
  let ordered = |accept: fn(Ordering) -> bool| {
    order(left, right)
      .map(accept)
      .ok_or_else(|| ResolveError::Incomparable {
        left: left.to_string(),
        right: right.to_string(),
      })
  };
  match operator {
    CompareOp::Eq => Ok(loose_eq(left, right)),
    CompareOp::Neq => Ok(!loose_eq(left, right)),
    CompareOp::Gt => ordered(Ordering::is_gt),
    CompareOp::Gte => ordered(Ordering::is_ge),
    CompareOp::Lt => ordered(Ordering::is_lt),
    CompareOp::Lte => ordered(Ordering::is_le),
  }
}

/// Equality where numbers compare by value regardless of representation.
fn loose_eq(left: &Value, right: &Value) -> bool {
  match (left.as_f64(), right.as_f64()) {
    (Some(l), Some(r)) => l == r,
    _ => left == right,
  }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
  match (left, right) {
    (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
    (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
    _ => None,
  }
}

fn truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(a) => !a.is_empty(),
    Value::Object(o) => !o.is_empty(),
  }
}
