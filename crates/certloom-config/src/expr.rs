//! Predicate expressions for condition nodes.
//!
//! A predicate is a small JSON expression tree, not a scripting language:
//!
//! ```json
//! {
//!   "type": "compare",
//!   "left": { "type": "var", "selector": { "id": "apply-1", "name": "skipped" } },
//!   "operator": "eq",
//!   "right": { "type": "const", "value": false }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::enums::{CompareOp, LogicalOp};
use crate::node::ValueSelector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
  Const {
    value: serde_json::Value,
  },
  Var {
    selector: ValueSelector,
  },
  Compare {
    left: Box<Expr>,
    operator: CompareOp,
    right: Box<Expr>,
  },
  Logical {
    left: Box<Expr>,
    operator: LogicalOp,
    right: Box<Expr>,
  },
  Not {
    expr: Box<Expr>,
  },
}

impl Expr {
  /// Every selector referenced anywhere in the expression.
  pub fn selectors(&self) -> Vec<&ValueSelector> {
    let mut out = Vec::new();
    self.collect_selectors(&mut out);
    out
  }

  fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a ValueSelector>) {
    match self {
      Expr::Const { .. } => {}
      Expr::Var { selector } => out.push(selector),
      Expr::Compare { left, right, .. } | Expr::Logical { left, right, .. } => {
        left.collect_selectors(out);
        right.collect_selectors(out);
      }
      Expr::Not { expr } => expr.collect_selectors(out),
    }
  }
}
