mod config;
mod de;
mod enums;
mod error;
mod expr;
mod node;
mod workflow;

pub use config::{
  ActionConfig, ApplyParams, ConditionConfig, NodeConfig, NotifyParams, RetryPolicy, StartConfig,
};
pub use enums::{CompareOp, LogicalOp, NodeKind, RetryBackoff, TriggerKind, ValueType};
pub use error::ConfigError;
pub use expr::Expr;
pub use node::{NodeIo, ValueSelector, WorkflowNode};
pub use workflow::WorkflowDef;
