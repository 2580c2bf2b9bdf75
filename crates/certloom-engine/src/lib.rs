//! Workflow execution engine for certloom.
//!
//! [`Executor`] walks a validated workflow graph, dispatching action nodes to
//! capabilities and recording each transition. [`Scheduler`] decides when runs
//! start and keeps at most one run in flight per workflow.

mod config;
mod error;
mod events;
mod executor;
mod lease;
mod scheduler;
mod state;

pub use config::EngineConfig;
pub use error::{EngineConfigError, ExecutionError, ScheduleError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{Executor, NodeReport, PreparedRun, RunReport};
pub use lease::{LeaseGuard, LeaseTable};
pub use scheduler::{RunHandle, Scheduler, next_fire, parse_cron};
pub use state::Failure;
