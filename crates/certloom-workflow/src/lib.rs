//! Certloom Workflow
//!
//! The runnable representation of a workflow graph. The nested persisted tree
//! from `certloom-config` is flattened into an arena ([`Graph`]) and checked by
//! the [`Validator`]; a graph that passes becomes a [`ValidatedGraph`], the
//! only form the executor accepts.

mod catalog;
mod error;
mod graph;
pub mod lifecycle;
mod validator;

pub use catalog::{KnownProviders, ProviderCatalog};
pub use error::{LifecycleError, ValidationReport, Violation};
pub use graph::{Graph, GraphNode, NodeIndex};
pub use validator::{ValidatedGraph, Validator};
