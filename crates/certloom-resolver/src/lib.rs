//! Certloom Resolver
//!
//! Fills node inputs at run time from literals or from outputs already
//! recorded for upstream nodes, evaluates condition predicates, and renders
//! notification templates.

mod error;
mod lookup;
mod predicate;
mod resolver;
mod template;

pub use error::ResolveError;
pub use lookup::{OutputLookup, ProducerState};
pub use predicate::evaluate;
pub use resolver::{resolve_inputs, resolve_port};
pub use template::render;
