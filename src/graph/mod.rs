//! Dependency graph: validation, cycle detection and stage planning.
//!
//! [`resolve`] turns a descriptor list into a [`StagePlan`]. It never runs
//! services and has no side effects beyond logging.

mod plan;
mod resolver;

pub use plan::StagePlan;
pub use resolver::resolve;
