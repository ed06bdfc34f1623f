//! Dependency analysis and layer scheduling.

mod dependency;
mod layers;

pub use dependency::{DependencyGraph, DependencyRef, StepNode, UnknownReference};
pub use layers::{ExecutionLayer, ExecutionPlan, MAX_FORCED_PER_ROUND};
