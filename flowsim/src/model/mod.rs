//! Core data model for flows and runs.
//!
//! This module contains the types exchanged with callers:
//! - Flow, trigger and step definitions
//! - Step results and run/step status enums
//! - Component schemas

mod flow;
mod result;
mod schema;
mod status;

pub use flow::{
    parse_output_route, resolve_component, FlowDefinition, NamedComponent, StepDefinition,
    TriggerDefinition,
};
pub use result::StepResult;
pub use schema::ComponentSchema;
pub use status::{ExecutionStatus, StepStatus};

/// Step id under which the trigger's result is stored.
pub const TRIGGER_STEP_ID: &str = "trigger";

/// Reference root for context variables.
pub const CONTEXT_ROOT: &str = "context";
