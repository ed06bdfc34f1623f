//! # Flowsim
//!
//! Execution simulation engine for declarative flow definitions.
//!
//! A flow is a trigger plus a set of steps wired together by expressions
//! (`steps.fetch.outputs.body`, `trigger.headers.x-id`, `context.tenant`).
//! Flowsim runs such a flow without calling any real component:
//!
//! - **Dependency analysis**: references and `runAfter` edges become layers
//!   of steps that may run concurrently; cycles are reported and broken
//! - **Expression resolution**: step inputs and conditions are evaluated
//!   against the results produced so far
//! - **Component simulation**: standard-library components return canned
//!   outputs, anything else is synthesized from its output schema
//! - **Event streaming**: every lifecycle change is a sequenced event,
//!   consumable as a stream or as server-sent events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowsim::prelude::*;
//! use serde_json::json;
//!
//! let flow = FlowDefinition::new("Acme:Orders")
//!     .with_step(StepDefinition::new("fetch", "StdLib:HttpCall"))
//!     .with_step(
//!         StepDefinition::new("log", "StdLib:Logger")
//!             .with_input("message", "steps.fetch.outputs.statusCode"),
//!     );
//!
//! let engine = FlowOrchestrator::default();
//! let handle = engine.start(flow, json!({ "orderId": 7 }), &ExecutionOptions::new());
//! for event in handle.collect_events().await {
//!     println!("{} {}", event.sequence, event.event_type);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod errors;
pub mod events;
pub mod expression;
pub mod graph;
pub mod model;
pub mod observability;
pub mod orchestrator;
pub mod simulator;
pub mod store;
pub mod trigger;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EngineConfig, ExecutionOptions};
    pub use crate::errors::{
        ErrorInfo, ExpressionError, FlowExecutionError, FlowsimError, RequestValidationError,
        StepExecutionError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, EventType, LoggingEventSink, NoOpEventSink,
        StreamingEvent,
    };
    pub use crate::graph::{DependencyGraph, ExecutionPlan};
    pub use crate::model::{
        ComponentSchema, ExecutionStatus, FlowDefinition, StepDefinition, StepResult, StepStatus,
        TriggerDefinition,
    };
    pub use crate::orchestrator::{EngineRequest, EngineResponse, ExecutionHandle, FlowOrchestrator};
    pub use crate::simulator::{ComponentRegistry, ComponentSimulator, SyntheticSimulator};
    pub use crate::store::{ExecutionContextStore, ExecutionStatusView};
    pub use crate::utils::{generate_execution_id, iso_timestamp, Timestamp};
}
