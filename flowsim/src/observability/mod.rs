//! Logging setup.
//!
//! The engine logs through `tracing` with structured fields
//! (`execution_id`, `step_id`, `layer`). Binaries call [`init_tracing`] once
//! at startup; libraries embedding the engine install their own subscriber.

mod config;
mod setup;

pub use config::{LogFormat, TracingConfig};
pub use setup::init_tracing;
