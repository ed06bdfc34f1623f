//! Execution orchestrator.
//!
//! A run moves `pending -> running -> {completed | failed | cancelled}`:
//!
//! 1. the record is created and `execution.started` emitted
//! 2. the flow is planned into layers; cycles produce `execution.warning`
//! 3. the trigger runs as step 0
//! 4. each layer's steps run concurrently and are joined before the next
//!    layer
//! 5. `execution.completed` reports counts, output and context variables
//!
//! Cancellation and the advisory timeout are checked before the trigger and
//! before every layer.
//!
//! Step failures never stop a run. Only planning errors and timeouts end
//! it with `execution.failed`.

mod engine;
mod request;
mod step;

pub use engine::{ExecutionHandle, FlowOrchestrator};
pub use request::{CancelResponse, EngineRequest, EngineResponse};
pub use step::SET_CONTEXT_KEY;
