//! Request envelope.

use super::{ExecutionHandle, FlowOrchestrator};
use crate::config::ExecutionOptions;
use crate::errors::{FlowsimError, RequestValidationError};
use crate::model::{FlowDefinition, NamedComponent, StepDefinition, StepResult};
use crate::store::ExecutionStatusView;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request to the engine, tagged by `action`.
///
/// Every payload field is optional on the wire so that a missing field is
/// reported as a [`RequestValidationError`] naming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum EngineRequest {
    /// Run a whole flow.
    #[serde(rename_all = "camelCase")]
    Flow {
        /// Flow to run.
        flow_definition: Option<FlowDefinition>,
        /// Trigger payload; `null` when absent.
        #[serde(default)]
        trigger_input: Option<Value>,
        /// Per-run options.
        #[serde(default)]
        execution_options: Option<ExecutionOptions>,
    },
    /// Simulate one step.
    #[serde(rename_all = "camelCase")]
    Step {
        /// Step to simulate.
        step_definition: Option<StepDefinition>,
        /// Named components the step's `componentRef` may name.
        #[serde(default)]
        components: Vec<NamedComponent>,
        /// Input values; defaults to the step's input map.
        #[serde(default)]
        input_data: Option<Map<String, Value>>,
        /// Config overrides.
        #[serde(default)]
        component_config: Option<Map<String, Value>>,
        /// Options; only the seed is used.
        #[serde(default)]
        execution_options: Option<ExecutionOptions>,
    },
    /// Query a run.
    #[serde(rename_all = "camelCase")]
    Status {
        /// Run id.
        execution_id: Option<String>,
    },
    /// Cancel a run.
    #[serde(rename_all = "camelCase")]
    Cancel {
        /// Run id.
        execution_id: Option<String>,
        /// Why.
        #[serde(default)]
        reason: Option<String>,
    },
}

impl EngineRequest {
    /// The action name.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Flow { .. } => "flow",
            Self::Step { .. } => "step",
            Self::Status { .. } => "status",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// Answer to a `cancel` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    /// Run id.
    pub execution_id: String,
    /// Whether this request cancelled the run.
    pub cancelled: bool,
    /// Human-readable outcome.
    pub message: String,
}

/// Answer to an [`EngineRequest`].
#[derive(Debug)]
pub enum EngineResponse {
    /// A started run.
    Execution(ExecutionHandle),
    /// A single-step result.
    Step(StepResult),
    /// Status of a run, `None` when unknown.
    Status(Option<ExecutionStatusView>),
    /// Cancellation outcome.
    Cancel(CancelResponse),
}

impl FlowOrchestrator {
    /// Validates and dispatches a request.
    pub async fn handle(
        &self,
        request: EngineRequest,
    ) -> Result<EngineResponse, RequestValidationError> {
        let action = request.action();
        match request {
            EngineRequest::Flow {
                flow_definition,
                trigger_input,
                execution_options,
            } => {
                let flow = flow_definition
                    .ok_or_else(|| RequestValidationError::missing(action, "flowDefinition"))?;
                let options = execution_options.unwrap_or_default();
                Ok(EngineResponse::Execution(self.start(
                    flow,
                    trigger_input.unwrap_or(Value::Null),
                    &options,
                )))
            }
            EngineRequest::Step {
                step_definition,
                components,
                input_data,
                component_config,
                execution_options,
            } => {
                let step = step_definition
                    .ok_or_else(|| RequestValidationError::missing(action, "stepDefinition"))?;
                if step.step_id.trim().is_empty() {
                    return Err(RequestValidationError::missing(action, "stepDefinition.stepId"));
                }
                if step.component_ref.trim().is_empty() {
                    return Err(RequestValidationError::missing(
                        action,
                        "stepDefinition.componentRef",
                    ));
                }
                let options = execution_options.unwrap_or_default();
                let result = self
                    .execute_step(
                        &step,
                        &components,
                        input_data.as_ref(),
                        component_config.as_ref(),
                        &options,
                    )
                    .await;
                Ok(EngineResponse::Step(result))
            }
            EngineRequest::Status { execution_id } => {
                let id = execution_id
                    .ok_or_else(|| RequestValidationError::missing(action, "executionId"))?;
                Ok(EngineResponse::Status(self.status(&id)))
            }
            EngineRequest::Cancel {
                execution_id,
                reason,
            } => {
                let id = execution_id
                    .ok_or_else(|| RequestValidationError::missing(action, "executionId"))?;
                let cancelled = self.cancel(&id, reason.as_deref());
                let message = if cancelled {
                    "Execution cancelled".to_string()
                } else if self.status(&id).is_some() {
                    "Execution is not running".to_string()
                } else {
                    FlowsimError::ExecutionNotFound(id.clone()).to_string()
                };
                Ok(EngineResponse::Cancel(CancelResponse {
                    execution_id: id,
                    cancelled,
                    message,
                }))
            }
        }
    }
}
