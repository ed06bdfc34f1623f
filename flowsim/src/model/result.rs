//! Step result record.

use super::StepStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The recorded outcome of one step (or of the trigger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Step id, or `trigger`.
    pub step_id: String,
    /// Component FQN after named-component resolution.
    pub component_fqn: String,
    /// Outcome.
    pub status: StepStatus,
    /// Resolved input.
    pub input: Value,
    /// Output data, for successful steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error data, for failed steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// When the step started (ISO 8601).
    pub started_at: String,
    /// When the step finished (ISO 8601).
    pub completed_at: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Duration the simulator reported, before time scaling.
    pub simulated_duration_ms: u64,
    /// Position in the run; the trigger is 0.
    pub execution_order: usize,
}

impl StepResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        step_id: impl Into<String>,
        component_fqn: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Self {
        let now = crate::utils::iso_timestamp();
        Self {
            step_id: step_id.into(),
            component_fqn: component_fqn.into(),
            status: StepStatus::Success,
            input,
            output: Some(output),
            error: None,
            started_at: now.clone(),
            completed_at: now,
            duration_ms: 0,
            simulated_duration_ms: 0,
            execution_order: 0,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(
        step_id: impl Into<String>,
        component_fqn: impl Into<String>,
        input: Value,
        error: Value,
    ) -> Self {
        Self {
            status: StepStatus::Failure,
            output: None,
            error: Some(error),
            ..Self::success(step_id, component_fqn, input, Value::Null)
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(step_id: impl Into<String>, component_fqn: impl Into<String>, input: Value) -> Self {
        Self {
            status: StepStatus::Skipped,
            output: None,
            ..Self::success(step_id, component_fqn, input, Value::Null)
        }
    }

    /// Sets start/end timestamps and wall-clock duration.
    #[must_use]
    pub fn with_timing(mut self, started_at: String, completed_at: String, duration_ms: u64) -> Self {
        self.started_at = started_at;
        self.completed_at = completed_at;
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the simulated duration.
    #[must_use]
    pub fn with_simulated_duration(mut self, ms: u64) -> Self {
        self.simulated_duration_ms = ms;
        self
    }

    /// Sets the execution order index.
    #[must_use]
    pub fn with_order(mut self, order: usize) -> Self {
        self.execution_order = order;
        self
    }

    /// Returns true if the step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// The value a run reports when this is its last step: the output,
    /// else the error data, else `null`.
    #[must_use]
    pub fn final_value(&self) -> Value {
        self.output
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or(Value::Null)
    }
}
