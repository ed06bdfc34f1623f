//! Error types for the flowsim engine.
//!
//! The taxonomy follows how far a failure is allowed to travel:
//!
//! - [`ExpressionError`] never leaves the resolver; it becomes `null`.
//! - [`StepExecutionError`] fails one step; siblings and later layers continue.
//! - [`FlowExecutionError`] aborts a run with `execution.failed`.
//! - [`RequestValidationError`] rejects a request before anything runs.
//! - A missing execution is not an error at all for queries; see
//!   [`FlowsimError::ExecutionNotFound`] for the cases that must report it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for flowsim operations.
#[derive(Debug, Error)]
pub enum FlowsimError {
    /// A request envelope was missing required fields.
    #[error("{0}")]
    Validation(#[from] RequestValidationError),

    /// A run-level failure.
    #[error("{0}")]
    FlowExecution(#[from] FlowExecutionError),

    /// A step-level failure.
    #[error("{0}")]
    StepExecution(#[from] StepExecutionError),

    /// An expression could not be parsed or evaluated.
    #[error("{0}")]
    Expression(#[from] ExpressionError),

    /// No execution is registered under the id.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Machine-readable metadata attached to run-level errors.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "FLOW-DUPLICATE-STEP").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised by the orchestrator itself. Aborts the whole run.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FlowExecutionError {
    /// The error message.
    pub message: String,
    /// The steps involved, if any.
    pub steps: Vec<String>,
    /// Diagnostic metadata.
    pub info: Option<ErrorInfo>,
}

impl FlowExecutionError {
    /// Creates a new flow execution error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            info: None,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the diagnostic metadata.
    #[must_use]
    pub fn with_info(mut self, info: ErrorInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// A step id appears more than once in a flow.
    #[must_use]
    pub fn duplicate_step(step_id: &str) -> Self {
        Self::new(format!("Duplicate step id '{step_id}' in flow definition"))
            .with_steps(vec![step_id.to_string()])
            .with_info(
                ErrorInfo::new("FLOW-DUPLICATE-STEP", "Step ids must be unique within a flow")
                    .with_fix_hint("Rename one of the steps."),
            )
    }

    /// The scheduler could not make progress.
    #[must_use]
    pub fn no_progress(remaining: Vec<String>) -> Self {
        Self::new(format!(
            "Layer scheduling made no progress; remaining steps: {}",
            remaining.join(", ")
        ))
        .with_steps(remaining)
        .with_info(ErrorInfo::new(
            "FLOW-SCHEDULER-STALLED",
            "No step could be placed in the next layer",
        ))
    }

    /// The advisory run timeout elapsed.
    #[must_use]
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::new(format!("Execution exceeded timeout of {timeout_ms}ms"))
            .with_info(ErrorInfo::new("FLOW-TIMEOUT", "Advisory execution timeout elapsed"))
    }

    /// Converts to the payload carried by `execution.failed`.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "message": self.message,
            "steps": self.steps,
        });
        if let (Some(info), serde_json::Value::Object(map)) = (&self.info, &mut payload) {
            map.insert(
                "errorInfo".to_string(),
                serde_json::to_value(info).unwrap_or(serde_json::Value::Null),
            );
        }
        payload
    }
}

/// Error raised while executing a single step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Step '{step_id}' failed: {message}")]
pub struct StepExecutionError {
    /// The failing step.
    pub step_id: String,
    /// Error category (e.g., "SimulatedFailure", "InputValidation").
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Structured error body, shaped by the component's error schema.
    pub data: Option<serde_json::Value>,
}

impl StepExecutionError {
    /// Creates a new step execution error.
    #[must_use]
    pub fn new(
        step_id: impl Into<String>,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            error_type: error_type.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured error body.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error data recorded in the step result and exposed as `steps.<id>.error`.
    #[must_use]
    pub fn to_error_data(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "type": self.error_type,
            "message": self.message,
            "stepId": self.step_id,
        });
        if let (Some(data), Some(fields)) = (&self.data, error.as_object_mut()) {
            fields.insert("data".to_string(), data.clone());
        }
        error
    }
}

/// Error raised when an expression cannot be parsed or resolved.
///
/// Never escapes the resolver: callers log it and substitute `null`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    /// The expression text is not valid.
    #[error("Parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the failure.
        offset: usize,
        /// Description of the problem.
        message: String,
    },

    /// A referenced step has no result yet.
    #[error("Step '{0}' has not produced a result")]
    StepNotExecuted(String),

    /// The reference does not name a known family or accessor.
    #[error("Malformed reference: {0}")]
    MalformedReference(String),
}

impl ExpressionError {
    /// Creates a parse error.
    #[must_use]
    pub fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }
}

/// Error raised when a request envelope is missing required fields.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid '{action}' request: missing required field '{field}'")]
pub struct RequestValidationError {
    /// The request action.
    pub action: String,
    /// The missing field.
    pub field: String,
}

impl RequestValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn missing(action: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("step", "my_step");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("step"), Some(&"my_step".to_string()));
    }

    #[test]
    fn test_duplicate_step_error() {
        let err = FlowExecutionError::duplicate_step("fetch");
        assert!(err.to_string().contains("'fetch'"));
        assert_eq!(err.steps, vec!["fetch".to_string()]);

        let payload = err.to_payload();
        assert_eq!(payload["errorInfo"]["code"], "FLOW-DUPLICATE-STEP");
    }

    #[test]
    fn test_step_error_data() {
        let err = StepExecutionError::new("charge", "SimulatedFailure", "card declined");
        let data = err.to_error_data();

        assert_eq!(data["type"], "SimulatedFailure");
        assert_eq!(data["message"], "card declined");
        assert_eq!(err.to_string(), "Step 'charge' failed: card declined");
        assert!(data.get("data").is_none());

        let data = err.with_data(serde_json::json!({ "code": "R01" })).to_error_data();
        assert_eq!(data["data"]["code"], "R01");
    }

    #[test]
    fn test_validation_error_message() {
        let err = RequestValidationError::missing("flow", "flowDefinition");
        assert_eq!(
            err.to_string(),
            "Invalid 'flow' request: missing required field 'flowDefinition'"
        );
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: FlowsimError = ExpressionError::StepNotExecuted("a".into()).into();
        assert!(matches!(err, FlowsimError::Expression(_)));
    }
}
