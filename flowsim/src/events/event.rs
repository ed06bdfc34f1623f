//! Streaming event envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle event types emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// The run was accepted and its record created.
    #[serde(rename = "execution.started")]
    ExecutionStarted,
    /// A step (or the trigger) began.
    #[serde(rename = "step.started")]
    StepStarted,
    /// A step (or the trigger) produced an output.
    #[serde(rename = "step.completed")]
    StepCompleted,
    /// A step failed.
    #[serde(rename = "step.failed")]
    StepFailed,
    /// Every layer ran.
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    /// The orchestrator aborted the run.
    #[serde(rename = "execution.failed")]
    ExecutionFailed,
    /// The run was cancelled at a layer boundary.
    #[serde(rename = "execution.cancelled")]
    ExecutionCancelled,
    /// Non-fatal diagnostics such as dependency cycles.
    #[serde(rename = "execution.warning")]
    ExecutionWarning,
    /// Periodic liveness signal.
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution.started",
            Self::StepStarted => "step.started",
            Self::StepCompleted => "step.completed",
            Self::StepFailed => "step.failed",
            Self::ExecutionCompleted => "execution.completed",
            Self::ExecutionFailed => "execution.failed",
            Self::ExecutionCancelled => "execution.cancelled",
            Self::ExecutionWarning => "execution.warning",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Whether this event ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted | Self::ExecutionFailed | Self::ExecutionCancelled
        )
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::ExecutionStarted,
            Self::StepStarted,
            Self::StepCompleted,
            Self::StepFailed,
            Self::ExecutionCompleted,
            Self::ExecutionFailed,
            Self::ExecutionCancelled,
            Self::ExecutionWarning,
            Self::Heartbeat,
        ]
        .into_iter()
        .find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event in a run's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Run the event belongs to.
    pub execution_id: String,
    /// Emission time (ISO 8601).
    pub timestamp: String,
    /// Per-run sequence number, starting at 1.
    pub sequence: u64,
    /// Event payload.
    pub data: Value,
}

impl StreamingEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        event_type: EventType,
        execution_id: impl Into<String>,
        sequence: u64,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            execution_id: execution_id.into(),
            timestamp: crate::utils::iso_timestamp(),
            sequence,
            data,
        }
    }

    /// The `stepId` field of the payload, for step events.
    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        self.data.get("stepId").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventType::StepFailed).unwrap(),
            r#""step.failed""#
        );
        assert_eq!(EventType::parse("heartbeat"), Some(EventType::Heartbeat));
        assert_eq!(EventType::parse("stage.started"), None);
        assert!(EventType::ExecutionCancelled.is_terminal());
        assert!(!EventType::ExecutionWarning.is_terminal());
    }

    #[test]
    fn test_streaming_event_shape() {
        let event = StreamingEvent::new(
            EventType::StepStarted,
            "exec-1",
            3,
            json!({ "stepId": "fetch" }),
        );
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "step.started");
        assert_eq!(value["executionId"], "exec-1");
        assert_eq!(value["sequence"], 3);
        assert_eq!(event.step_id(), Some("fetch"));
    }
}
