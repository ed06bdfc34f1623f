//! Per-run mutable state.

use crate::events::{EventSink, EventType, StreamingEvent};
use crate::expression::ResolutionScope;
use crate::model::{ExecutionStatus, FlowDefinition, StepResult, StepStatus, TRIGGER_STEP_ID};
use crate::trigger::TriggerRuntimeContext;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// The state of one run.
///
/// Shared between the run's task, its step workers and status queries.
/// Every field is independently locked; no lock is held across an await.
#[derive(Debug)]
pub struct ExecutionRecord {
    execution_id: String,
    flow: FlowDefinition,
    trigger_input: Value,
    trigger_context: TriggerRuntimeContext,
    status: RwLock<ExecutionStatus>,
    step_results: RwLock<HashMap<String, StepResult>>,
    context_variables: RwLock<Map<String, Value>>,
    total_steps: usize,
    completed_steps: AtomicUsize,
    failed_steps: AtomicUsize,
    skipped_steps: AtomicUsize,
    next_order: AtomicUsize,
    current_step: RwLock<Option<String>>,
    started_at: String,
    started: Instant,
    completed_at: RwLock<Option<String>>,
    finished: RwLock<Option<Instant>>,
    final_output: RwLock<Option<Value>>,
    error: RwLock<Option<Value>>,
    sequence: Mutex<u64>,
    cancelled: AtomicBool,
    cancel_reason: RwLock<Option<String>>,
}

impl ExecutionRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(
        execution_id: impl Into<String>,
        flow: FlowDefinition,
        trigger_input: Value,
        trigger_context: TriggerRuntimeContext,
    ) -> Self {
        let total_steps = flow.steps.len() + 1;
        Self {
            execution_id: execution_id.into(),
            flow,
            trigger_input,
            trigger_context,
            status: RwLock::new(ExecutionStatus::Pending),
            step_results: RwLock::new(HashMap::new()),
            context_variables: RwLock::new(Map::new()),
            total_steps,
            completed_steps: AtomicUsize::new(0),
            failed_steps: AtomicUsize::new(0),
            skipped_steps: AtomicUsize::new(0),
            next_order: AtomicUsize::new(1),
            current_step: RwLock::new(None),
            started_at: crate::utils::iso_timestamp(),
            started: Instant::now(),
            completed_at: RwLock::new(None),
            finished: RwLock::new(None),
            final_output: RwLock::new(None),
            error: RwLock::new(None),
            sequence: Mutex::new(0),
            cancelled: AtomicBool::new(false),
            cancel_reason: RwLock::new(None),
        }
    }

    /// Seeds the context variables.
    #[must_use]
    pub fn with_context_variables(self, variables: Map<String, Value>) -> Self {
        *self.context_variables.write() = variables;
        self
    }

    /// Run id.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// The flow being run.
    #[must_use]
    pub const fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    /// Flow FQN.
    #[must_use]
    pub fn flow_name(&self) -> &str {
        &self.flow.name
    }

    /// Trigger input as received.
    #[must_use]
    pub const fn trigger_input(&self) -> &Value {
        &self.trigger_input
    }

    /// Trigger runtime context.
    #[must_use]
    pub const fn trigger_context(&self) -> &TriggerRuntimeContext {
        &self.trigger_context
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        *self.status.read()
    }

    /// Moves to `next` if the transition is legal. Returns false otherwise.
    ///
    /// Entering a terminal state stamps the completion time.
    pub fn transition_to(&self, next: ExecutionStatus) -> bool {
        let mut status = self.status.write();
        if !status.can_transition_to(next) {
            return false;
        }
        *status = next;
        if next.is_terminal() {
            self.mark_finished();
        }
        true
    }

    /// Cancels a running execution. Returns false if the run is not running.
    ///
    /// Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut status = self.status.write();
        if *status != ExecutionStatus::Running {
            return false;
        }
        *status = ExecutionStatus::Cancelled;
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            *self.cancel_reason.write() = Some(reason.into());
        }
        *self.completed_at.write() = Some(crate::utils::iso_timestamp());
        true
    }

    /// Returns true once [`cancel`](Self::cancel) has succeeded.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.read().clone()
    }

    fn mark_finished(&self) {
        *self.completed_at.write() = Some(crate::utils::iso_timestamp());
        *self.finished.write() = Some(Instant::now());
    }

    /// Time since the run settled: its terminal event was emitted, or it
    /// completed or failed. A cancelled run whose last layer is still
    /// recording has not settled yet.
    #[must_use]
    pub fn finished_for(&self) -> Option<std::time::Duration> {
        self.finished.read().map(|at| at.elapsed())
    }

    /// Milliseconds since the record was created.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Reserves the next execution order index. The trigger is always 0.
    pub fn next_execution_order(&self) -> usize {
        self.next_order.fetch_add(1, Ordering::SeqCst)
    }

    /// Stores a step result and bumps the matching counter.
    ///
    /// Skipped steps count as completed. Re-recording a step replaces the
    /// result; the counters move only if its status changed.
    pub fn record_step_result(&self, result: StepResult) {
        let status = result.status;
        let previous = self
            .step_results
            .write()
            .insert(result.step_id.clone(), result);
        if let Some(previous) = previous {
            if previous.status == status {
                return;
            }
            self.count(previous.status, false);
        }
        self.count(status, true);
    }

    fn count(&self, status: StepStatus, add: bool) {
        let bump = |counter: &AtomicUsize| {
            if add {
                counter.fetch_add(1, Ordering::SeqCst);
            } else {
                counter.fetch_sub(1, Ordering::SeqCst);
            }
        };
        match status {
            StepStatus::Success => bump(&self.completed_steps),
            StepStatus::Skipped => {
                bump(&self.completed_steps);
                bump(&self.skipped_steps);
            }
            StepStatus::Failure => bump(&self.failed_steps),
        }
    }

    /// A recorded step result.
    #[must_use]
    pub fn step_result(&self, step_id: &str) -> Option<StepResult> {
        self.step_results.read().get(step_id).cloned()
    }

    /// All recorded results in execution order.
    #[must_use]
    pub fn step_results(&self) -> Vec<StepResult> {
        let mut results: Vec<_> = self.step_results.read().values().cloned().collect();
        results.sort_by_key(|r| r.execution_order);
        results
    }

    /// Sets a context variable.
    pub fn set_context_variable(&self, name: impl Into<String>, value: Value) {
        self.context_variables.write().insert(name.into(), value);
    }

    /// Snapshot of the context variables.
    #[must_use]
    pub fn context_snapshot(&self) -> Map<String, Value> {
        self.context_variables.read().clone()
    }

    /// Marks the step currently being worked on.
    pub fn set_current_step(&self, step_id: Option<&str>) {
        *self.current_step.write() = step_id.map(str::to_string);
    }

    /// Steps in the run, the trigger included.
    #[must_use]
    pub const fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Succeeded plus skipped steps.
    #[must_use]
    pub fn completed_steps(&self) -> usize {
        self.completed_steps.load(Ordering::SeqCst)
    }

    /// Failed steps.
    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.failed_steps.load(Ordering::SeqCst)
    }

    /// Skipped steps.
    #[must_use]
    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps.load(Ordering::SeqCst)
    }

    /// Records the run's final output.
    pub fn set_final_output(&self, output: Value) {
        *self.final_output.write() = Some(output);
    }

    /// Records the run-level error payload.
    pub fn set_error(&self, error: Value) {
        *self.error.write() = Some(error);
    }

    /// Last assigned sequence number.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        *self.sequence.lock()
    }

    /// Assigns the next sequence number and delivers the event to `sink`
    /// before releasing the sequence lock.
    pub fn emit(&self, sink: &dyn EventSink, event_type: EventType, data: Value) -> StreamingEvent {
        let mut sequence = self.sequence.lock();
        *sequence += 1;
        let event = StreamingEvent::new(event_type, self.execution_id.clone(), *sequence, data);
        sink.try_emit(&event);
        if event_type.is_terminal() {
            *self.finished.write() = Some(Instant::now());
        }
        event
    }

    /// Read-only projection for status queries.
    #[must_use]
    pub fn status_view(&self) -> ExecutionStatusView {
        ExecutionStatusView {
            execution_id: self.execution_id.clone(),
            flow_name: self.flow.name.clone(),
            status: self.status(),
            total_steps: self.total_steps,
            completed_steps: self.completed_steps(),
            failed_steps: self.failed_steps(),
            skipped_steps: self.skipped_steps(),
            current_step: self.current_step.read().clone(),
            started_at: self.started_at.clone(),
            completed_at: self.completed_at.read().clone(),
            step_results: self.step_results(),
            context_variables: self.context_snapshot(),
            final_output: self.final_output.read().clone(),
            error: self.error.read().clone(),
            cancel_reason: self.cancel_reason(),
        }
    }
}

impl ResolutionScope for ExecutionRecord {
    fn step_result(&self, step_id: &str) -> Option<StepResult> {
        Self::step_result(self, step_id)
    }

    fn context_variables(&self) -> Map<String, Value> {
        self.context_snapshot()
    }

    fn is_step(&self, step_id: &str) -> bool {
        step_id == TRIGGER_STEP_ID || self.flow.step(step_id).is_some()
    }
}

/// Status query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusView {
    /// Run id.
    pub execution_id: String,
    /// Flow FQN.
    pub flow_name: String,
    /// Lifecycle status.
    pub status: ExecutionStatus,
    /// Steps in the run, the trigger included.
    pub total_steps: usize,
    /// Succeeded plus skipped steps.
    pub completed_steps: usize,
    /// Failed steps.
    pub failed_steps: usize,
    /// Skipped steps.
    pub skipped_steps: usize,
    /// Step in progress, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Start time (ISO 8601).
    pub started_at: String,
    /// End time (ISO 8601), once terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Results in execution order.
    pub step_results: Vec<StepResult>,
    /// Context variables.
    pub context_variables: Map<String, Value>,
    /// Final output, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,
    /// Run-level error, once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Why the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}
