//! Run lifecycle.

use super::step::{self, RunContext};
use crate::config::{EngineConfig, ExecutionOptions};
use crate::errors::{FlowExecutionError, StepExecutionError};
use crate::events::{
    sse, ChannelEventSink, EventSink, EventType, FanoutEventSink, StreamingEvent,
};
use crate::graph::{ExecutionLayer, ExecutionPlan};
use crate::model::{
    resolve_component, ExecutionStatus, FlowDefinition, NamedComponent, StepDefinition, StepResult,
    TRIGGER_STEP_ID,
};
use crate::simulator::{ComponentSimulator, SyntheticSimulator};
use crate::store::{ExecutionContextStore, ExecutionRecord, ExecutionStatusView};
use crate::trigger::TriggerRuntimeContext;
use futures::future::join_all;
use futures::Stream;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// How a run ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Cancelled,
    Failed(FlowExecutionError),
}

/// Drives flow runs and answers status and cancel queries.
///
/// Each orchestrator owns its own [`ExecutionContextStore`].
pub struct FlowOrchestrator {
    config: EngineConfig,
    store: Arc<ExecutionContextStore>,
    simulator: Arc<dyn ComponentSimulator>,
    observers: Vec<Arc<dyn EventSink>>,
}

impl Default for FlowOrchestrator {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for FlowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOrchestrator")
            .field("config", &self.config)
            .field("executions", &self.store.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl FlowOrchestrator {
    /// Creates an orchestrator with the synthetic simulator.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(ExecutionContextStore::new(config.retention()));
        Self {
            config,
            store,
            simulator: Arc::new(SyntheticSimulator::default()),
            observers: Vec::new(),
        }
    }

    /// Replaces the component simulator.
    #[must_use]
    pub fn with_simulator(mut self, simulator: Arc<dyn ComponentSimulator>) -> Self {
        self.simulator = simulator;
        self
    }

    /// Adds a sink that sees the events of every run.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.observers.push(sink);
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The execution store.
    #[must_use]
    pub const fn store(&self) -> &Arc<ExecutionContextStore> {
        &self.store
    }

    /// Plans a flow without running it.
    pub fn plan(flow: &FlowDefinition) -> Result<ExecutionPlan, FlowExecutionError> {
        ExecutionPlan::for_steps(&flow.steps)
    }

    /// Starts a run and returns its event stream.
    ///
    /// The record is created and marked running, and `execution.started` is
    /// emitted, before this returns. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        flow: FlowDefinition,
        trigger_input: Value,
        options: &ExecutionOptions,
    ) -> ExecutionHandle {
        self.store.evict_expired();

        let execution_id = crate::utils::generate_execution_id();
        let trigger_context = TriggerRuntimeContext::new(flow.trigger.as_ref(), &trigger_input);
        let record = ExecutionRecord::new(execution_id.clone(), flow, trigger_input, trigger_context)
            .with_context_variables(options.context_variables.clone());
        record.transition_to(ExecutionStatus::Running);
        let record = self.store.create(record);

        let (channel, events) = ChannelEventSink::channel();
        let sink = self
            .observers
            .iter()
            .fold(FanoutEventSink::new().with_sink(Arc::new(channel)), |fanout, sink| {
                fanout.with_sink(Arc::clone(sink))
            });

        let run = RunContext {
            record,
            sink: Arc::new(sink),
            simulator: Arc::clone(&self.simulator),
            options: options.effective(&self.config),
        };

        info!(
            execution_id = %execution_id,
            flow = %run.record.flow_name(),
            seed = run.options.seed,
            "Execution started"
        );
        run.emit(
            EventType::ExecutionStarted,
            json!({
                "flowName": run.record.flow_name(),
                "triggerInput": run.record.trigger_input(),
                "triggerContext": run.record.trigger_context(),
                "flowDefinition": run.record.flow(),
                "totalSteps": run.record.total_steps(),
            }),
        );

        let span = info_span!("execution", execution_id = %execution_id);
        let task = tokio::spawn(execute_run(run).instrument(span));

        ExecutionHandle {
            execution_id,
            events,
            task,
        }
    }

    /// Status projection of a run; `None` for unknown or evicted ids.
    #[must_use]
    pub fn status(&self, execution_id: &str) -> Option<ExecutionStatusView> {
        self.store.status(execution_id)
    }

    /// Cancels a running execution. Returns false for unknown ids and runs
    /// that are not running.
    pub fn cancel(&self, execution_id: &str, reason: Option<&str>) -> bool {
        let cancelled = self
            .store
            .get(execution_id)
            .is_some_and(|record| record.cancel(reason.unwrap_or("Cancelled by request")));
        if cancelled {
            info!(execution_id, "Cancellation requested");
        }
        cancelled
    }

    /// Simulates a single step outside of any run.
    ///
    /// The step's `componentRef` resolves against `components` the same way
    /// it would inside a flow. `component_config` overrides the resolved
    /// config.
    pub async fn execute_step(
        &self,
        step: &StepDefinition,
        components: &[NamedComponent],
        input_data: Option<&Map<String, Value>>,
        component_config: Option<&Map<String, Value>>,
        options: &ExecutionOptions,
    ) -> StepResult {
        let input = input_data.unwrap_or(&step.inputs_map);
        let (component_fqn, mut config) = resolve_component(components, step);
        if let Some(overrides) = component_config {
            for (key, value) in overrides {
                config.insert(key.clone(), value.clone());
            }
        }
        let seed = options.effective(&self.config).seed;
        step::execute_single_step(self.simulator.as_ref(), step, &component_fqn, input, config, seed)
            .await
    }
}

/// A started run.
#[derive(Debug)]
pub struct ExecutionHandle {
    execution_id: String,
    events: mpsc::UnboundedReceiver<StreamingEvent>,
    task: JoinHandle<ExecutionStatus>,
}

impl ExecutionHandle {
    /// Run id.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<StreamingEvent> {
        self.events.recv().await
    }

    /// Collects events up to and including the terminal one.
    pub async fn collect_events(mut self) -> Vec<StreamingEvent> {
        let mut collected = Vec::new();
        while let Some(event) = self.events.recv().await {
            let terminal = event.event_type.is_terminal();
            collected.push(event);
            if terminal {
                break;
            }
        }
        collected
    }

    /// Waits for the run to finish and returns its final status.
    pub async fn wait(self) -> ExecutionStatus {
        self.task.await.unwrap_or_else(|err| {
            error!(error = %err, "Execution task did not complete");
            ExecutionStatus::Failed
        })
    }

    /// The run's events as a stream.
    pub fn into_stream(self) -> impl Stream<Item = StreamingEvent> {
        futures::stream::unfold(self.events, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    /// The run's events as SSE frames.
    pub fn into_sse_stream(self) -> impl Stream<Item = String> {
        futures::StreamExt::map(self.into_stream(), |event| sse::encode(&event))
    }
}

async fn execute_run(run: RunContext) -> ExecutionStatus {
    let record = Arc::clone(&run.record);
    let clock = Instant::now();

    let plan = match ExecutionPlan::for_steps(&record.flow().steps) {
        Ok(plan) => plan,
        Err(err) => return finish(&run, Outcome::Failed(err), clock),
    };
    if !plan.cycles.is_empty() {
        warn!(
            cycles = ?plan.cycles,
            forced = ?plan.forced,
            "Dependency cycles detected; forcing steps"
        );
        run.emit(
            EventType::ExecutionWarning,
            json!({
                "message": "Dependency cycles detected",
                "cycles": plan.cycles,
                "forcedSteps": plan.forced,
            }),
        );
    }

    let heartbeat = run.options.heartbeat_interval_ms.map(|ms| spawn_heartbeat(run.clone(), ms));

    let mut stopped = checkpoint(&run);
    if stopped.is_none() {
        step::run_trigger(&run, !record.flow().steps.is_empty());
        for layer in &plan.layers {
            stopped = checkpoint(&run);
            if stopped.is_some() {
                break;
            }
            execute_layer(&run, layer).await;
        }
    }
    let mut outcome = stopped.unwrap_or(Outcome::Completed);
    if matches!(outcome, Outcome::Completed) && record.is_cancelled() {
        outcome = Outcome::Cancelled;
    }
    record.set_current_step(None);

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
        let _ = heartbeat.await;
    }

    finish(&run, outcome, clock)
}

/// Stops the run if it was cancelled or its advisory timeout elapsed.
fn checkpoint(run: &RunContext) -> Option<Outcome> {
    if run.record.is_cancelled() {
        return Some(Outcome::Cancelled);
    }
    match run.options.timeout_ms {
        Some(timeout_ms) if run.record.elapsed_ms() >= timeout_ms => {
            Some(Outcome::Failed(FlowExecutionError::timed_out(timeout_ms)))
        }
        _ => None,
    }
}

async fn execute_layer(run: &RunContext, layer: &ExecutionLayer) {
    let record = run.record.as_ref();
    let steps: Vec<StepDefinition> = layer
        .step_ids
        .iter()
        .filter_map(|id| record.flow().step(id).cloned())
        .collect();

    tracing::debug!(layer = layer.index, steps = ?layer.step_ids, "Executing layer");

    let mut ids = Vec::with_capacity(steps.len());
    let mut handles = Vec::with_capacity(steps.len());
    for step in steps {
        let order = record.next_execution_order();
        ids.push((step.step_id.clone(), order));
        handles.push(tokio::spawn(step::execute_step(run.clone(), step, order, layer.index)));
    }

    for ((step_id, order), joined) in ids.into_iter().zip(join_all(handles).await) {
        if let Err(err) = joined {
            error!(step_id = %step_id, error = %err, "Step worker panicked");
            let fqn = record
                .flow()
                .step(&step_id)
                .map(|s| record.flow().resolve_component(s).0)
                .unwrap_or_default();
            let failure = StepExecutionError::new(&step_id, "InternalError", err.to_string());
            step::fail_step(
                run,
                &step_id,
                &fqn,
                Value::Null,
                &failure,
                crate::utils::iso_timestamp(),
                Instant::now(),
                order,
            );
        }
    }
}

fn spawn_heartbeat(run: RunContext, interval_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let record = run.record.as_ref();
            if record.status().is_terminal() {
                break;
            }
            run.emit(
                EventType::Heartbeat,
                json!({
                    "status": record.status(),
                    "completedSteps": record.completed_steps(),
                    "failedSteps": record.failed_steps(),
                    "totalSteps": record.total_steps(),
                    "elapsedMs": record.elapsed_ms(),
                }),
            );
        }
    })
}

fn finish(run: &RunContext, outcome: Outcome, clock: Instant) -> ExecutionStatus {
    let record = run.record.as_ref();
    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    let counts = json!({
        "totalSteps": record.total_steps(),
        "completedSteps": record.completed_steps(),
        "failedSteps": record.failed_steps(),
        "skippedSteps": record.skipped_steps(),
    });

    match outcome {
        Outcome::Completed => {
            let output = final_output(record);
            record.set_final_output(output.clone());
            if record.transition_to(ExecutionStatus::Completed) {
                info!(
                    completed = record.completed_steps(),
                    failed = record.failed_steps(),
                    duration_ms,
                    "Execution completed"
                );
                run.emit(
                    EventType::ExecutionCompleted,
                    merge(
                        counts,
                        json!({
                            "status": ExecutionStatus::Completed,
                            "output": output,
                            "contextVariables": record.context_snapshot(),
                            "durationMs": duration_ms,
                        }),
                    ),
                );
                return ExecutionStatus::Completed;
            }
        }
        Outcome::Failed(err) => {
            let payload = err.to_payload();
            record.set_error(payload.clone());
            if record.transition_to(ExecutionStatus::Failed) {
                error!(error = %err, duration_ms, "Execution failed");
                run.emit(
                    EventType::ExecutionFailed,
                    merge(
                        counts,
                        json!({
                            "status": ExecutionStatus::Failed,
                            "error": payload,
                            "durationMs": duration_ms,
                        }),
                    ),
                );
                return ExecutionStatus::Failed;
            }
        }
        Outcome::Cancelled => {}
    }

    // Either cancelled at a checkpoint or cancelled after the last one.
    info!(reason = ?record.cancel_reason(), duration_ms, "Execution cancelled");
    run.emit(
        EventType::ExecutionCancelled,
        json!({
            "status": ExecutionStatus::Cancelled,
            "reason": record.cancel_reason(),
            "totalSteps": record.total_steps(),
            "completedSteps": record.completed_steps(),
            "failedSteps": record.failed_steps(),
            "skippedSteps": record.skipped_steps(),
            "durationMs": duration_ms,
        }),
    );
    ExecutionStatus::Cancelled
}

/// The last declared step's value, or the trigger output for flows without
/// steps.
fn final_output(record: &ExecutionRecord) -> Value {
    let step_id = record
        .flow()
        .last_step()
        .map_or(TRIGGER_STEP_ID, |s| s.step_id.as_str());
    record
        .step_result(step_id)
        .map_or(Value::Null, |r| r.final_value())
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base), Value::Object(extra)) = (&mut base, extra) {
        base.extend(extra);
    }
    base
}
