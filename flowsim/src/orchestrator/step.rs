//! Step workers.

use crate::config::EffectiveOptions;
use crate::errors::StepExecutionError;
use crate::events::{EventSink, EventType};
use crate::expression::{evaluate_condition, resolve_inputs, resolve_value, ResolutionScope, StaticScope};
use crate::model::{parse_output_route, StepDefinition, StepResult, TRIGGER_STEP_ID};
use crate::simulator::{step_seed, ComponentSimulator, SimulationRequest};
use crate::store::ExecutionRecord;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Config key holding context variable assignments.
pub const SET_CONTEXT_KEY: &str = "setContext";

/// Everything a step worker needs from its run.
#[derive(Clone)]
pub(crate) struct RunContext {
    pub record: Arc<ExecutionRecord>,
    pub sink: Arc<dyn EventSink>,
    pub simulator: Arc<dyn ComponentSimulator>,
    pub options: EffectiveOptions,
}

impl RunContext {
    pub fn emit(&self, event_type: EventType, data: Value) {
        self.record.emit(self.sink.as_ref(), event_type, data);
    }
}

/// Runs the trigger as step 0. Events are only emitted when `emit_events`
/// is set.
pub(crate) fn run_trigger(run: &RunContext, emit_events: bool) -> StepResult {
    let record = &run.record;
    let trigger = record.trigger_context();
    let started_at = crate::utils::iso_timestamp();
    let clock = Instant::now();

    if emit_events {
        run.emit(
            EventType::StepStarted,
            json!({
                "stepId": TRIGGER_STEP_ID,
                "componentFqn": trigger.component_fqn(),
                "input": record.trigger_input(),
                "executionOrder": 0,
            }),
        );
    }

    let output = trigger.normalize();
    let result = StepResult::success(
        TRIGGER_STEP_ID,
        trigger.component_fqn(),
        record.trigger_input().clone(),
        output.clone(),
    )
    .with_timing(started_at, crate::utils::iso_timestamp(), elapsed_ms(clock))
    .with_order(0);
    record.record_step_result(result.clone());

    if emit_events {
        run.emit(
            EventType::StepCompleted,
            json!({
                "stepId": TRIGGER_STEP_ID,
                "componentFqn": trigger.component_fqn(),
                "output": output,
                "durationMs": result.duration_ms,
                "simulatedDurationMs": 0,
                "executionOrder": 0,
            }),
        );
    }
    result
}

/// Runs one step of a layer and records its result.
pub(crate) async fn execute_step(
    run: RunContext,
    step: StepDefinition,
    order: usize,
    layer: usize,
) -> StepResult {
    let record = run.record.as_ref();
    let step_id = step.step_id.as_str();
    let (component_fqn, config) = record.flow().resolve_component(&step);

    let mut input = resolve_inputs(&step.inputs_map, record);
    for (key, value) in routed_inputs(record, step_id) {
        input.insert(key, value);
    }
    let input = Value::Object(input);

    if let Some(condition) = step.condition.as_deref() {
        if !evaluate_condition(condition, record) {
            debug!(
                execution_id = %record.execution_id(),
                step_id,
                layer,
                condition,
                "Condition false; skipping step"
            );
            let result = StepResult::skipped(step_id, component_fqn, input).with_order(order);
            record.record_step_result(result.clone());
            return result;
        }
    }

    record.set_current_step(Some(step_id));
    run.emit(
        EventType::StepStarted,
        json!({
            "stepId": step_id,
            "componentFqn": component_fqn,
            "input": input,
            "layer": layer,
            "executionOrder": order,
        }),
    );

    let started_at = crate::utils::iso_timestamp();
    let clock = Instant::now();
    let request = SimulationRequest::new(step_id, component_fqn.clone(), input.clone())
        .with_config(config.clone())
        .with_seed(step_seed(run.options.seed, step_id));

    match run.simulator.simulate(&request).await {
        Ok(simulated) => {
            tokio::time::sleep(run.options.scaled(simulated.simulated_duration_ms)).await;

            let result = StepResult::success(step_id, component_fqn.clone(), input, simulated.output.clone())
                .with_timing(started_at, crate::utils::iso_timestamp(), elapsed_ms(clock))
                .with_simulated_duration(simulated.simulated_duration_ms)
                .with_order(order);
            record.record_step_result(result.clone());
            apply_set_context(record, &config);

            debug!(
                execution_id = %record.execution_id(),
                step_id,
                layer,
                simulated_ms = simulated.simulated_duration_ms,
                "Step completed"
            );
            run.emit(
                EventType::StepCompleted,
                json!({
                    "stepId": step_id,
                    "componentFqn": component_fqn,
                    "output": simulated.output,
                    "durationMs": result.duration_ms,
                    "simulatedDurationMs": simulated.simulated_duration_ms,
                    "executionOrder": order,
                }),
            );
            result
        }
        Err(err) => fail_step(&run, step_id, &component_fqn, input, &err, started_at, clock, order),
    }
}

/// Records a failed step and emits `step.failed`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fail_step(
    run: &RunContext,
    step_id: &str,
    component_fqn: &str,
    input: Value,
    err: &StepExecutionError,
    started_at: String,
    clock: Instant,
    order: usize,
) -> StepResult {
    let record = run.record.as_ref();
    warn!(
        execution_id = %record.execution_id(),
        step_id,
        error_type = %err.error_type,
        "Step failed: {}", err.message
    );

    let error = err.to_error_data();
    let result = StepResult::failure(step_id, component_fqn, input, error.clone())
        .with_timing(started_at, crate::utils::iso_timestamp(), elapsed_ms(clock))
        .with_order(order);
    record.record_step_result(result.clone());

    run.emit(
        EventType::StepFailed,
        json!({
            "stepId": step_id,
            "componentFqn": component_fqn,
            "error": error,
            "durationMs": result.duration_ms,
            "executionOrder": order,
        }),
    );
    result
}

/// Inputs routed to `target` through other steps' `outputs_map`.
///
/// The route's output name selects what is sent: `error` sends the source's
/// error data, `output`/`outputs`/`result` the whole output, any other name
/// the matching output field. Sources without a result send nothing.
pub(crate) fn routed_inputs(record: &ExecutionRecord, target: &str) -> Map<String, Value> {
    let mut routed = Map::new();
    for source in &record.flow().steps {
        for (output_name, route) in &source.outputs_map {
            let Some((step_id, input_key)) = parse_output_route(route) else {
                continue;
            };
            if step_id != target {
                continue;
            }
            let Some(result) = record.step_result(&source.step_id) else {
                continue;
            };
            let value = match output_name.as_str() {
                "error" | "errors" => result.error.clone(),
                "output" | "outputs" | "result" => result.output.clone(),
                name => result.output.as_ref().and_then(|o| o.get(name)).cloned(),
            };
            if let Some(value) = value.filter(|v| !v.is_null()) {
                routed.insert(input_key, value);
            }
        }
    }
    routed
}

fn apply_set_context(record: &ExecutionRecord, config: &Map<String, Value>) {
    let Some(assignments) = config.get(SET_CONTEXT_KEY).and_then(Value::as_object) else {
        return;
    };
    for (name, expression) in assignments {
        let value = resolve_value(expression, record);
        record.set_context_variable(name.clone(), value);
    }
}

/// Simulates one step outside of any run.
///
/// String inputs are resolved against an empty scope, so references come
/// back as `null` and plain strings pass through.
pub(crate) async fn execute_single_step(
    simulator: &dyn ComponentSimulator,
    step: &StepDefinition,
    component_fqn: &str,
    input_data: &Map<String, Value>,
    config: Map<String, Value>,
    seed: u64,
) -> StepResult {
    let scope: &dyn ResolutionScope = &StaticScope::new();
    let input = Value::Object(resolve_inputs(input_data, scope));
    let started_at = crate::utils::iso_timestamp();
    let clock = Instant::now();
    let request = SimulationRequest::new(step.step_id.clone(), component_fqn, input.clone())
        .with_config(config)
        .with_seed(step_seed(seed, &step.step_id));

    let result = match simulator.simulate(&request).await {
        Ok(simulated) => StepResult::success(&*step.step_id, component_fqn, input, simulated.output)
            .with_simulated_duration(simulated.simulated_duration_ms),
        Err(err) => StepResult::failure(&*step.step_id, component_fqn, input, err.to_error_data()),
    };
    result.with_timing(started_at, crate::utils::iso_timestamp(), elapsed_ms(clock))
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}
