//! Component output simulation.
//!
//! Nothing here talks to a real system. A [`ComponentSimulator`] turns a
//! component FQN, its resolved input and config into a synthetic output and
//! a simulated duration. [`SyntheticSimulator`] is the shipped
//! implementation:
//!
//! 1. failure injection (`simulateFailure`, `failureRate`)
//! 2. required-key validation against the registered input and config
//!    schemas
//! 3. output from the registered output schema, else the standard-library
//!    catalog, else a generic echo
//!
//! Failures of a component with an error schema carry a synthesized error
//! body under `data`.

mod catalog;
mod registry;
mod schema_synth;
mod timing;

pub use catalog::StdComponent;
pub use registry::ComponentRegistry;
pub use schema_synth::synthesize;
pub use timing::{TimingModel, DURATION_OVERRIDE_KEY, NORMAL};

use crate::errors::StepExecutionError;
use crate::model::ComponentSchema;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Everything a simulator needs to fake one step.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    /// Step being simulated.
    pub step_id: String,
    /// Resolved component FQN.
    pub component_fqn: String,
    /// Resolved input.
    pub input: Value,
    /// Effective component config.
    pub config: Map<String, Value>,
    /// Seed for this step's random draws.
    pub seed: u64,
}

impl SimulationRequest {
    /// Creates a request with empty config and seed 0.
    #[must_use]
    pub fn new(step_id: impl Into<String>, component_fqn: impl Into<String>, input: Value) -> Self {
        Self {
            step_id: step_id.into(),
            component_fqn: component_fqn.into(),
            input,
            config: Map::new(),
            seed: 0,
        }
    }

    /// Sets the config.
    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Sets the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A successful simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedExecution {
    /// Synthetic output.
    pub output: Value,
    /// Duration the component pretends to take, before time scaling.
    pub simulated_duration_ms: u64,
}

/// Produces synthetic component results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComponentSimulator: Send + Sync {
    /// Simulates one component invocation.
    async fn simulate(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulatedExecution, StepExecutionError>;
}

/// Schema- and catalog-driven simulator.
#[derive(Debug, Clone)]
pub struct SyntheticSimulator {
    registry: Arc<ComponentRegistry>,
}

impl Default for SyntheticSimulator {
    fn default() -> Self {
        Self::new(Arc::new(ComponentRegistry::with_standard_library()))
    }
}

impl SyntheticSimulator {
    /// Creates a simulator backed by `registry`.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    fn run(&self, request: &SimulationRequest) -> Result<SimulatedExecution, StepExecutionError> {
        let schema = self.registry.get(&request.component_fqn);
        self.simulate_with(request, schema.as_ref()).map_err(|err| {
            match schema.as_ref().and_then(|s| s.error_schema.as_ref()) {
                Some(error_schema) if err.data.is_none() => err.with_data(synthesize(error_schema)),
                _ => err,
            }
        })
    }

    fn simulate_with(
        &self,
        request: &SimulationRequest,
        schema: Option<&ComponentSchema>,
    ) -> Result<SimulatedExecution, StepExecutionError> {
        let mut rng = StdRng::seed_from_u64(request.seed);
        let step_id = request.step_id.as_str();

        match request.config.get("simulateFailure") {
            Some(Value::Bool(true)) => {
                return Err(StepExecutionError::new(
                    step_id,
                    "SimulatedFailure",
                    "Simulated failure",
                ))
            }
            Some(Value::String(message)) if !message.is_empty() => {
                return Err(StepExecutionError::new(step_id, "SimulatedFailure", message.clone()))
            }
            _ => {}
        }

        if let Some(rate) = request.config.get("failureRate").and_then(Value::as_f64) {
            let rate = rate.clamp(0.0, 1.0);
            if rate > 0.0 && rng.gen::<f64>() < rate {
                return Err(StepExecutionError::new(
                    step_id,
                    "SimulatedFailure",
                    format!("Simulated failure (failure rate {rate})"),
                ));
            }
        }

        if let Some(schema) = schema {
            let missing: Vec<&str> = schema
                .required_inputs()
                .into_iter()
                .filter(|key| request.input.get(*key).map_or(true, Value::is_null))
                .collect();
            if !missing.is_empty() {
                return Err(StepExecutionError::new(
                    step_id,
                    "InputValidation",
                    format!("Missing required input(s): {}", missing.join(", ")),
                ));
            }

            let missing: Vec<&str> = schema
                .required_config()
                .into_iter()
                .filter(|key| request.config.get(*key).map_or(true, Value::is_null))
                .collect();
            if !missing.is_empty() {
                return Err(StepExecutionError::new(
                    step_id,
                    "ConfigValidation",
                    format!("Missing required config key(s): {}", missing.join(", ")),
                ));
            }
        }

        let component = StdComponent::from_fqn(&request.component_fqn);
        let model = component.map_or(NORMAL, StdComponent::timing);
        let duration = model.sample(&request.config, &mut rng);

        let output = match (
            schema.and_then(|s| s.output_schema.as_ref()),
            component,
        ) {
            (Some(output_schema), _) => synthesize(output_schema),
            (None, Some(component)) => {
                component.output(step_id, &request.input, &request.config, duration)?
            }
            (None, None) => json!({
                "result": "success",
                "data": request.input,
                "processedAt": crate::utils::iso_timestamp(),
            }),
        };

        Ok(SimulatedExecution {
            output,
            simulated_duration_ms: duration,
        })
    }
}

#[async_trait]
impl ComponentSimulator for SyntheticSimulator {
    async fn simulate(
        &self,
        request: &SimulationRequest,
    ) -> Result<SimulatedExecution, StepExecutionError> {
        self.run(request)
    }
}

/// Derives a per-step seed from a run seed, independent of scheduling order.
#[must_use]
pub fn step_seed(run_seed: u64, step_id: &str) -> u64 {
    // FNV-1a over the step id, folded into the run seed.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in step_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    run_seed ^ hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(fqn: &str, input: Value, config: Value) -> SimulationRequest {
        SimulationRequest::new("step", fqn, input)
            .with_config(config.as_object().cloned().unwrap_or_default())
            .with_seed(7)
    }

    #[tokio::test]
    async fn test_unknown_component_echoes_input() {
        let sim = SyntheticSimulator::default();
        let result = sim
            .simulate(&request("Acme:Custom", json!({ "a": 1 }), json!({})))
            .await
            .unwrap();

        assert_eq!(result.output["result"], json!("success"));
        assert_eq!(result.output["data"], json!({ "a": 1 }));
        assert!(result.output["processedAt"].is_string());
        assert!((100..=500).contains(&result.simulated_duration_ms));
    }

    #[tokio::test]
    async fn test_catalog_component() {
        let sim = SyntheticSimulator::default();
        let result = sim
            .simulate(&request("StdLib:Logger", json!({ "message": "hi" }), json!({})))
            .await
            .unwrap();
        assert_eq!(result.output["logged"], json!(true));
        assert_eq!(result.simulated_duration_ms, 2);
    }

    #[tokio::test]
    async fn test_output_schema_wins() {
        let registry = Arc::new(ComponentRegistry::with_standard_library());
        registry.register(
            ComponentSchema::new("Acme:Lookup").with_output_schema(json!({
                "type": "object",
                "properties": { "found": { "type": "boolean" } }
            })),
        );
        let sim = SyntheticSimulator::new(registry);

        let result = sim.simulate(&request("Acme:Lookup", json!({}), json!({}))).await.unwrap();
        assert_eq!(result.output, json!({ "found": true }));
    }

    #[tokio::test]
    async fn test_simulate_failure_flag_and_message() {
        let sim = SyntheticSimulator::default();

        let err = sim
            .simulate(&request("StdLib:HttpCall", json!({}), json!({ "simulateFailure": true })))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, "SimulatedFailure");

        let err = sim
            .simulate(&request("StdLib:HttpCall", json!({}), json!({ "simulateFailure": "503 from upstream" })))
            .await
            .unwrap_err();
        assert_eq!(err.message, "503 from upstream");
        assert_eq!(err.step_id, "step");
    }

    #[tokio::test]
    async fn test_failure_rate_extremes() {
        let sim = SyntheticSimulator::default();
        assert!(sim
            .simulate(&request("X", json!({}), json!({ "failureRate": 1.0 })))
            .await
            .is_err());
        assert!(sim
            .simulate(&request("X", json!({}), json!({ "failureRate": 0.0 })))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_required_inputs_checked() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register(
            ComponentSchema::new("Acme:Mailer")
                .with_input_schema(json!({ "required": ["to", "subject"] })),
        );
        let sim = SyntheticSimulator::new(registry);

        let err = sim
            .simulate(&request("Acme:Mailer", json!({ "to": "a@b", "subject": null }), json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, "InputValidation");
        assert_eq!(err.message, "Missing required input(s): subject");
    }

    #[tokio::test]
    async fn test_required_config_checked() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register(
            ComponentSchema::new("Acme:Queue")
                .with_config_schema(json!({ "required": ["queueName", "region"] })),
        );
        let sim = SyntheticSimulator::new(registry);

        let err = sim
            .simulate(&request("Acme:Queue", json!({}), json!({ "queueName": "jobs" })))
            .await
            .unwrap_err();
        assert_eq!(err.error_type, "ConfigValidation");
        assert_eq!(err.message, "Missing required config key(s): region");

        assert!(sim
            .simulate(&request("Acme:Queue", json!({}), json!({ "queueName": "jobs", "region": "eu" })))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_error_schema_shapes_failure_data() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register(
            ComponentSchema::new("Acme:Payments").with_error_schema(json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "example": "CARD_DECLINED" },
                    "retryable": { "type": "boolean" }
                }
            })),
        );
        let sim = SyntheticSimulator::new(registry);

        let err = sim
            .simulate(&request("Acme:Payments", json!({}), json!({ "simulateFailure": true })))
            .await
            .unwrap_err();
        assert_eq!(err.data, Some(json!({ "code": "CARD_DECLINED", "retryable": true })));
        assert_eq!(err.to_error_data()["data"]["code"], json!("CARD_DECLINED"));

        let err = SyntheticSimulator::default()
            .simulate(&request("Acme:Payments", json!({}), json!({ "simulateFailure": true })))
            .await
            .unwrap_err();
        assert_eq!(err.data, None);
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let sim = SyntheticSimulator::default();
        let a = sim.simulate(&request("Acme:X", json!({}), json!({}))).await.unwrap();
        let b = sim.simulate(&request("Acme:X", json!({}), json!({}))).await.unwrap();
        assert_eq!(a.simulated_duration_ms, b.simulated_duration_ms);
    }

    #[test]
    fn test_step_seed_differs_per_step() {
        assert_eq!(step_seed(1, "a"), step_seed(1, "a"));
        assert_ne!(step_seed(1, "a"), step_seed(1, "b"));
        assert_ne!(step_seed(1, "a"), step_seed(2, "a"));
    }
}
