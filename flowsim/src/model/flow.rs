//! Flow, trigger and step definitions.
//!
//! Definitions are immutable inputs to a run. The wire format is camelCase;
//! snake_case aliases are accepted so hand-written fixtures stay readable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A named, declarative workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    /// Fully-qualified flow name.
    pub name: String,

    /// The trigger that starts the flow. Absent means a manual trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<TriggerDefinition>,

    /// Named component instances that steps may reference by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<NamedComponent>,

    /// Steps in declaration order.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    /// Creates an empty flow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: TriggerDefinition) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Registers a named component.
    #[must_use]
    pub fn with_component(mut self, component: NamedComponent) -> Self {
        self.components.push(component);
        self
    }

    /// Looks up a step by id.
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Returns the last declared step, whose result becomes the run's output.
    #[must_use]
    pub fn last_step(&self) -> Option<&StepDefinition> {
        self.steps.last()
    }

    /// Resolves a step's component reference against the flow's
    /// `components`. See [`resolve_component`].
    #[must_use]
    pub fn resolve_component(&self, step: &StepDefinition) -> (String, Map<String, Value>) {
        resolve_component(&self.components, step)
    }
}

/// Resolves a step's component reference to a component FQN and the
/// effective configuration.
///
/// A reference naming one of `components` resolves to that component's
/// type; its config is the base and the step's config overrides it key by
/// key. Any other reference is taken as an FQN.
#[must_use]
pub fn resolve_component(
    components: &[NamedComponent],
    step: &StepDefinition,
) -> (String, Map<String, Value>) {
    match components.iter().find(|c| c.name == step.component_ref) {
        Some(named) => {
            let mut config = named.config.clone();
            for (key, value) in &step.config {
                config.insert(key.clone(), value.clone());
            }
            (named.component_type.clone(), config)
        }
        None => (step.component_ref.clone(), step.config.clone()),
    }
}

/// A reusable, pre-configured component instance declared on a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedComponent {
    /// Name steps use as their `componentRef`.
    pub name: String,
    /// Component type FQN.
    #[serde(rename = "type", alias = "componentType", alias = "component_type")]
    pub component_type: String,
    /// Base configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NamedComponent {
    /// Creates a named component.
    #[must_use]
    pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            config: Map::new(),
        }
    }

    /// Adds a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// The entry point of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    /// Trigger type, either a short name (`Http`) or an FQN
    /// (`StdLib.Trigger:Http`).
    #[serde(rename = "type", alias = "triggerType", alias = "trigger_type")]
    pub trigger_type: String,

    /// Trigger configuration (path, method, schedule, event pattern...).
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl TriggerDefinition {
    /// Creates a trigger definition.
    #[must_use]
    pub fn new(trigger_type: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            config: Map::new(),
        }
    }

    /// Adds a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// A single unit of work in a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique id within the flow.
    #[serde(alias = "step_id")]
    pub step_id: String,

    /// Component type FQN or the name of a flow-level named component.
    #[serde(alias = "component_ref", alias = "component")]
    pub component_ref: String,

    /// Opaque component configuration.
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Input key to reference expression or literal.
    #[serde(default, alias = "inputs_map", alias = "inputs")]
    pub inputs_map: Map<String, Value>,

    /// Named output to target input, e.g. `error -> steps.handler.inputs.failure`.
    #[serde(default, alias = "outputs_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs_map: BTreeMap<String, String>,

    /// Steps that must finish before this one starts.
    #[serde(default, alias = "run_after", skip_serializing_if = "Vec::is_empty")]
    pub run_after: Vec<String>,

    /// Boolean expression gating execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl StepDefinition {
    /// Creates a step with no inputs or ordering hints.
    #[must_use]
    pub fn new(step_id: impl Into<String>, component_ref: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            component_ref: component_ref.into(),
            ..Self::default()
        }
    }

    /// Adds an input mapping.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs_map.insert(key.into(), value.into());
        self
    }

    /// Adds a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Adds an explicit ordering dependency.
    #[must_use]
    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.run_after.push(step_id.into());
        self
    }

    /// Sets the gating condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Routes a named output to another step's input.
    #[must_use]
    pub fn with_output_route(mut self, output: impl Into<String>, target: impl Into<String>) -> Self {
        self.outputs_map.insert(output.into(), target.into());
        self
    }
}

/// Parses an output route target into `(step_id, input_key)`.
///
/// Accepted forms: `steps.<id>.inputs.<key>`, `<id>.inputs.<key>` and
/// `<id>.<key>`.
#[must_use]
pub fn parse_output_route(target: &str) -> Option<(String, String)> {
    let trimmed = target.trim();
    let body = trimmed.strip_prefix("steps.").unwrap_or(trimmed);
    let mut parts = body.splitn(3, '.');
    let step_id = parts.next().filter(|s| !s.is_empty())?;
    let second = parts.next().filter(|s| !s.is_empty())?;

    match parts.next() {
        Some(key) if second == "inputs" && !key.is_empty() => {
            Some((step_id.to_string(), key.to_string()))
        }
        Some(_) => None,
        None => Some((step_id.to_string(), second.to_string())),
    }
}
