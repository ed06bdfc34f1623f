//! Trigger normalization.
//!
//! The trigger runs as step 0 of every flow. Its output is the caller's
//! trigger input reshaped into the canonical form for the trigger type, so
//! `trigger.<path>` references look the same no matter how the run was
//! started.

use crate::model::TriggerDefinition;
use crate::utils::{format_iso8601, parse_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Component FQN recorded for the trigger's step result.
pub const MANUAL_TRIGGER_FQN: &str = "StdLib.Trigger:Manual";

/// The trigger families the engine knows how to normalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    /// Inbound HTTP request.
    Http,
    /// Time-based schedule.
    Scheduled,
    /// Message from an event bus.
    EventBus,
    /// Started by hand, also the fallback for absent or unknown triggers.
    #[default]
    Manual,
}

impl TriggerKind {
    /// Recognizes short names (`Http`) and FQNs (`StdLib.Trigger:Http`,
    /// `StdLib:HttpTrigger`). Returns `None` for unknown types.
    #[must_use]
    pub fn from_type(trigger_type: &str) -> Option<Self> {
        let name = trigger_type
            .rsplit([':', '.'])
            .next()
            .unwrap_or(trigger_type)
            .to_ascii_lowercase();
        let name = name
            .strip_suffix("trigger")
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&name);

        match name {
            "http" | "webhook" | "rest" => Some(Self::Http),
            "scheduled" | "schedule" | "cron" | "timer" => Some(Self::Scheduled),
            "eventbus" | "event" | "message" => Some(Self::EventBus),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    /// Canonical FQN.
    #[must_use]
    pub const fn fqn(&self) -> &'static str {
        match self {
            Self::Http => "StdLib.Trigger:Http",
            Self::Scheduled => "StdLib.Trigger:Scheduled",
            Self::EventBus => "StdLib.Trigger:EventBus",
            Self::Manual => MANUAL_TRIGGER_FQN,
        }
    }

    /// Reshapes a caller-supplied trigger input into this kind's canonical
    /// output.
    #[must_use]
    pub fn normalize(&self, config: &Map<String, Value>, input: &Value) -> Value {
        match self {
            Self::Http => normalize_http(config, input),
            Self::Scheduled => normalize_scheduled(config, input),
            Self::EventBus => normalize_event_bus(config, input),
            Self::Manual => normalize_manual(input),
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "Http"),
            Self::Scheduled => write!(f, "Scheduled"),
            Self::EventBus => write!(f, "EventBus"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

/// How a run was activated. Echoed in `execution.started`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRuntimeContext {
    /// Trigger type as declared, or the manual FQN.
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// Normalization family.
    pub kind: TriggerKind,
    /// Trigger configuration.
    pub config: Map<String, Value>,
    /// Activation time (ISO 8601).
    pub activated_at: String,
    /// The trigger input exactly as received.
    pub original_event: Value,
}

impl TriggerRuntimeContext {
    /// Builds the runtime context for a run, defaulting to a manual trigger.
    #[must_use]
    pub fn new(definition: Option<&TriggerDefinition>, input: &Value) -> Self {
        let (trigger_type, kind, config) = match definition {
            Some(def) => {
                let kind = TriggerKind::from_type(&def.trigger_type).unwrap_or_else(|| {
                    tracing::warn!(
                        trigger_type = %def.trigger_type,
                        "Unknown trigger type; treating as manual"
                    );
                    TriggerKind::Manual
                });
                (def.trigger_type.clone(), kind, def.config.clone())
            }
            None => (MANUAL_TRIGGER_FQN.to_string(), TriggerKind::Manual, Map::new()),
        };

        Self {
            trigger_type,
            kind,
            config,
            activated_at: crate::utils::iso_timestamp(),
            original_event: input.clone(),
        }
    }

    /// FQN recorded for the trigger's step result.
    #[must_use]
    pub fn component_fqn(&self) -> &str {
        &self.trigger_type
    }

    /// The canonical trigger output.
    #[must_use]
    pub fn normalize(&self) -> Value {
        self.kind.normalize(&self.config, &self.original_event)
    }
}

fn field<'a>(input: &'a Value, key: &str) -> Option<&'a Value> {
    input.get(key).filter(|v| !v.is_null())
}

fn text(input: &Value, config: &Map<String, Value>, key: &str, default: &str) -> String {
    field(input, key)
        .or_else(|| config.get(key))
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Canonical RFC 3339 form of a time field given as a string or epoch
/// number. Unparseable strings pass through unchanged.
fn time_field(input: &Value, config: &Map<String, Value>, key: &str, default: &str) -> String {
    let raw = match field(input, key).or_else(|| config.get(key)) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return default.to_string(),
    };
    parse_timestamp(&raw).map_or(raw, |ts| format_iso8601(&ts))
}

fn object_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    }
}

const HTTP_KEYS: [&str; 9] = [
    "path",
    "method",
    "headers",
    "queryParameters",
    "query",
    "body",
    "remoteAddress",
    "userAgent",
    "principal",
];

fn normalize_http(config: &Map<String, Value>, input: &Value) -> Value {
    let headers: Map<String, Value> = input
        .get("headers")
        .and_then(Value::as_object)
        .map(|h| {
            h.iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    let is_envelope = input
        .as_object()
        .is_some_and(|map| HTTP_KEYS.iter().any(|key| map.contains_key(*key)));
    let body = if is_envelope {
        input.get("body").cloned().unwrap_or(Value::Null)
    } else {
        input.clone()
    };

    let user_agent = field(input, "userAgent")
        .or_else(|| headers.get("user-agent"))
        .and_then(Value::as_str)
        .map_or_else(
            || format!("flowsim/{}", env!("CARGO_PKG_VERSION")),
            str::to_string,
        );

    let mut output = json!({
        "path": text(input, config, "path", "/"),
        "method": text(input, config, "method", "POST").to_ascii_uppercase(),
        "headers": headers,
        "queryParameters": object_or_empty(field(input, "queryParameters").or_else(|| field(input, "query"))),
        "body": body,
        "remoteAddress": text(input, config, "remoteAddress", "127.0.0.1"),
        "userAgent": user_agent,
        "timestamp": text(input, config, "timestamp", &crate::utils::iso_timestamp()),
    });
    if let (Some(principal), Value::Object(map)) = (field(input, "principal"), &mut output) {
        map.insert("principal".to_string(), principal.clone());
    }
    output
}

fn normalize_scheduled(config: &Map<String, Value>, input: &Value) -> Value {
    let now = crate::utils::iso_timestamp();
    let payload = field(input, "payload")
        .or_else(|| config.get("payload"))
        .cloned()
        .unwrap_or_else(|| match input {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        });

    json!({
        "triggerTime": time_field(input, config, "triggerTime", &now),
        "scheduledTime": time_field(input, config, "scheduledTime", &now),
        "payload": payload,
    })
}

fn normalize_event_bus(config: &Map<String, Value>, input: &Value) -> Value {
    let event = field(input, "event").unwrap_or(input);
    let payload = field(event, "payload")
        .or_else(|| field(event, "data"))
        .cloned()
        .unwrap_or_else(|| event.clone());

    json!({
        "event": {
            "id": text(event, &Map::new(), "id", &crate::utils::generate_event_id()),
            "type": field(event, "type")
                .or_else(|| config.get("eventType"))
                .and_then(Value::as_str)
                .unwrap_or("flowsim.event"),
            "source": text(event, config, "source", "flowsim"),
            "timestamp": text(event, &Map::new(), "timestamp", &crate::utils::iso_timestamp()),
            "payload": payload,
        }
    })
}

fn normalize_manual(input: &Value) -> Value {
    let initial = field(input, "initialData").unwrap_or(input);
    json!({ "initialData": initial })
}
