//! Canned behavior for the standard component library.

use super::timing::TimingModel;
use crate::errors::StepExecutionError;
use crate::expression::{navigate, PathSegment};
use crate::utils::{generate_event_id, generate_execution_id, iso_timestamp};
use serde_json::{json, Map, Value};

/// Standard library components the simulator knows how to fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdComponent {
    /// Outbound HTTP request.
    HttpCall,
    /// Field mapping between shapes.
    DataMapper,
    /// Validates data against a JSON schema.
    JsonSchemaValidator,
    /// Fans data out to parallel branches.
    Fork,
    /// Picks a case by value.
    Switch,
    /// Runs another flow.
    SubFlowInvoker,
    /// Writes a log line.
    Logger,
    /// Pauses the flow.
    Wait,
    /// Database query.
    DbQuery,
    /// Publishes to a message bus.
    MessagePublisher,
}

impl StdComponent {
    /// Every standard component.
    pub const ALL: [Self; 10] = [
        Self::HttpCall,
        Self::DataMapper,
        Self::JsonSchemaValidator,
        Self::Fork,
        Self::Switch,
        Self::SubFlowInvoker,
        Self::Logger,
        Self::Wait,
        Self::DbQuery,
        Self::MessagePublisher,
    ];

    /// Recognizes a component from its FQN (`StdLib:HttpCall`,
    /// `StdLib.Component:HttpCall`, `httpcall`...). Matching uses the last
    /// `:`/`.` separated segment, case-insensitively.
    #[must_use]
    pub fn from_fqn(fqn: &str) -> Option<Self> {
        let short = fqn
            .rsplit([':', '.'])
            .next()
            .unwrap_or(fqn)
            .to_ascii_lowercase();

        let component = match short.as_str() {
            "httpcall" | "httprequest" | "httpclient" => Self::HttpCall,
            "datamapper" | "mapper" | "transform" => Self::DataMapper,
            "jsonschemavalidator" | "schemavalidator" | "validator" => Self::JsonSchemaValidator,
            "fork" | "parallel" => Self::Fork,
            "switch" | "router" => Self::Switch,
            "subflowinvoker" | "subflow" => Self::SubFlowInvoker,
            "logger" | "log" => Self::Logger,
            "wait" | "delay" => Self::Wait,
            "dbquery" | "databasequery" | "database" => Self::DbQuery,
            "messagepublisher" | "publisher" | "publish" => Self::MessagePublisher,
            _ => return None,
        };
        Some(component)
    }

    /// Canonical FQN.
    #[must_use]
    pub const fn fqn(self) -> &'static str {
        match self {
            Self::HttpCall => "StdLib:HttpCall",
            Self::DataMapper => "StdLib:DataMapper",
            Self::JsonSchemaValidator => "StdLib:JsonSchemaValidator",
            Self::Fork => "StdLib:Fork",
            Self::Switch => "StdLib:Switch",
            Self::SubFlowInvoker => "StdLib:SubFlowInvoker",
            Self::Logger => "StdLib:Logger",
            Self::Wait => "StdLib:Wait",
            Self::DbQuery => "StdLib:DbQuery",
            Self::MessagePublisher => "StdLib:MessagePublisher",
        }
    }

    /// One-line description for the registry.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::HttpCall => "Calls an HTTP endpoint",
            Self::DataMapper => "Maps fields from one shape to another",
            Self::JsonSchemaValidator => "Validates data against a JSON schema",
            Self::Fork => "Splits execution into parallel branches",
            Self::Switch => "Routes on a value",
            Self::SubFlowInvoker => "Invokes another flow",
            Self::Logger => "Writes a log entry",
            Self::Wait => "Pauses for a configured duration",
            Self::DbQuery => "Runs a database query",
            Self::MessagePublisher => "Publishes a message to a topic",
        }
    }

    /// Duration model.
    #[must_use]
    pub const fn timing(self) -> TimingModel {
        match self {
            Self::HttpCall => TimingModel::ConfigFraction {
                key: "timeoutMs",
                fraction: 0.2,
                fallback_ms: 300,
            },
            Self::DataMapper => TimingModel::Fixed(20),
            Self::JsonSchemaValidator => TimingModel::Fixed(15),
            Self::Fork | Self::Switch => TimingModel::Fixed(5),
            Self::SubFlowInvoker => TimingModel::Range { min: 500, max: 2000 },
            Self::Logger => TimingModel::Fixed(2),
            Self::Wait => TimingModel::ConfigFraction {
                key: "durationMs",
                fraction: 1.0,
                fallback_ms: 1000,
            },
            Self::DbQuery => TimingModel::Range { min: 20, max: 200 },
            Self::MessagePublisher => TimingModel::Range { min: 10, max: 80 },
        }
    }

    /// Produces the canned output.
    ///
    /// # Errors
    ///
    /// The schema validator fails when required fields are missing.
    pub fn output(
        self,
        step_id: &str,
        input: &Value,
        config: &Map<String, Value>,
        duration_ms: u64,
    ) -> Result<Value, StepExecutionError> {
        let pick = |key: &str| input.get(key).or_else(|| config.get(key)).cloned();

        let output = match self {
            Self::HttpCall => {
                let method = pick("method")
                    .and_then(|m| m.as_str().map(str::to_ascii_uppercase))
                    .unwrap_or_else(|| "GET".to_string());
                json!({
                    "statusCode": config.get("expectedStatus").cloned().unwrap_or(json!(200)),
                    "headers": { "content-type": "application/json" },
                    "body": input.get("body").cloned().unwrap_or_else(|| json!({ "success": true, "data": input })),
                    "url": pick("url").unwrap_or(Value::Null),
                    "method": method,
                })
            }
            Self::DataMapper => json!({ "mappedData": map_fields(input, config) }),
            Self::JsonSchemaValidator => {
                let data = input.get("data").unwrap_or(input);
                let missing = missing_required(data, config);
                if !missing.is_empty() {
                    return Err(StepExecutionError::new(
                        step_id,
                        "ValidationError",
                        format!("Missing required field(s): {}", missing.join(", ")),
                    ));
                }
                json!({ "isValid": true, "validData": data, "errors": [] })
            }
            Self::Fork => {
                let branches: Vec<Value> = config
                    .get("branches")
                    .and_then(Value::as_array)
                    .map(|branches| {
                        branches
                            .iter()
                            .enumerate()
                            .map(|(i, b)| {
                                let name = b
                                    .as_str()
                                    .map(str::to_string)
                                    .or_else(|| b.get("name").and_then(Value::as_str).map(str::to_string))
                                    .unwrap_or_else(|| format!("branch-{i}"));
                                json!({ "branch": name, "data": input })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({ "branchCount": branches.len(), "branches": branches })
            }
            Self::Switch => select_case(input, config),
            Self::SubFlowInvoker => json!({
                "subFlowExecutionId": generate_execution_id(),
                "flowName": pick("flowName").or_else(|| pick("flowFqn")).unwrap_or(Value::Null),
                "status": "completed",
                "output": input,
            }),
            Self::Logger => {
                let level = pick("level").unwrap_or_else(|| json!("info"));
                let message = pick("message").unwrap_or_else(|| input.clone());
                tracing::debug!(step_id = %step_id, level = %level, message = %message, "Simulated log entry");
                json!({ "logged": true, "level": level, "message": message })
            }
            Self::Wait => json!({ "waitedMs": duration_ms, "resumedAt": iso_timestamp() }),
            Self::DbQuery => {
                let rows = config
                    .get("sampleRows")
                    .cloned()
                    .unwrap_or_else(|| json!([{ "id": 1 }]));
                let count = rows.as_array().map_or(0, Vec::len);
                json!({ "rows": rows, "rowCount": count, "query": pick("query").unwrap_or(Value::Null) })
            }
            Self::MessagePublisher => json!({
                "messageId": generate_event_id(),
                "topic": pick("topic").unwrap_or(Value::Null),
                "published": true,
                "publishedAt": iso_timestamp(),
            }),
        };
        Ok(output)
    }
}

/// Applies `config.mapping` (target key to dotted source path). Without a
/// mapping the input passes through.
fn map_fields(input: &Value, config: &Map<String, Value>) -> Value {
    let Some(mapping) = config
        .get("mapping")
        .or_else(|| config.get("mappings"))
        .and_then(Value::as_object)
    else {
        return input.clone();
    };

    let mapped: Map<String, Value> = mapping
        .iter()
        .map(|(target, source)| {
            let value = source.as_str().map_or_else(
                || source.clone(),
                |path| {
                    let segments: Vec<PathSegment> = path
                        .split('.')
                        .filter(|s| !s.is_empty())
                        .map(|s| PathSegment::Key(s.to_string()))
                        .collect();
                    navigate(input, &segments)
                },
            );
            (target.clone(), value)
        })
        .collect();
    Value::Object(mapped)
}

fn missing_required(data: &Value, config: &Map<String, Value>) -> Vec<String> {
    config
        .get("schema")
        .and_then(|s| s.get("required"))
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .filter(|key| data.get(*key).map_or(true, Value::is_null))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn select_case(input: &Value, config: &Map<String, Value>) -> Value {
    let value = input.get("value").unwrap_or(input);
    let as_text = |v: &Value| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let matched = config
        .get("cases")
        .and_then(Value::as_array)
        .and_then(|cases| {
            cases.iter().find_map(|case| {
                let when = case.get("value").or_else(|| case.get("when"))?;
                (as_text(when) == as_text(value)).then(|| {
                    case.get("name")
                        .or_else(|| case.get("target"))
                        .cloned()
                        .unwrap_or_else(|| when.clone())
                })
            })
        });

    match matched {
        Some(case) => json!({ "selectedCase": case, "matched": true, "value": value }),
        None => json!({
            "selectedCase": config.get("default").cloned().unwrap_or(json!("default")),
            "matched": false,
            "value": value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cfg(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_from_fqn_variants() {
        assert_eq!(StdComponent::from_fqn("StdLib:HttpCall"), Some(StdComponent::HttpCall));
        assert_eq!(StdComponent::from_fqn("StdLib.Component:dbquery"), Some(StdComponent::DbQuery));
        assert_eq!(StdComponent::from_fqn("Logger"), Some(StdComponent::Logger));
        assert_eq!(StdComponent::from_fqn("Acme:Billing"), None);
    }

    #[test]
    fn test_every_component_round_trips_its_fqn() {
        for component in StdComponent::ALL {
            assert_eq!(StdComponent::from_fqn(component.fqn()), Some(component));
        }
    }

    #[test]
    fn test_http_call_output() {
        let out = StdComponent::HttpCall
            .output("s", &json!({ "url": "https://api", "method": "post" }), &Map::new(), 0)
            .unwrap();
        assert_eq!(out["statusCode"], json!(200));
        assert_eq!(out["method"], json!("POST"));
        assert_eq!(out["url"], json!("https://api"));
    }

    #[test]
    fn test_data_mapper() {
        let out = StdComponent::DataMapper
            .output(
                "s",
                &json!({ "user": { "first": "Ada" } }),
                &cfg(json!({ "mapping": { "name": "user.first", "fixed": 3 } })),
                0,
            )
            .unwrap();
        assert_eq!(out, json!({ "mappedData": { "name": "Ada", "fixed": 3 } }));
    }

    #[test]
    fn test_validator_missing_fields_fail() {
        let config = cfg(json!({ "schema": { "required": ["id", "email"] } }));
        let err = StdComponent::JsonSchemaValidator
            .output("check", &json!({ "data": { "id": 1 } }), &config, 0)
            .unwrap_err();
        assert_eq!(err.error_type, "ValidationError");
        assert_eq!(err.message, "Missing required field(s): email");

        let ok = StdComponent::JsonSchemaValidator
            .output("check", &json!({ "data": { "id": 1, "email": "a@b" } }), &config, 0)
            .unwrap();
        assert_eq!(ok["isValid"], json!(true));
    }

    #[test]
    fn test_switch_selects_case() {
        let config = cfg(json!({
            "cases": [{ "value": "gold", "name": "vip" }, { "value": 2, "name": "two" }],
            "default": "standard"
        }));
        let out = StdComponent::Switch.output("s", &json!({ "value": "gold" }), &config, 0).unwrap();
        assert_eq!(out["selectedCase"], json!("vip"));

        let out = StdComponent::Switch.output("s", &json!({ "value": "2" }), &config, 0).unwrap();
        assert_eq!(out["selectedCase"], json!("two"));

        let out = StdComponent::Switch.output("s", &json!({ "value": "x" }), &config, 0).unwrap();
        assert_eq!(out["selectedCase"], json!("standard"));
        assert_eq!(out["matched"], json!(false));
    }

    #[test]
    fn test_fork_branches() {
        let out = StdComponent::Fork
            .output("s", &json!({ "n": 1 }), &cfg(json!({ "branches": ["a", { "name": "b" }, {}] })), 0)
            .unwrap();
        assert_eq!(out["branchCount"], json!(3));
        assert_eq!(out["branches"][2]["branch"], json!("branch-2"));
    }

    #[test]
    fn test_wait_reports_duration() {
        let out = StdComponent::Wait.output("s", &Value::Null, &Map::new(), 750).unwrap();
        assert_eq!(out["waitedMs"], json!(750));
    }
}
