//! Evaluation of expressions against execution state.
//!
//! Resolution never fails. A reference to a step that has not run, or a
//! malformed path, is logged and becomes `null`; sibling inputs resolve
//! independently.

use super::ast::{BinaryOp, Expr, PathSegment, Reference, ReferenceRoot};
use super::parser::ExprParser;
use super::scan::{find_references, ReferenceSpan, ScannedTarget};
use crate::errors::ExpressionError;
use crate::model::{StepResult, TRIGGER_STEP_ID};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Read access to the state expressions resolve against.
pub trait ResolutionScope {
    /// Result recorded for a step, including the `trigger` step.
    fn step_result(&self, step_id: &str) -> Option<StepResult>;

    /// Snapshot of the flow context variables.
    fn context_variables(&self) -> Map<String, Value>;

    /// Whether `step_id` names a step of the flow. Decides whether a legacy
    /// `<id>.data` path is a reference or plain text.
    fn is_step(&self, step_id: &str) -> bool;
}

/// A self-contained scope over owned maps.
#[derive(Debug, Clone, Default)]
pub struct StaticScope {
    results: HashMap<String, StepResult>,
    context: Map<String, Value>,
    steps: HashSet<String>,
}

impl StaticScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a step id without a result.
    #[must_use]
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.steps.insert(step_id.into());
        self
    }

    /// Records a step result. The step counts as declared.
    #[must_use]
    pub fn with_result(mut self, result: StepResult) -> Self {
        self.steps.insert(result.step_id.clone());
        self.results.insert(result.step_id.clone(), result);
        self
    }

    /// Sets a context variable.
    #[must_use]
    pub fn with_context(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context.insert(name.into(), value);
        self
    }
}

impl ResolutionScope for StaticScope {
    fn step_result(&self, step_id: &str) -> Option<StepResult> {
        self.results.get(step_id).cloned()
    }

    fn context_variables(&self) -> Map<String, Value> {
        self.context.clone()
    }

    fn is_step(&self, step_id: &str) -> bool {
        step_id == TRIGGER_STEP_ID || self.steps.contains(step_id)
    }
}

/// Resolves every value of an input map.
#[must_use]
pub fn resolve_inputs(inputs: &Map<String, Value>, scope: &dyn ResolutionScope) -> Map<String, Value> {
    inputs
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, scope)))
        .collect()
}

/// Resolves a JSON value, descending into arrays and objects. Only strings
/// can carry references; other literals pass through.
#[must_use]
pub fn resolve_value(value: &Value, scope: &dyn ResolutionScope) -> Value {
    match value {
        Value::String(text) => resolve_str(text, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, scope)).collect()),
        Value::Object(map) => Value::Object(resolve_inputs(map, scope)),
        other => other.clone(),
    }
}

/// Resolves a string.
///
/// A string with no recognized reference is returned unchanged. A string
/// that parses as one expression evaluates to its value, which may be an
/// object or array. Anything else has each reference substituted in place.
#[must_use]
pub fn resolve_str(text: &str, scope: &dyn ResolutionScope) -> Value {
    let spans = live_references(text, scope);
    if spans.is_empty() {
        return Value::String(text.to_string());
    }

    match ExprParser::parse_str(unwrap_template(text.trim())) {
        Ok(expr) => evaluate(&expr, scope),
        Err(err) => {
            debug!(text = %text, error = %err, "Falling back to template substitution");
            substitute(text, &spans, scope)
        }
    }
}

/// Evaluates a condition. Empty conditions are true.
///
/// An unparseable condition is logged and treated as true, unless the raw
/// text is literally `false`.
#[must_use]
pub fn evaluate_condition(condition: &str, scope: &dyn ResolutionScope) -> bool {
    let trimmed = condition.trim();
    if trimmed.is_empty() {
        return true;
    }
    let inner = unwrap_template(trimmed);

    match ExprParser::parse_str(inner) {
        Ok(expr) => is_truthy(&evaluate(&expr, scope)),
        Err(err) => {
            warn!(condition = %condition, error = %err, "Could not parse condition; treating as true");
            !inner.eq_ignore_ascii_case("false")
        }
    }
}

/// Evaluates a parsed expression.
#[must_use]
pub fn evaluate(expr: &Expr, scope: &dyn ResolutionScope) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Text(text) => resolve_str(text, scope),
        Expr::Reference(reference) => match evaluate_reference(reference, scope) {
            Ok(value) => value,
            Err(err) => {
                debug!(reference = %reference.raw, error = %err, "Reference resolved to null");
                Value::Null
            }
        },
        Expr::Malformed(raw) => {
            warn!(
                error = %ExpressionError::MalformedReference(raw.clone()),
                "Reference resolved to null"
            );
            Value::Null
        }
        Expr::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(value, scope)))
                .collect(),
        ),
        Expr::Array(items) => Value::Array(items.iter().map(|e| evaluate(e, scope)).collect()),
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, scope))),
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, scope),
    }
}

/// JavaScript-style truthiness, with empty containers falsy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn evaluate_reference(
    reference: &Reference,
    scope: &dyn ResolutionScope,
) -> Result<Value, ExpressionError> {
    let root = match &reference.root {
        ReferenceRoot::StepOutput { step_id, legacy } => {
            if *legacy && !scope.is_step(step_id) {
                return Ok(Value::String(reference.raw.clone()));
            }
            executed(scope, step_id)?.output
        }
        ReferenceRoot::StepError(step_id) => executed(scope, step_id)?.error,
        ReferenceRoot::Trigger => executed(scope, TRIGGER_STEP_ID)?.output,
        ReferenceRoot::Context => Some(Value::Object(scope.context_variables())),
    };

    Ok(root.map_or(Value::Null, |value| navigate(&value, &reference.path)))
}

fn executed(scope: &dyn ResolutionScope, step_id: &str) -> Result<StepResult, ExpressionError> {
    scope
        .step_result(step_id)
        .ok_or_else(|| ExpressionError::StepNotExecuted(step_id.to_string()))
}

/// Walks `path` into `value`. Missing keys and out-of-range indexes give null.
#[must_use]
pub fn navigate(value: &Value, path: &[PathSegment]) -> Value {
    let mut current = value;
    for segment in path {
        let next = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key),
            (PathSegment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
            (PathSegment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn evaluate_binary(op: BinaryOp, left: &Expr, right: &Expr, scope: &dyn ResolutionScope) -> Value {
    match op {
        BinaryOp::Or => {
            Value::Bool(is_truthy(&evaluate(left, scope)) || is_truthy(&evaluate(right, scope)))
        }
        BinaryOp::And => {
            Value::Bool(is_truthy(&evaluate(left, scope)) && is_truthy(&evaluate(right, scope)))
        }
        _ => {
            let l = evaluate(left, scope);
            let r = evaluate(right, scope);
            let result = match op {
                BinaryOp::Eq => loose_eq(&l, &r),
                BinaryOp::Ne => !loose_eq(&l, &r),
                BinaryOp::Lt => compare(&l, &r) == Some(Ordering::Less),
                BinaryOp::Le => matches!(compare(&l, &r), Some(Ordering::Less | Ordering::Equal)),
                BinaryOp::Gt => compare(&l, &r) == Some(Ordering::Greater),
                BinaryOp::Ge => {
                    matches!(compare(&l, &r), Some(Ordering::Greater | Ordering::Equal))
                }
                BinaryOp::Or | BinaryOp::And => false,
            };
            Value::Bool(result)
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Equality where `"200" == 200` and `1 == 1.0`.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(left), as_number(right)), (Some(a), Some(b)) if a == b)
        }
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

/// Strips a `${ ... }` or `{{ ... }}` wrapper around the whole text.
fn unwrap_template(text: &str) -> &str {
    let inner = text
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .or_else(|| {
            text.strip_prefix("{{")
                .and_then(|rest| rest.strip_suffix("}}"))
        });
    match inner {
        Some(inner) if !inner.contains("${") && !inner.contains("{{") => inner.trim(),
        _ => text,
    }
}

/// Spans whose reference is real: legacy paths only count for known steps.
fn live_references(text: &str, scope: &dyn ResolutionScope) -> Vec<ReferenceSpan> {
    find_references(text)
        .into_iter()
        .filter(|span| match &span.target {
            ScannedTarget::LegacyStep(id) => scope.is_step(id),
            _ => true,
        })
        .collect()
}

fn substitute(text: &str, spans: &[ReferenceSpan], scope: &dyn ResolutionScope) -> Value {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for span in spans {
        out.push_str(&text[last..span.range.start]);
        let value = match ExprParser::parse_str(&span.reference) {
            Ok(expr) => evaluate(&expr, scope),
            Err(err) => {
                warn!(reference = %span.reference, error = %err, "Unparseable reference in template");
                Value::Null
            }
        };
        match value {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        last = span.range.end;
    }
    out.push_str(&text[last..]);

    // A structure that only became valid JSON after substitution is
    // returned as that structure.
    let trimmed = out.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(structured) = serde_json::from_str::<Value>(&out) {
            return structured;
        }
    }
    Value::String(out)
}
