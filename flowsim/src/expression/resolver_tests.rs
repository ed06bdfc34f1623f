//! Tests for expression resolution.

use super::resolver::*;
use crate::model::StepResult;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn scope() -> StaticScope {
    StaticScope::new()
        .with_result(StepResult::success(
            "trigger",
            "StdLib.Trigger:Http",
            Value::Null,
            json!({ "body": { "id": 7, "items": [{ "sku": "A1" }, { "sku": "B2" }] }, "headers": { "x-id": "abc" } }),
        ))
        .with_result(StepResult::success(
            "fetch",
            "StdLib:HttpCall",
            Value::Null,
            json!({ "statusCode": 200, "body": { "name": "Ada", "active": true }, "foo": 42 }),
        ))
        .with_result(StepResult::failure(
            "charge",
            "StdLib:HttpCall",
            Value::Null,
            json!({ "type": "SimulatedFailure", "message": "card declined" }),
        ))
        .with_step("later")
        .with_context("tenant", json!({ "id": "t-1", "tier": "gold" }))
}

#[test]
fn test_step_output_reference() {
    let s = scope();
    assert_eq!(resolve_str("steps.fetch.outputs.foo", &s), json!(42));
    assert_eq!(resolve_str("steps.fetch.outputs.body", &s), json!({ "name": "Ada", "active": true }));
}

#[test]
fn test_reference_before_step_ran_is_null() {
    assert_eq!(resolve_str("steps.later.outputs.foo", &scope()), Value::Null);
}

#[test]
fn test_missing_intermediate_key_is_null() {
    assert_eq!(resolve_str("steps.fetch.outputs.nope.deeper", &scope()), Value::Null);
}

#[test]
fn test_trigger_paths_and_indexes() {
    let s = scope();
    assert_eq!(resolve_str("trigger.body.id", &s), json!(7));
    assert_eq!(resolve_str("trigger.body.items.1.sku", &s), json!("B2"));
    assert_eq!(resolve_str("trigger.body.items[0].sku", &s), json!("A1"));
    assert_eq!(resolve_str("trigger.headers['x-id']", &s), json!("abc"));
}

#[test]
fn test_context_reference() {
    assert_eq!(resolve_str("context.tenant.tier", &scope()), json!("gold"));
}

#[test]
fn test_step_error_reference() {
    assert_eq!(resolve_str("steps.charge.error.message", &scope()), json!("card declined"));
    assert_eq!(resolve_str("steps.charge.outputs.anything", &scope()), Value::Null);
}

#[test]
fn test_legacy_forms_resolve_like_steps_prefix() {
    let s = scope();
    assert_eq!(resolve_str("fetch.outputs.foo", &s), json!(42));
    assert_eq!(resolve_str("fetch.result.body.name", &s), json!("Ada"));
    assert_eq!(resolve_str("fetch.data.statusCode", &s), json!(200));
}

#[test]
fn test_legacy_form_of_unknown_step_is_plain_text() {
    assert_eq!(resolve_str("report.data.csv", &scope()), json!("report.data.csv"));
}

#[test]
fn test_plain_strings_are_unchanged() {
    let s = scope();
    assert_eq!(resolve_str("hello world", &s), json!("hello world"));
    assert_eq!(resolve_str("{ status: active }", &s), json!("{ status: active }"));
}

#[test]
fn test_object_literal_with_references() {
    let value = resolve_str(
        "{ user: steps.fetch.outputs.body.name, \"active\": true, count: 3, missing: null, tag: vip }",
        &scope(),
    );
    assert_eq!(
        value,
        json!({ "user": "Ada", "active": true, "count": 3, "missing": null, "tag": "vip" })
    );
}

#[test]
fn test_object_literal_with_unquoted_values() {
    let value = resolve_str("{ date: 2024-01-01, id: steps.fetch.outputs.foo }", &scope());
    assert_eq!(value, json!({ "date": "2024-01-01", "id": 42 }));
}

#[test]
fn test_array_literal_with_references() {
    assert_eq!(
        resolve_str("[trigger.body.id, 2, 'x']", &scope()),
        json!([7, 2, "x"])
    );
}

#[test]
fn test_nested_literal_partial_failure() {
    let value = resolve_str(
        "{ ok: steps.fetch.outputs.foo, pending: steps.later.outputs.foo }",
        &scope(),
    );
    assert_eq!(value, json!({ "ok": 42, "pending": null }));
}

#[test]
fn test_template_fallback_substitutes_in_place() {
    let s = scope();
    assert_eq!(
        resolve_str("Hello ${steps.fetch.outputs.body.name}, you are #${trigger.body.id}", &s),
        json!("Hello Ada, you are #7")
    );
    assert_eq!(
        resolve_str("status: steps.fetch.outputs.statusCode", &s),
        json!("status: 200")
    );
}

#[test]
fn test_wrapped_single_reference_keeps_type() {
    assert_eq!(resolve_str("${steps.fetch.outputs.foo}", &scope()), json!(42));
    assert_eq!(resolve_str("{{ trigger.body.id }}", &scope()), json!(7));
}

#[test]
fn test_template_reconstructs_structure() {
    let value = resolve_str(r#"{"body": ${steps.fetch.outputs.body}}"#, &scope());
    assert_eq!(value, json!({ "body": { "name": "Ada", "active": true } }));
}

#[test]
fn test_quoted_string_inside_literal_is_resolved() {
    let value = resolve_str(r#"{ "greeting": "Hi ${steps.fetch.outputs.body.name}" }"#, &scope());
    assert_eq!(value, json!({ "greeting": "Hi Ada" }));
}

#[test]
fn test_resolve_inputs_recurses_into_json() {
    let inputs = json!({
        "literal": 5,
        "direct": "steps.fetch.outputs.foo",
        "nested": { "list": ["trigger.body.id", true] },
    });
    let Value::Object(map) = inputs else {
        unreachable!()
    };

    let resolved = resolve_inputs(&map, &scope());
    assert_eq!(
        Value::Object(resolved),
        json!({ "literal": 5, "direct": 42, "nested": { "list": [7, true] } })
    );
}

#[test]
fn test_malformed_steps_path_is_null() {
    assert_eq!(resolve_str("steps.fetch.inputs.url", &scope()), Value::Null);
}

#[test]
fn test_conditions() {
    let s = scope();
    assert!(evaluate_condition("steps.fetch.outputs.statusCode == 200", &s));
    assert!(evaluate_condition("steps.fetch.outputs.statusCode === '200'", &s));
    assert!(!evaluate_condition("steps.fetch.outputs.statusCode != 200", &s));
    assert!(evaluate_condition("trigger.body.id > 5 && trigger.body.id <= 7", &s));
    assert!(evaluate_condition("!steps.later.outputs.done", &s));
    assert!(evaluate_condition("(false || steps.fetch.outputs.body.active) && true", &s));
    assert!(!evaluate_condition("steps.fetch.outputs.body.missing", &s));
    assert!(evaluate_condition("${steps.fetch.outputs.body.active}", &s));
}

#[test]
fn test_condition_literals_and_fallback() {
    let s = scope();
    assert!(evaluate_condition("", &s));
    assert!(evaluate_condition("true", &s));
    assert!(!evaluate_condition("false", &s));
    assert!(evaluate_condition("this is not # parseable", &s));
}

#[test]
fn test_truthiness() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(!is_truthy(&json!([])));
    assert!(!is_truthy(&json!({})));
    assert!(is_truthy(&json!("no")));
    assert!(is_truthy(&json!(-1)));
}
