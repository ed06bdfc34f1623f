//! Expression syntax tree.

use serde_json::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal JSON value, including bare words that are not references.
    Literal(Value),
    /// Quoted string. References inside it are substituted on evaluation.
    Text(String),
    /// A reference into execution state.
    Reference(Reference),
    /// A `steps.*` path that names no known accessor. Evaluates to null.
    Malformed(String),
    /// Object literal; keys keep their source order.
    Object(Vec<(String, Expr)>),
    /// Array literal.
    Array(Vec<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Binary comparison or logical operator.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
}

/// Binary operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// What a reference is rooted at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRoot {
    /// Output of a step. `legacy` marks the `<id>.outputs|result|data` form,
    /// which only counts as a reference when the id names a known step.
    StepOutput {
        /// Step id.
        step_id: String,
        /// Whether the legacy shorthand was used.
        legacy: bool,
    },
    /// Error data of a failed step.
    StepError(String),
    /// Output of the trigger step.
    Trigger,
    /// Flow context variables.
    Context,
}

/// One navigation step into a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

/// A classified reference with the remaining navigation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Root of the reference.
    pub root: ReferenceRoot,
    /// Path below the root.
    pub path: Vec<PathSegment>,
    /// Source text, used when a legacy reference turns out to be a literal.
    pub raw: String,
}

impl Reference {
    /// Step id this reference depends on, if any. The trigger counts as the
    /// `trigger` step.
    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        match &self.root {
            ReferenceRoot::StepOutput { step_id, .. } | ReferenceRoot::StepError(step_id) => {
                Some(step_id)
            }
            ReferenceRoot::Trigger => Some(crate::model::TRIGGER_STEP_ID),
            ReferenceRoot::Context => None,
        }
    }
}

const OUTPUT_ACCESSORS: &[&str] = &["outputs", "output"];
const ERROR_ACCESSORS: &[&str] = &["error", "errors"];
const LEGACY_ACCESSORS: &[&str] = &["outputs", "result", "data"];

/// Classifies a dotted path into a reference, a literal, or a malformed
/// `steps.*` path.
#[must_use]
pub fn classify_path(segments: Vec<PathSegment>, raw: &str) -> Expr {
    let key_at = |i: usize| match segments.get(i) {
        Some(PathSegment::Key(k)) => Some(k.as_str()),
        _ => None,
    };

    let Some(head) = key_at(0) else {
        return Expr::Literal(Value::String(raw.to_string()));
    };

    if segments.len() == 1 {
        match head {
            "true" => return Expr::Literal(Value::Bool(true)),
            "false" => return Expr::Literal(Value::Bool(false)),
            "null" => return Expr::Literal(Value::Null),
            _ => {}
        }
    }

    let reference = |root: ReferenceRoot, skip: usize| {
        Expr::Reference(Reference {
            root,
            path: segments.iter().skip(skip).cloned().collect(),
            raw: raw.to_string(),
        })
    };

    match head {
        "steps" => match (key_at(1), key_at(2)) {
            (Some(id), Some(accessor)) if OUTPUT_ACCESSORS.contains(&accessor) => reference(
                ReferenceRoot::StepOutput {
                    step_id: id.to_string(),
                    legacy: false,
                },
                3,
            ),
            (Some(id), Some(accessor)) if ERROR_ACCESSORS.contains(&accessor) => {
                reference(ReferenceRoot::StepError(id.to_string()), 3)
            }
            _ if segments.len() == 1 => Expr::Literal(Value::String(raw.to_string())),
            _ => Expr::Malformed(raw.to_string()),
        },
        "trigger" => reference(ReferenceRoot::Trigger, 1),
        "context" => reference(ReferenceRoot::Context, 1),
        id => match key_at(1) {
            Some(accessor) if LEGACY_ACCESSORS.contains(&accessor) => reference(
                ReferenceRoot::StepOutput {
                    step_id: id.to_string(),
                    legacy: true,
                },
                2,
            ),
            _ => Expr::Literal(Value::String(raw.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(parts: &[&str]) -> Vec<PathSegment> {
        parts.iter().map(|p| PathSegment::Key((*p).to_string())).collect()
    }

    #[test]
    fn test_classify_step_output() {
        let expr = classify_path(keys(&["steps", "a", "outputs", "foo"]), "steps.a.outputs.foo");
        let Expr::Reference(r) = expr else {
            panic!("expected reference");
        };
        assert_eq!(
            r.root,
            ReferenceRoot::StepOutput {
                step_id: "a".into(),
                legacy: false
            }
        );
        assert_eq!(r.path, keys(&["foo"]));
        assert_eq!(r.step_id(), Some("a"));
    }

    #[test]
    fn test_classify_step_error() {
        let expr = classify_path(keys(&["steps", "a", "error", "message"]), "");
        assert!(matches!(
            expr,
            Expr::Reference(Reference { root: ReferenceRoot::StepError(ref id), .. }) if id == "a"
        ));
    }

    #[test]
    fn test_classify_malformed_steps_path() {
        let expr = classify_path(keys(&["steps", "a", "inputs"]), "steps.a.inputs");
        assert_eq!(expr, Expr::Malformed("steps.a.inputs".into()));
    }

    #[test]
    fn test_classify_legacy_and_literals() {
        let legacy = classify_path(keys(&["fetch", "result", "id"]), "fetch.result.id");
        assert!(matches!(
            legacy,
            Expr::Reference(Reference {
                root: ReferenceRoot::StepOutput { legacy: true, .. },
                ..
            })
        ));

        assert_eq!(
            classify_path(keys(&["active"]), "active"),
            Expr::Literal(Value::String("active".into()))
        );
        assert_eq!(classify_path(keys(&["true"]), "true"), Expr::Literal(Value::Bool(true)));
        assert_eq!(classify_path(keys(&["null"]), "null"), Expr::Literal(Value::Null));
    }

    #[test]
    fn test_trigger_reference_depends_on_trigger_step() {
        let expr = classify_path(keys(&["trigger", "body"]), "trigger.body");
        let Expr::Reference(r) = expr else {
            panic!("expected reference");
        };
        assert_eq!(r.step_id(), Some("trigger"));
    }
}
