//! Regex scanning for references embedded in arbitrary text.
//!
//! The dependency analyzer and the template fallback both need to find
//! references inside strings that are not themselves valid expressions,
//! such as `"Hello ${steps.greet.outputs.name}!"`.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

const REFERENCE_PATTERN: &str = r#"(?x)
    (?P<open>\$\{|\{\{)?\s*
    (?P<reference>
        (?:
            \bsteps\.(?P<step>[A-Za-z_$][\w$-]*)\.[\w$-]+
          | \b(?P<root>trigger|context)(?:\.[\w$-]+|\[\d+\]|\["[^"]*"\]|\['[^']*'\])
          | \b(?P<legacy>[A-Za-z_$][\w$-]*)\.(?:outputs|result|data)\b
        )
        (?:\.[\w$-]+|\[\d+\]|\["[^"]*"\]|\['[^']*'\])*
    )
"#;

fn reference_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(REFERENCE_PATTERN).ok())
        .as_ref()
}

/// What a reference found by the scanner points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedTarget {
    /// `steps.<id>.outputs|error...`
    Step(String),
    /// `<id>.outputs|result|data...`; only a reference if `<id>` is a step.
    LegacyStep(String),
    /// `trigger...`
    Trigger,
    /// `context...`
    Context,
}

/// A reference located in a larger string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpan {
    /// Byte range to replace, including `${ }` or `{{ }}` wrappers.
    pub range: Range<usize>,
    /// The reference text itself.
    pub reference: String,
    /// What it points at.
    pub target: ScannedTarget,
}

/// Finds every reference in `text`, left to right.
///
/// Wrappers are only absorbed into the span when both the opening and the
/// closing marker are present.
#[must_use]
pub fn find_references(text: &str) -> Vec<ReferenceSpan> {
    let Some(regex) = reference_regex() else {
        return Vec::new();
    };
    regex
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let reference = caps.name("reference")?;

            let target = if let Some(step) = caps.name("step") {
                ScannedTarget::Step(step.as_str().to_string())
            } else if let Some(root) = caps.name("root") {
                if root.as_str() == "trigger" {
                    ScannedTarget::Trigger
                } else {
                    ScannedTarget::Context
                }
            } else {
                ScannedTarget::LegacyStep(caps.name("legacy")?.as_str().to_string())
            };

            let range = caps
                .name("open")
                .and_then(|open| closing_end(text, reference.end(), open.as_str()))
                .map_or_else(|| reference.range(), |end| whole.start()..end);

            Some(ReferenceSpan {
                range,
                reference: reference.as_str().to_string(),
                target,
            })
        })
        .collect()
}

/// End of the marker closing `open` after `from`, if present.
fn closing_end(text: &str, from: usize, open: &str) -> Option<usize> {
    let close = if open == "{{" { "}}" } else { "}" };
    let rest = &text[from..];
    let trimmed = rest.trim_start();
    trimmed
        .starts_with(close)
        .then(|| from + (rest.len() - trimmed.len()) + close.len())
}

/// Step ids referenced by `text`, deduplicated in first-seen order.
///
/// Trigger references report the `trigger` step. Legacy references are
/// included only when `is_step` accepts the id.
pub fn referenced_steps(text: &str, is_step: impl Fn(&str) -> bool) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for span in find_references(text) {
        let id = match span.target {
            ScannedTarget::Step(id) => id,
            ScannedTarget::LegacyStep(id) if is_step(&id) => id,
            ScannedTarget::Trigger => crate::model::TRIGGER_STEP_ID.to_string(),
            ScannedTarget::LegacyStep(_) | ScannedTarget::Context => continue,
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

/// Whether `text` mentions the flow context.
#[must_use]
pub fn references_context(text: &str) -> bool {
    find_references(text)
        .iter()
        .any(|span| span.target == ScannedTarget::Context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_finds_step_references() {
        let spans = find_references("steps.fetch-user.outputs.body.id");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].target, ScannedTarget::Step("fetch-user".into()));
        assert_eq!(spans[0].reference, "steps.fetch-user.outputs.body.id");
    }

    #[test]
    fn test_wrapper_is_absorbed_only_when_closed() {
        let text = "Hello ${steps.a.outputs.name}!";
        let spans = find_references(text);
        assert_eq!(&text[spans[0].range.clone()], "${steps.a.outputs.name}");

        let text = "Hello ${steps.a.outputs.name";
        let spans = find_references(text);
        assert_eq!(&text[spans[0].range.clone()], "steps.a.outputs.name");
    }

    #[test]
    fn test_mustache_wrapper() {
        let text = "id={{ trigger.body.id }}";
        let spans = find_references(text);
        assert_eq!(spans[0].target, ScannedTarget::Trigger);
        assert_eq!(&text[spans[0].range.clone()], "{{ trigger.body.id }}");
    }

    #[test]
    fn test_bare_trigger_word_is_not_a_reference() {
        assert!(find_references("the trigger fired").is_empty());
        assert!(find_references("mytrigger.body").is_empty());
    }

    #[test]
    fn test_referenced_steps_dedup_and_legacy_filter() {
        let text = "{ a: steps.a.outputs.x, b: steps.a.error.message, c: user.data.name, d: note.data }";
        let ids = referenced_steps(text, |id| id == "user");
        assert_eq!(ids, vec!["a".to_string(), "user".to_string()]);
    }

    #[test]
    fn test_trigger_counts_as_step() {
        assert_eq!(referenced_steps("trigger.headers['x-id']", |_| true), vec!["trigger"]);
    }

    #[test]
    fn test_references_context() {
        assert!(references_context("context.tenant"));
        assert!(!references_context("steps.a.outputs.context"));
    }
}
