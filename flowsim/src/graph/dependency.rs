//! Step dependency analysis.
//!
//! Dependencies come from three places: explicit `run_after` ordering,
//! references found in `inputs_map` values and the `condition`, and
//! `outputs_map` routes (the routed-to step depends on the routing step).

use crate::errors::FlowExecutionError;
use crate::expression::scan;
use crate::model::{parse_output_route, StepDefinition, TRIGGER_STEP_ID};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// A dependency of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    /// The trigger step. Always satisfied.
    Trigger,
    /// The flow context. Always satisfied.
    Context,
    /// Another step, by arena index.
    Step(usize),
}

impl DependencyRef {
    /// Whether this is a `trigger` or `context` sentinel.
    #[must_use]
    pub const fn is_sentinel(self) -> bool {
        matches!(self, Self::Trigger | Self::Context)
    }
}

/// A reference to a step id that is not declared in the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownReference {
    /// The step that holds the reference.
    pub step_id: String,
    /// The undeclared id.
    pub reference: String,
}

/// One step in the graph.
#[derive(Debug, Clone)]
pub struct StepNode {
    /// Step id.
    pub step_id: String,
    /// Dependencies, deduplicated, in discovery order.
    pub dependencies: Vec<DependencyRef>,
}

impl StepNode {
    /// Indexes of the steps this node depends on.
    pub fn step_dependencies(&self) -> impl Iterator<Item = usize> + '_ {
        self.dependencies.iter().filter_map(|dep| match dep {
            DependencyRef::Step(index) => Some(*index),
            _ => None,
        })
    }

    fn add(&mut self, dependency: DependencyRef) {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }
}

/// Dependency graph over a flow's steps, stored as an arena indexed in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<StepNode>,
    index: HashMap<String, usize>,
    cycles: Vec<Vec<String>>,
    unknown_references: Vec<UnknownReference>,
}

impl DependencyGraph {
    /// Builds the graph for `steps` and runs cycle detection.
    ///
    /// # Errors
    ///
    /// Returns an error if two steps share an id.
    pub fn analyze(steps: &[StepDefinition]) -> Result<Self, FlowExecutionError> {
        let mut graph = Self::default();

        for (i, step) in steps.iter().enumerate() {
            if graph.index.insert(step.step_id.clone(), i).is_some() {
                return Err(FlowExecutionError::duplicate_step(&step.step_id));
            }
            graph.nodes.push(StepNode {
                step_id: step.step_id.clone(),
                dependencies: Vec::new(),
            });
        }

        for (i, step) in steps.iter().enumerate() {
            for dep in &step.run_after {
                graph.link(i, dep);
            }

            let mut texts = Vec::new();
            for value in step.inputs_map.values() {
                collect_strings(value, &mut texts);
            }
            if let Some(condition) = &step.condition {
                texts.push(condition.as_str());
            }

            for text in texts {
                for id in scan::referenced_steps(text, |id| graph.index.contains_key(id)) {
                    graph.link(i, &id);
                }
                if scan::references_context(text) {
                    graph.nodes[i].add(DependencyRef::Context);
                }
            }
        }

        for (source, step) in steps.iter().enumerate() {
            for target in step.outputs_map.values() {
                match parse_output_route(target) {
                    Some((target_id, _)) => match graph.index.get(&target_id).copied() {
                        Some(t) => graph.nodes[t].add(DependencyRef::Step(source)),
                        None => graph.record_unknown(&step.step_id, &target_id),
                    },
                    None => warn!(
                        step_id = %step.step_id,
                        target = %target,
                        "Ignoring unparseable output route"
                    ),
                }
            }
        }

        graph.cycles = graph.detect_cycles();
        if !graph.cycles.is_empty() {
            warn!(cycles = ?graph.cycles, "Dependency cycles detected");
        }

        Ok(graph)
    }

    fn link(&mut self, from: usize, dep: &str) {
        if dep == TRIGGER_STEP_ID {
            self.nodes[from].add(DependencyRef::Trigger);
            return;
        }
        match self.index.get(dep).copied() {
            Some(to) => self.nodes[from].add(DependencyRef::Step(to)),
            None => {
                let step_id = self.nodes[from].step_id.clone();
                self.record_unknown(&step_id, dep);
            }
        }
    }

    fn record_unknown(&mut self, step_id: &str, reference: &str) {
        let unknown = UnknownReference {
            step_id: step_id.to_string(),
            reference: reference.to_string(),
        };
        if !self.unknown_references.contains(&unknown) {
            warn!(step_id = %step_id, reference = %reference, "Dropping reference to unknown step");
            self.unknown_references.push(unknown);
        }
    }

    /// Iterative DFS in declaration order. Every back edge yields one cycle,
    /// listed from the back-edge target to its source.
    fn detect_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            New,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut cycles = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::New {
                continue;
            }

            let mut path: Vec<usize> = vec![root];
            let mut cursors: Vec<usize> = vec![0];
            marks[root] = Mark::OnStack;

            while let Some(&node) = path.last() {
                let Some(cursor) = cursors.last_mut() else {
                    break;
                };
                let next = self.nodes[node].step_dependencies().nth(*cursor);
                *cursor += 1;

                match next {
                    Some(dep) => match marks[dep] {
                        Mark::New => {
                            marks[dep] = Mark::OnStack;
                            path.push(dep);
                            cursors.push(0);
                        }
                        Mark::OnStack => {
                            let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                            cycles.push(
                                path[start..]
                                    .iter()
                                    .map(|&n| self.nodes[n].step_id.clone())
                                    .collect(),
                            );
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        path.pop();
                        cursors.pop();
                    }
                }
            }
        }

        cycles
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the flow has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    /// Arena index of a step.
    #[must_use]
    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.index.get(step_id).copied()
    }

    /// Dependencies of a step, sentinels included.
    #[must_use]
    pub fn dependencies_of(&self, step_id: &str) -> Option<&[DependencyRef]> {
        self.index_of(step_id)
            .map(|i| self.nodes[i].dependencies.as_slice())
    }

    /// Step ids a step depends on, sentinels excluded.
    #[must_use]
    pub fn step_dependency_ids(&self, step_id: &str) -> Vec<&str> {
        self.index_of(step_id)
            .map(|i| {
                self.nodes[i]
                    .step_dependencies()
                    .map(|d| self.nodes[d].step_id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Detected cycles.
    #[must_use]
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// Whether any cycle was detected.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// References to undeclared step ids, dropped from the graph.
    #[must_use]
    pub fn unknown_references(&self) -> &[UnknownReference] {
        &self.unknown_references
    }

    /// Steps whose dependencies are empty or sentinel-only.
    #[must_use]
    pub fn independent_steps(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.dependencies.iter().all(|d| d.is_sentinel()))
            .map(|node| node.step_id.as_str())
            .collect()
    }
}

fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step(id: &str) -> StepDefinition {
        StepDefinition::new(id, "StdLib:Logger")
    }

    #[test]
    fn test_no_dependencies() {
        let graph = DependencyGraph::analyze(&[step("a"), step("b")]).unwrap();
        assert_eq!(graph.independent_steps(), vec!["a", "b"]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_run_after_and_references() {
        let steps = vec![
            step("a").with_input("url", "trigger.body.url"),
            step("b").with_input("id", "steps.a.outputs.id"),
            step("c")
                .after("a")
                .with_input("payload", json!({ "nested": ["b.result.value"] }))
                .with_condition("context.enabled"),
        ];
        let graph = DependencyGraph::analyze(&steps).unwrap();

        assert_eq!(graph.dependencies_of("a"), Some(&[DependencyRef::Trigger][..]));
        assert_eq!(graph.step_dependency_ids("b"), vec!["a"]);
        assert_eq!(graph.step_dependency_ids("c"), vec!["a", "b"]);
        assert!(graph
            .dependencies_of("c")
            .unwrap()
            .contains(&DependencyRef::Context));
        assert_eq!(graph.independent_steps(), vec!["a"]);
    }

    #[test]
    fn test_output_routes_add_dependencies() {
        let steps = vec![
            step("charge").with_output_route("error", "steps.alert.inputs.failure"),
            step("alert"),
        ];
        let graph = DependencyGraph::analyze(&steps).unwrap();
        assert_eq!(graph.step_dependency_ids("alert"), vec!["charge"]);
    }

    #[test]
    fn test_unknown_references_are_dropped() {
        let steps = vec![step("a").after("ghost").with_input("x", "steps.phantom.outputs.y")];
        let graph = DependencyGraph::analyze(&steps).unwrap();

        assert!(graph.dependencies_of("a").unwrap().is_empty());
        let unknown: Vec<&str> = graph
            .unknown_references()
            .iter()
            .map(|u| u.reference.as_str())
            .collect();
        assert_eq!(unknown, vec!["ghost", "phantom"]);
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let err = DependencyGraph::analyze(&[step("a"), step("a")]).unwrap_err();
        assert_eq!(err.steps, vec!["a".to_string()]);
    }

    #[test]
    fn test_two_node_cycle() {
        let steps = vec![step("x").after("y"), step("y").after("x")];
        let graph = DependencyGraph::analyze(&steps).unwrap();
        assert_eq!(graph.cycles(), &[vec!["x".to_string(), "y".to_string()]]);
    }

    #[test]
    fn test_self_loop_and_disconnected_components() {
        let steps = vec![
            step("solo").with_input("me", "steps.solo.outputs.prev"),
            step("p"),
            step("q").after("r"),
            step("r").after("q"),
        ];
        let graph = DependencyGraph::analyze(&steps).unwrap();
        assert_eq!(
            graph.cycles(),
            &[
                vec!["solo".to_string()],
                vec!["q".to_string(), "r".to_string()],
            ]
        );
    }

    #[test]
    fn test_long_chain_terminates_without_cycles() {
        let mut steps = vec![step("s0")];
        for i in 1..500 {
            steps.push(step(&format!("s{i}")).after(format!("s{}", i - 1)));
        }
        let graph = DependencyGraph::analyze(&steps).unwrap();
        assert!(!graph.has_cycles());
        assert_eq!(graph.len(), 500);
    }
}
