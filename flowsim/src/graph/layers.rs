//! Layer scheduling.
//!
//! Layer *i* holds every step whose dependencies were all placed in layers
//! `0..i`. The trigger and context are placed before layer 0. When cycles
//! leave no step ready, a few steps are forced into the next layer so the
//! plan always covers every step exactly once.

use super::dependency::DependencyGraph;
use crate::errors::FlowExecutionError;
use crate::model::StepDefinition;
use serde::Serialize;
use tracing::{debug, warn};

/// Most steps forced in one deadlock-breaking round.
pub const MAX_FORCED_PER_ROUND: usize = 3;

/// A set of steps that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLayer {
    /// Position of the layer, from 0.
    pub index: usize,
    /// Step ids in declaration order.
    pub step_ids: Vec<String>,
}

/// The scheduler's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Layers in execution order.
    pub layers: Vec<ExecutionLayer>,
    /// Cycles found by the dependency analysis.
    pub cycles: Vec<Vec<String>>,
    /// Steps placed by deadlock breaking, in the order they were forced.
    pub forced: Vec<String>,
}

impl ExecutionPlan {
    /// Analyzes `steps` and schedules them.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate step ids, or if scheduling stalls.
    pub fn for_steps(steps: &[StepDefinition]) -> Result<Self, FlowExecutionError> {
        let graph = DependencyGraph::analyze(steps)?;
        Self::build(&graph)
    }

    /// Schedules an analyzed graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a round places no step, which cannot happen for a
    /// non-empty remainder but is reported rather than looping.
    pub fn build(graph: &DependencyGraph) -> Result<Self, FlowExecutionError> {
        let nodes = graph.nodes();
        let mut placed = vec![false; nodes.len()];
        let mut remaining = nodes.len();
        let mut plan = Self {
            cycles: graph.cycles().to_vec(),
            ..Self::default()
        };

        while remaining > 0 {
            let unmet = |i: usize| {
                nodes[i]
                    .step_dependencies()
                    .filter(|&d| !placed[d])
                    .count()
            };

            let mut ready: Vec<usize> = (0..nodes.len())
                .filter(|&i| !placed[i] && unmet(i) == 0)
                .collect();

            if ready.is_empty() {
                ready = (0..nodes.len())
                    .filter(|&i| !placed[i] && unmet(i) <= 1)
                    .take(MAX_FORCED_PER_ROUND)
                    .collect();
                if ready.is_empty() {
                    ready.extend((0..nodes.len()).find(|&i| !placed[i]));
                }

                let forced: Vec<String> = ready.iter().map(|&i| nodes[i].step_id.clone()).collect();
                warn!(
                    layer = plan.layers.len(),
                    forced = ?forced,
                    "No step ready; forcing steps to break a dependency cycle"
                );
                plan.forced.extend(forced);
            }

            if ready.is_empty() {
                let stuck = (0..nodes.len())
                    .filter(|&i| !placed[i])
                    .map(|i| nodes[i].step_id.clone())
                    .collect();
                return Err(FlowExecutionError::no_progress(stuck));
            }

            for &i in &ready {
                placed[i] = true;
            }
            remaining -= ready.len();

            let layer = ExecutionLayer {
                index: plan.layers.len(),
                step_ids: ready.iter().map(|&i| nodes[i].step_id.clone()).collect(),
            };
            debug!(layer = layer.index, steps = ?layer.step_ids, "Scheduled layer");
            plan.layers.push(layer);
        }

        Ok(plan)
    }

    /// Number of scheduled steps across all layers.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.layers.iter().map(|l| l.step_ids.len()).sum()
    }

    /// Whether any step had to be forced.
    #[must_use]
    pub fn has_forced_steps(&self) -> bool {
        !self.forced.is_empty()
    }

    /// Layer index of a step.
    #[must_use]
    pub fn layer_of(&self, step_id: &str) -> Option<usize> {
        self.layers
            .iter()
            .find(|l| l.step_ids.iter().any(|s| s == step_id))
            .map(|l| l.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(id: &str) -> StepDefinition {
        StepDefinition::new(id, "StdLib:Logger")
    }

    fn layer_ids(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
        plan.layers
            .iter()
            .map(|l| l.step_ids.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_independent_steps_share_one_layer() {
        let plan = ExecutionPlan::for_steps(&[step("a"), step("b"), step("c")]).unwrap();
        assert_eq!(layer_ids(&plan), vec![vec!["a", "b", "c"]]);
        assert!(plan.cycles.is_empty());
    }

    #[test]
    fn test_chain_yields_one_layer_per_step() {
        let plan = ExecutionPlan::for_steps(&[step("a"), step("b").after("a"), step("c").after("b")])
            .unwrap();
        assert_eq!(layer_ids(&plan), vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_diamond() {
        let plan = ExecutionPlan::for_steps(&[
            step("root"),
            step("left").with_input("v", "steps.root.outputs.v"),
            step("right").with_input("v", "steps.root.outputs.v"),
            step("join").after("left").after("right"),
        ])
        .unwrap();
        assert_eq!(
            layer_ids(&plan),
            vec![vec!["root"], vec!["left", "right"], vec!["join"]]
        );
    }

    #[test]
    fn test_trigger_only_dependencies_are_ready() {
        let plan = ExecutionPlan::for_steps(&[step("a").with_input("x", "trigger.body")]).unwrap();
        assert_eq!(layer_ids(&plan), vec![vec!["a"]]);
    }

    #[test]
    fn test_cycle_is_broken_and_both_steps_placed() {
        let plan = ExecutionPlan::for_steps(&[step("x").after("y"), step("y").after("x")]).unwrap();

        let cycle = &plan.cycles[0];
        assert!(cycle.contains(&"x".to_string()) && cycle.contains(&"y".to_string()));
        assert_eq!(plan.step_count(), 2);
        assert_eq!(plan.forced, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(layer_ids(&plan), vec![vec!["x", "y"]]);
    }

    #[test]
    fn test_forcing_is_capped_per_round() {
        // Five mutually dependent steps: each needs the next.
        let ids = ["a", "b", "c", "d", "e"];
        let steps: Vec<StepDefinition> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| step(id).after(ids[(i + 1) % ids.len()]))
            .collect();
        let plan = ExecutionPlan::for_steps(&steps).unwrap();

        assert_eq!(plan.step_count(), 5);
        assert_eq!(layer_ids(&plan)[0], vec!["a", "b", "c"]);
        assert!(plan.layers[0].step_ids.len() <= MAX_FORCED_PER_ROUND);
    }

    #[test]
    fn test_first_remaining_step_forced_when_all_blocked_twice() {
        let steps = vec![
            step("a").after("b").after("c"),
            step("b").after("a").after("c"),
            step("c").after("a").after("b"),
        ];
        let plan = ExecutionPlan::for_steps(&steps).unwrap();
        assert_eq!(plan.forced[0], "a");
        assert_eq!(layer_ids(&plan)[0], vec!["a"]);
        assert_eq!(plan.step_count(), 3);
    }

    #[test]
    fn test_every_step_exactly_once_and_after_its_dependencies() {
        let steps = vec![
            step("load"),
            step("parse").after("load"),
            step("audit").with_condition("steps.parse.outputs.ok"),
            step("loop-a").after("loop-b").after("parse"),
            step("loop-b").after("loop-a"),
            step("report").with_input("all", "{ a: steps.audit.outputs.x, b: loop-b.data.y }"),
        ];
        let graph = DependencyGraph::analyze(&steps).unwrap();
        let plan = ExecutionPlan::build(&graph).unwrap();

        let mut seen: Vec<&str> = plan
            .layers
            .iter()
            .flat_map(|l| l.step_ids.iter().map(String::as_str))
            .collect();
        seen.sort_unstable();
        let mut expected: Vec<&str> = steps.iter().map(|s| s.step_id.as_str()).collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);

        for node in graph.nodes() {
            if plan.forced.contains(&node.step_id) {
                continue;
            }
            let own = plan.layer_of(&node.step_id).unwrap();
            for dep in graph.step_dependency_ids(&node.step_id) {
                assert!(plan.layer_of(dep).unwrap() < own, "{} before {}", dep, node.step_id);
            }
        }
    }

    #[test]
    fn test_empty_flow_has_no_layers() {
        let plan = ExecutionPlan::for_steps(&[]).unwrap();
        assert!(plan.layers.is_empty());
    }
}
