//! Benchmarks for dependency analysis and layering.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flowsim::expression::{resolve_str, StaticScope};
use flowsim::graph::{DependencyGraph, ExecutionPlan};
use flowsim::model::{StepDefinition, StepResult};
use serde_json::json;

/// A chain of `width`-wide layers where every step reads from the
/// previous layer.
fn layered_steps(depth: usize, width: usize) -> Vec<StepDefinition> {
    let mut steps = Vec::with_capacity(depth * width);
    for layer in 0..depth {
        for i in 0..width {
            let mut step = StepDefinition::new(format!("s{layer}_{i}"), "StdLib:DataMapper");
            if layer > 0 {
                step = step.with_input(
                    "value",
                    format!("steps.s{}_{i}.outputs.mappedData", layer - 1),
                );
            }
            steps.push(step);
        }
    }
    steps
}

fn scheduler_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for (depth, width) in [(5, 4), (20, 10), (50, 20)] {
        let steps = layered_steps(depth, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{depth}x{width}")),
            &steps,
            |b, steps| b.iter(|| ExecutionPlan::for_steps(black_box(steps))),
        );
    }
    group.finish();

    let steps = layered_steps(20, 10);
    c.bench_function("analyze", |b| {
        b.iter(|| DependencyGraph::analyze(black_box(&steps)));
    });
}

fn resolver_benchmark(c: &mut Criterion) {
    let scope = StaticScope::new().with_result(StepResult::success(
        "fetch",
        "StdLib:HttpCall",
        json!({}),
        json!({ "body": { "name": "Ada", "items": [1, 2, 3] } }),
    ));
    c.bench_function("resolve_reference", |b| {
        b.iter(|| resolve_str(black_box("steps.fetch.outputs.body.items[1]"), &scope));
    });
    c.bench_function("resolve_template", |b| {
        b.iter(|| resolve_str(black_box("Hello ${steps.fetch.outputs.body.name}!"), &scope));
    });
}

criterion_group!(benches, scheduler_benchmark, resolver_benchmark);
criterion_main!(benches);
