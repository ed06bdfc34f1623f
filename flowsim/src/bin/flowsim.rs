//! Flowsim CLI - simulate flow definitions from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flowsim::config::{EngineConfig, ExecutionOptions};
use flowsim::events::sse;
use flowsim::graph::ExecutionPlan;
use flowsim::model::{FlowDefinition, StepDefinition};
use flowsim::observability::{init_tracing, TracingConfig};
use flowsim::orchestrator::FlowOrchestrator;
use flowsim::simulator::ComponentRegistry;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Flowsim - execution simulator for declarative flows.
#[derive(Parser)]
#[command(name = "flowsim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a flow and print its events
    Run {
        /// Path to the flow definition (JSON)
        file: String,

        /// Path to the trigger payload (JSON)
        #[arg(short, long)]
        trigger: Option<String>,

        /// Seed for reproducible runs
        #[arg(short, long)]
        seed: Option<u64>,

        /// Wall-clock scale for simulated durations (0 disables sleeping)
        #[arg(long)]
        time_scale: Option<f64>,

        /// Heartbeat interval in milliseconds
        #[arg(long)]
        heartbeat_ms: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Sse)]
        format: OutputFormat,
    },

    /// Print the execution layers of a flow
    Plan {
        /// Path to the flow definition (JSON)
        file: String,
    },

    /// Simulate a single step
    Step {
        /// Path to the step definition (JSON)
        file: String,

        /// Path to the input data (JSON object)
        #[arg(short, long)]
        input: Option<String>,

        /// Seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// List the built-in components
    Components,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Server-sent event frames
    Sse,
    /// One JSON event per line
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut tracing_config = TracingConfig::from_env();
    match cli.verbose {
        0 => {}
        1 => tracing_config = tracing_config.with_filter("flowsim=debug"),
        _ => tracing_config = tracing_config.with_filter("flowsim=trace"),
    }
    init_tracing(&tracing_config).context("Failed to initialize tracing")?;

    match cli.command {
        Commands::Run {
            file,
            trigger,
            seed,
            time_scale,
            heartbeat_ms,
            format,
        } => {
            let flow: FlowDefinition = read_json(&file)?;
            let trigger_input = trigger.map_or(Ok(Value::Null), |path| read_json(&path))?;

            let mut options = ExecutionOptions::new();
            if let Some(seed) = seed {
                options = options.with_seed(seed);
            }
            if let Some(scale) = time_scale {
                options = options.with_time_scale(scale);
            }
            if let Some(ms) = heartbeat_ms {
                options = options.with_heartbeat_ms(ms);
            }

            let engine = FlowOrchestrator::new(EngineConfig::from_env());
            let mut events = engine.start(flow, trigger_input, &options).into_stream();
            while let Some(event) = events.next().await {
                match format {
                    OutputFormat::Sse => print!("{}", sse::encode(&event)),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
                }
                if event.event_type.is_terminal() {
                    break;
                }
            }
        }
        Commands::Plan { file } => {
            let flow: FlowDefinition = read_json(&file)?;
            let plan = ExecutionPlan::for_steps(&flow.steps)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Step { file, input, seed } => {
            let step: StepDefinition = read_json(&file)?;
            let input: Option<Map<String, Value>> = input.map(|path| read_json(&path)).transpose()?;
            let mut options = ExecutionOptions::new();
            if let Some(seed) = seed {
                options = options.with_seed(seed);
            }

            let engine = FlowOrchestrator::default();
            let result = engine.execute_step(&step, &[], input.as_ref(), None, &options).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Components => {
            let registry = ComponentRegistry::with_standard_library();
            let listing: Vec<Value> = registry
                .list()
                .into_iter()
                .map(|schema| json!({ "fqn": schema.fqn, "description": schema.description }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}
