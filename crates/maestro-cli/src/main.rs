//! `maestro` command-line front end: runs workflows, delegates single tasks,
//! and prints monitoring snapshots against a registry of reference workers.

use clap::{Parser, Subcommand};
use maestro_core::{Capability, Payload};
use maestro_orchestrator::{
    DelegationRequest, Orchestrator, OrchestratorConfig, Priority, WorkflowDefinition,
};
use maestro_workers::{EchoWorker, WorkerRegistry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-worker task orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow definition (JSON) to completion
    Run {
        /// Path to the workflow definition
        workflow: PathBuf,
    },
    /// Delegate a single ad-hoc task and wait for its outcome
    Delegate {
        /// Target capability (email, schedule, knowledge, content)
        #[arg(short = 'C', long)]
        capability: String,
        /// Task priority (urgent, high, normal, low, background)
        #[arg(short, long, default_value = "normal")]
        priority: String,
        /// Task input as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    /// Print metrics, stats, and worker health
    Monitor,
}

/// Everything read from the config file.
#[derive(Debug, Default)]
struct Settings {
    orchestrator: OrchestratorConfig,
    /// Per-capability worker settings from `[workers.<capability>]` tables.
    workers: HashMap<Capability, Payload>,
}

/// Read the config file. A missing file yields the defaults.
fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(Settings::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
    })?;
    Ok(Settings {
        orchestrator: OrchestratorConfig::from_toml_str(&raw)?,
        workers: worker_configs(&raw)?,
    })
}

fn worker_configs(raw: &str) -> anyhow::Result<HashMap<Capability, Payload>> {
    let doc: toml::Table = raw.parse()?;
    let Some(workers) = doc.get("workers") else {
        return Ok(HashMap::new());
    };
    let workers = workers
        .as_table()
        .ok_or_else(|| anyhow::anyhow!("[workers] must be a table"))?;

    workers
        .iter()
        .map(|(name, value)| {
            let capability: Capability = name.parse()?;
            let config: Payload = serde_json::from_value(serde_json::to_value(value)?)
                .map_err(|_| anyhow::anyhow!("[workers.{name}] must be a table"))?;
            Ok((capability, config))
        })
        .collect()
}

fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("Failed to read workflow file '{}': {}", path.display(), e)
    })?;
    Ok(serde_json::from_str(&raw)?)
}

fn parse_input(raw: &str) -> anyhow::Result<Payload> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Task input must be a JSON object: {e}"))
}

/// Registry with an echo worker for every capability, each carrying its
/// configured settings.
fn reference_registry(mut configs: HashMap<Capability, Payload>) -> Arc<WorkerRegistry> {
    let registry = Arc::new(WorkerRegistry::new());
    for capability in Capability::ALL {
        registry.register_with_config(
            capability,
            Arc::new(EchoWorker::new(capability)),
            configs.remove(&capability).unwrap_or_default(),
        );
    }
    registry
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let settings = load_settings(&cli.config)?;
    let orchestrator = Orchestrator::new(reference_registry(settings.workers), settings.orchestrator)?;
    let maintenance = orchestrator.start_maintenance()?;

    match cli.command {
        Commands::Run { workflow } => {
            let definition = load_workflow(&workflow)?;
            info!(name = %definition.name, tasks = definition.tasks.len(), "Running workflow");
            let summary = orchestrator.execute_workflow(definition).await?;
            let results = orchestrator
                .workflow(summary.workflow_id)
                .await
                .map(|wf| wf.results)
                .unwrap_or_default();
            let report = serde_json::json!({ "summary": summary, "results": results });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Delegate {
            capability,
            priority,
            input,
        } => {
            let capability: Capability = capability.parse()?;
            let priority: Priority = priority.parse()?;
            let request =
                DelegationRequest::new(capability, parse_input(&input)?).with_priority(priority);
            let handle = orchestrator.delegate(request).await;
            let task_id = handle.task_id;
            info!(task_id = %task_id, message = %handle.message, "Task delegated");
            let outcome = handle.wait().await;
            let report = serde_json::json!({ "task_id": task_id, "outcome": outcome });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Monitor => {
            let report = serde_json::json!({
                "monitor": orchestrator.monitor().await,
                "stats": orchestrator.stats().await,
                "health": orchestrator.health_check().await,
                "registry": orchestrator.registry().stats().await,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    maintenance.shutdown().await;
    Ok(())
}
