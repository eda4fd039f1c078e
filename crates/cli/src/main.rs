//! `workflow-engine` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server together with the worker and scheduler.
//! - `worker`   — start the worker and scheduler only.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow JSON file.
//! - `run`      — execute one workflow in memory and print the run.

mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use actions::processors::{DidProcessor, HttpCallProcessor, ValidateRulesProcessor};
use actions::{AsyncJobPoller, HttpRegistrarTransport, JobTransport, ProcessorRegistry};
use engine::{
    ActionGraphExecutor, EngineService, MemoryStore, PgStore, RunState, RunStore, Workflow,
    WorkflowWorker,
};
use queue::RunQueue;

use config::{parse_key_val, DatabaseArgs, EngineArgs};

#[derive(Parser)]
#[command(name = "workflow-engine", about = "Workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API, the worker loops and the recurring scheduler.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Start the worker loops and the recurring scheduler without the API.
    Worker {
        #[command(flatten)]
        database: DatabaseArgs,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        database: DatabaseArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow file once, in memory, and print the resulting run.
    Run {
        /// Path to the workflow JSON file.
        path: PathBuf,
        /// Trigger input as `key=value`; repeatable.
        #[arg(long = "input", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            database,
            engine,
        } => {
            let store = connect(&database).await?;
            let queue = RunQueue::new();
            let shutdown = shutdown_signal();

            let service = start_engine(&engine, store.clone(), queue.clone(), shutdown.clone()).await?;
            info!("Starting API server on {bind}");
            let served = api::serve(&bind, api::AppState::new(store, queue), shutdown.clone()).await;

            // A failed bind must still stop the background loops.
            shutdown.cancel();
            service.shutdown().await;
            served.with_context(|| format!("API server on {bind} failed"))?;
        }
        Command::Worker { database, engine } => {
            let store = connect(&database).await?;
            let shutdown = shutdown_signal();

            let service = start_engine(&engine, store, RunQueue::new(), shutdown.clone()).await?;
            shutdown.cancelled().await;
            service.shutdown().await;
        }
        Command::Migrate { database } => {
            let pool = db::pool::create_pool(&database.database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match engine::validate_dag(&workflow) {
                Ok(order) => {
                    println!("✅ Workflow is valid. Dispatch order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            path,
            inputs,
            engine,
        } => {
            let workflow = read_workflow(&path)?;
            let state = run_once(workflow, inputs.into_iter().collect(), &engine).await?;
            if state != RunState::Success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Cancelled on Ctrl-C.
fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => warn!(error = %err, "could not listen for Ctrl-C, shutting down"),
        }
        trigger.cancel();
    });
    token
}

async fn connect(database: &DatabaseArgs) -> anyhow::Result<Arc<dyn RunStore>> {
    let pool = db::pool::create_pool(&database.database_url, database.db_max_connections)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(PgStore::new(pool)))
}

async fn start_engine(
    args: &EngineArgs,
    store: Arc<dyn RunStore>,
    queue: RunQueue,
    cancel: CancellationToken,
) -> anyhow::Result<EngineService> {
    let executor = Arc::new(ActionGraphExecutor::new(build_registry(args)?));
    EngineService::start(args.engine_config(), store, queue, executor, cancel)
        .await
        .context("failed to start engine")
}

/// Processors backed by what this binary can reach on its own. Email and
/// credential actions need a `Mailer` or `CredentialService` and stay
/// unregistered here; their actions fail with "no processor registered".
fn build_registry(args: &EngineArgs) -> anyhow::Result<ProcessorRegistry> {
    let transport: Arc<dyn JobTransport> = Arc::new(
        HttpRegistrarTransport::new(args.registrar_url.as_str())
            .context("failed to build registrar client")?,
    );
    let poller = AsyncJobPoller::new(args.poller_config());

    Ok(ProcessorRegistry::new()
        .with(Arc::new(DidProcessor::create(transport.clone(), poller.clone())))
        .with(Arc::new(DidProcessor::update(transport.clone(), poller.clone())))
        .with(Arc::new(DidProcessor::deactivate(transport, poller)))
        .with(Arc::new(HttpCallProcessor::default()))
        .with(Arc::new(ValidateRulesProcessor)))
}

fn read_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

async fn run_once(
    workflow: Workflow,
    trigger_input: HashMap<String, String>,
    args: &EngineArgs,
) -> anyhow::Result<RunState> {
    let store = Arc::new(MemoryStore::new());
    store.save_workflow(&workflow).await?;
    let run = store.create_run(workflow.id, trigger_input).await?;

    let executor = Arc::new(ActionGraphExecutor::new(build_registry(args)?));
    let worker = WorkflowWorker::new(store.clone(), RunQueue::new(), executor);
    worker
        .process_run(run.id, shutdown_signal())
        .await
        .context("run did not complete")?;

    let run = store.get_run(run.id).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(run.state)
}
