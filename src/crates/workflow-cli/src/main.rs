//! # workflow-cli
//!
//! CLI for validating, compiling, and running workflow declarations against
//! `workflow-core`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use workflow_adapters::mock::{MockChatModel, MockDbQuerier, MockHttpCaller, MockImageModel};
use workflow_core::behaviors::Adapters;
use workflow_core::{compile, invoke, validate, State, WorkflowSpec};

#[derive(Parser)]
#[command(name = "workflow")]
#[command(about = "Validate, compile, and run workflow-core graph declarations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log verbosity, in `tracing-subscriber` EnvFilter syntax.
    #[arg(long, global = true, env = "WORKFLOW_LOG", default_value = "workflow_core=info,workflow_cli=info")]
    log: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and statically validate a workflow declaration.
    Validate {
        /// Path to the workflow JSON file.
        file: PathBuf,
    },

    /// Validate, then compile a declaration into a runnable graph.
    Compile {
        /// Path to the workflow JSON file.
        file: PathBuf,
    },

    /// Compile and execute a declaration against an initial state.
    Run {
        /// Path to the workflow JSON file.
        file: PathBuf,

        /// Initial `user_input` value.
        #[arg(short, long)]
        input: Option<String>,

        /// Use in-memory mock adapters instead of real providers. This is
        /// currently the only execution mode: the core depends only on the
        /// `workflow-adapters` traits, and no concrete provider crate is
        /// wired in yet.
        #[arg(long, default_value_t = true)]
        mock: bool,

        /// Abort the run after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Compile { file } => cmd_compile(&file),
        Commands::Run { file, input, mock, timeout_secs } => cmd_run(&file, input, mock, timeout_secs).await,
    }
}

fn init_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

fn load_spec(file: &PathBuf) -> anyhow::Result<WorkflowSpec> {
    let reader = std::fs::File::open(file).map_err(|e| anyhow::anyhow!("failed to open {}: {e}", file.display()))?;
    Ok(WorkflowSpec::from_reader(reader)?)
}

fn cmd_validate(file: &PathBuf) -> anyhow::Result<()> {
    let spec = load_spec(file)?;
    let errors = validate(&spec);
    if errors.is_empty() {
        println!("valid: {} node(s), {} edge(s), {} queue(s)", spec.nodes.len(), spec.edges.len(), spec.queues.len());
        Ok(())
    } else {
        println!("invalid: {} error(s)", errors.len());
        for error in &errors {
            println!("  {error}");
        }
        anyhow::bail!("{} validation error(s)", errors.len())
    }
}

fn cmd_compile(file: &PathBuf) -> anyhow::Result<()> {
    let spec = load_spec(file)?;
    match compile(&spec) {
        Ok(graph) => {
            println!("compiled: start_node = '{}'", graph.start_node());
            Ok(())
        }
        Err(workflow_core::WorkflowError::Validation(errors)) => {
            println!("invalid: {} error(s)", errors.len());
            for error in &errors {
                println!("  {error}");
            }
            anyhow::bail!("{} validation error(s)", errors.len())
        }
        Err(err) => anyhow::bail!(err),
    }
}

async fn cmd_run(file: &PathBuf, input: Option<String>, mock: bool, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    if !mock {
        anyhow::bail!("only --mock execution is currently supported; no concrete provider crate is wired in");
    }
    let spec = load_spec(file)?;
    let graph = compile(&spec)?;

    let adapters = Adapters {
        chat: Arc::new(MockChatModel::default()),
        image: Arc::new(MockImageModel),
        db: Arc::new(MockDbQuerier::default()),
        http: Arc::new(MockHttpCaller),
    };
    let initial_state = match input {
        Some(text) => State::with_input(text),
        None => State::default(),
    };
    let cancel = CancellationToken::new();

    let result = if let Some(secs) = timeout_secs {
        let cancel_on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            cancel_on_timeout.cancel();
        });
        invoke(&graph, initial_state, &adapters, &cancel).await
    } else {
        invoke(&graph, initial_state, &adapters, &cancel).await
    };

    println!("execution_id: {}", result.execution_id);
    println!("status: {:?}", result.status);
    println!("nodes_executed: {}", result.metrics.nodes_executed);
    println!("execution_time: {:?}", result.metrics.execution_time);
    println!("{}", serde_json::to_string_pretty(&result.final_state)?);

    if !result.final_state.errors.is_empty() {
        anyhow::bail!("{} node(s) failed during execution", result.final_state.errors.len());
    }
    Ok(())
}
