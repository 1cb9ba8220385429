//! Flowsmith - workflow catalog assistant
//!
//! Two commands over one orchestrator:
//! - `flowsmith ask` answers a question about the catalog with a bounded tool loop
//! - `flowsmith build` streams a step-by-step guide for building a flow
//!
//! Guide text goes to stdout, progress and logs to stderr. `--json` prints
//! every progress event as one JSON line instead.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use flowsmith_core::agent::{Mode, Orchestrator, ProgressEvent};
use flowsmith_core::{Collaborators, Settings};

/// Flowsmith - workflow catalog assistant
#[derive(Parser)]
#[command(name = "flowsmith")]
#[command(about = "Ask about workflow components or get a guide for building a flow", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.flowsmith/config.toml)
    #[arg(long, global = true, env = "FLOWSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Print every progress event as one JSON line
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question about the catalog
    ///
    /// Plans a few catalog or documentation lookups, runs them within the
    /// tool budget, and answers from what was found.
    Ask {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        question: Vec<String>,
    },

    /// Generate a guide for building a flow
    ///
    /// Resolves the trigger and actions the request needs against the
    /// catalog, then streams a markdown guide.
    Build {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
        request: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs on stderr so stdout stays clean for the guide
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let collaborators = Collaborators::from_settings(&settings)?;
    let orchestrator = Orchestrator::new(collaborators, settings);

    let (mode, words) = match cli.command {
        Commands::Ask { question } => (Mode::Ask, question),
        Commands::Build { request } => (Mode::Build, request),
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling run");
                cancel.cancel();
            }
        });
    }

    let (events, handle) = orchestrator.run(mode, words.join(" "), Vec::new(), cancel);
    let outcome = if cli.json {
        print_json(UnboundedReceiverStream::new(events)).await?
    } else {
        print_human(UnboundedReceiverStream::new(events)).await?
    };
    handle.await?;

    match outcome {
        Outcome::Complete => Ok(()),
        Outcome::Incomplete => bail!("Run did not complete"),
        Outcome::Failed => bail!("Run failed"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Complete,
    Incomplete,
    Failed,
}

impl Outcome {
    fn from_done(complete: bool, errored: bool, final_text: &str) -> Self {
        if errored && final_text.is_empty() {
            Self::Failed
        } else if complete {
            Self::Complete
        } else {
            Self::Incomplete
        }
    }
}

async fn print_json(mut events: UnboundedReceiverStream<ProgressEvent>) -> Result<Outcome> {
    let mut errored = false;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
        match event {
            ProgressEvent::Error { .. } => errored = true,
            ProgressEvent::Done {
                final_text,
                complete,
            } => return Ok(Outcome::from_done(complete, errored, &final_text)),
            _ => {}
        }
    }
    Ok(Outcome::Failed)
}

async fn print_human(mut events: UnboundedReceiverStream<ProgressEvent>) -> Result<Outcome> {
    let mut errored = false;
    let mut streamed = false;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            ProgressEvent::AnalysisStarted { mode, .. } => {
                let label = match mode {
                    Mode::Ask => "question",
                    Mode::Build => "flow request",
                };
                eprintln!("Analyzing {label}...");
            }
            ProgressEvent::ComponentResolved {
                query, strategy, ..
            } => {
                eprintln!("  {query}: {}", strategy.as_str());
            }
            ProgressEvent::PlanReady {
                steps,
                max_tool_calls,
            } => {
                eprintln!("Plan: {steps} step(s), at most {max_tool_calls} tool call(s)");
            }
            ProgressEvent::ToolCall { tool, query } => {
                eprintln!("  {} -> {query}", tool.as_str());
            }
            ProgressEvent::StreamingUpdate { delta, .. } => {
                write!(stdout, "{delta}")?;
                stdout.flush()?;
                streamed = true;
            }
            ProgressEvent::Error { message, .. } => {
                errored = true;
                eprintln!("Error: {message}");
            }
            ProgressEvent::Done {
                final_text,
                complete,
            } => {
                if streamed {
                    writeln!(stdout)?;
                } else if !final_text.is_empty() {
                    writeln!(stdout, "{final_text}")?;
                }
                if !complete {
                    eprintln!("(incomplete)");
                }
                return Ok(Outcome::from_done(complete, errored, &final_text));
            }
        }
    }
    Ok(Outcome::Failed)
}
