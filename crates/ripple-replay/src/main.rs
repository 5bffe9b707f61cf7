//! CLI entry point for ripple-replay.
//!
//! Writes one JSON object per line to stdout; logs go to stderr.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use ripple_core::config::{DispatchMode, EngineConfig};
use ripple_replay::{load_schema, load_subscriptions, load_traces, ReplayError};

#[derive(Parser)]
#[command(name = "ripple-replay")]
#[command(about = "Replay mutation traces through the Ripple subscription engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Schema document (JSON). Defaults to engine.schema_path from config.
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Config file prefix (default: ripple).
    #[arg(short, long, default_value = "ripple", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Replay traces and print every delivered payload.
    Run {
        /// Subscriptions file (JSON array).
        #[arg(long)]
        subscriptions: PathBuf,
        /// Traces file (JSON array or one trace per line).
        #[arg(long)]
        traces: PathBuf,
        /// Dispatch on a background task instead of inline.
        #[arg(long)]
        background: bool,
        /// Print the run totals as a final line.
        #[arg(long)]
        summary: bool,
    },
    /// Compile subscriptions against the schema and report any that fail.
    Validate {
        /// Subscriptions file (JSON array).
        #[arg(long)]
        subscriptions: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load(&cli.config)?;

    let schema_path = cli
        .schema
        .clone()
        .or_else(|| config.schema_path.as_ref().map(PathBuf::from))
        .ok_or(ReplayError::NoSchema)?;
    let types = load_schema(&schema_path)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Run {
            subscriptions,
            traces,
            background,
            summary,
        } => {
            if background {
                config.dispatch_mode = DispatchMode::Background;
            }
            let subscriptions = load_subscriptions(&subscriptions)?;
            let traces = load_traces(&traces)?;

            let report = ripple_replay::run(types, config, &subscriptions, &traces).await?;
            for delivered in &report.deliveries {
                writeln!(out, "{}", serde_json::to_string(delivered)?)?;
            }
            if summary {
                writeln!(out, "{}", serde_json::to_string(&report)?)?;
            }
        }
        Command::Validate { subscriptions } => {
            let subscriptions = load_subscriptions(&subscriptions)?;
            let results = ripple_replay::validate(types, &subscriptions)?;
            let failed = results.iter().filter(|v| !v.is_ok()).count();
            for result in &results {
                writeln!(out, "{}", serde_json::to_string(result)?)?;
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} subscriptions failed to compile", results.len());
            }
        }
    }

    Ok(())
}
