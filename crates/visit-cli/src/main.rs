//! `visit` CLI: expand, preview and commit recurring visits from JSON files.
//!
//! ## Usage
//!
//! ```sh
//! # List the dates an anchor + rule expand to
//! visit expand -i build.json
//!
//! # Build a preview against a directory snapshot, optionally applying edits
//! visit preview -i build.json -d directory.json --edits edits.json
//!
//! # Commit the selected occurrences into a JSON visit store
//! visit commit -i build.json -d directory.json --edits edits.json --store visits.json
//!
//! # Facility timezone and limits come from a config file or the environment
//! VISIT_FACILITY_TZ=America/Chicago visit --config engine.json preview -i build.json -d directory.json
//! ```

mod store;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visit_engine::{
    BuildRequest, CancellationToken, CommitCoordinator, CommitRequest, EditRequest, EngineConfig, InMemoryDirectory,
    OccurrenceKey, PreviewBuilder, PreviewSession,
};

use crate::store::JsonFileSink;

const TIMEZONE_ENV: &str = "VISIT_FACILITY_TZ";

#[derive(Parser)]
#[command(name = "visit", version, about = "Recurring home-care visit scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (JSON). Defaults are used if omitted or missing.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand an anchor and rule into dates
    Expand {
        /// Build request file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Build a schedule preview with conflicts
    Preview {
        /// Build request file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Directory snapshot: existing commitments and authorizations
        #[arg(short, long)]
        directory: Option<String>,
        /// JSON array of edits to apply to the preview
        #[arg(long)]
        edits: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Build, edit and commit a preview into a visit store
    Commit {
        /// Build request file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Directory snapshot: existing commitments and authorizations
        #[arg(short, long)]
        directory: Option<String>,
        /// JSON array of edits to apply before committing
        #[arg(long)]
        edits: Option<String>,
        /// Visit store file; created if missing
        #[arg(long)]
        store: String,
        /// Comma-separated occurrence keys to commit (defaults to the selection)
        #[arg(long)]
        keys: Option<String>,
        /// Commit deadline in milliseconds (overrides the config)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Receipt output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Expand { input, output } => {
            let request = read_build_request(input.as_deref())?;
            let dates = visit_engine::expand_dates(
                request.anchor.date,
                request.rule.as_ref(),
                config.max_occurrences,
            )
            .context("Failed to expand recurrence")?;
            let json = serde_json::to_string_pretty(&dates)?;
            write_output(output.as_deref(), &json)?;
        }
        Commands::Preview {
            input,
            directory,
            edits,
            output,
        } => {
            let request = read_build_request(input.as_deref())?;
            let directory = read_directory(directory.as_deref())?;
            let builder = PreviewBuilder::new(&directory, &directory, config);
            let session = build_session(&builder, &request, edits.as_deref())?;
            let response = session.preview()?.response();
            write_output(output.as_deref(), &serde_json::to_string_pretty(&response)?)?;
        }
        Commands::Commit {
            input,
            directory,
            edits,
            store,
            keys,
            timeout_ms,
            output,
        } => {
            let request = read_build_request(input.as_deref())?;
            let directory = read_directory(directory.as_deref())?;
            let coordinator = CommitCoordinator::new(JsonFileSink::new(&store), &config);
            let builder = PreviewBuilder::new(&directory, &directory, config);
            let mut session = build_session(&builder, &request, edits.as_deref())?;
            let commit = CommitRequest {
                keys: keys.as_deref().map(parse_keys).transpose()?,
                timeout_ms,
            };

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let receipt = runtime.block_on(async {
                let cancel = CancellationToken::new();
                let on_interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, cancelling commit");
                        on_interrupt.cancel();
                    }
                });
                coordinator.commit(&mut session, &commit, &cancel).await
            })
            .with_context(|| format!("Failed to commit visits to {store}"))?;

            info!(visits = receipt.visits.len(), store = %store, "commit complete");
            write_output(output.as_deref(), &serde_json::to_string_pretty(&receipt)?)?;
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` selects the level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) if Path::new(path).exists() => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path))?;
            EngineConfig::from_json(&raw).with_context(|| format!("Invalid config: {}", path))?
        }
        Some(path) => {
            warn!(path, "config file not found, using defaults");
            EngineConfig::default()
        }
        None => EngineConfig::default(),
    };
    if let Ok(tz) = std::env::var(TIMEZONE_ENV) {
        config.facility_timezone = tz;
    }
    config
        .validate()
        .with_context(|| format!("Invalid engine configuration (check {TIMEZONE_ENV})"))?;
    Ok(config)
}

fn build_session(builder: &PreviewBuilder<'_>, request: &BuildRequest, edits: Option<&str>) -> Result<PreviewSession> {
    let preview = builder
        .build_request(request)
        .context("Failed to build schedule preview")?;
    let mut session = PreviewSession::new(preview);
    if let Some(path) = edits {
        let raw = read_input(Some(path))?;
        let edits: Vec<EditRequest> =
            serde_json::from_str(&raw).with_context(|| format!("Invalid edits file: {}", path))?;
        session
            .apply_all(builder.detector(), &edits)
            .context("Failed to apply edits")?;
    }
    Ok(session)
}

fn parse_keys(raw: &str) -> Result<Vec<OccurrenceKey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| k.parse::<OccurrenceKey>().with_context(|| format!("Invalid occurrence key: '{}'", k)))
        .collect()
}

fn read_build_request(path: Option<&str>) -> Result<BuildRequest> {
    let raw = read_input(path)?;
    serde_json::from_str(&raw).context("Invalid build request JSON")
}

fn read_directory(path: Option<&str>) -> Result<InMemoryDirectory> {
    match path {
        Some(path) => {
            let raw = read_input(Some(path))?;
            InMemoryDirectory::from_json(&raw).with_context(|| format!("Invalid directory snapshot: {}", path))
        }
        None => Ok(InMemoryDirectory::default()),
    }
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path)),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
