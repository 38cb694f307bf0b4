//! Courier CLI
//!
//! Thin wrapper around courier-core for listening from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on the default spool (~/.courier/spool) until Ctrl+C
//! courier listen
//!
//! # Listen on a spool for ten seconds, one JSON object per message
//! courier listen --spool ./spool --duration-ms 10000 --format json
//!
//! # Print the effective engine configuration
//! courier --config courier.json config
//! ```

mod spool;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use courier_core::{
    logging, CancellationToken, EngineConfig, EngineEvent, MessageRecord, MessageSink,
    ReconciliationEngine, RunSummary,
};

use crate::spool::SpoolClient;

/// Courier - exactly-once message listener
#[derive(Parser)]
#[command(name = "courier")]
#[command(version)]
#[command(about = "Courier - exactly-once message listener")]
#[command(
    long_about = "Listens for incoming messages, streaming when the network allows it and falling back to overlapping polls when it doesn't, delivering every message exactly once."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON engine config file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for messages until Ctrl+C
    Listen(ListenArgs),

    /// Print the effective engine configuration as JSON
    Config(EngineOverrides),
}

#[derive(Args)]
struct ListenArgs {
    /// Spool directory (default: ~/.courier/spool)
    #[arg(short, long)]
    spool: Option<PathBuf>,

    /// Stop after this many milliseconds
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Output format for delivered messages
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also write JSONL logs under this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Instance name used in JSONL logs
    #[arg(long, default_value = "courier")]
    instance: String,

    #[command(flatten)]
    overrides: EngineOverrides,
}

/// Engine settings that can be set from the command line
#[derive(Args)]
struct EngineOverrides {
    /// Trailing slice re-queried each poll cycle
    #[arg(long)]
    overlap_ms: Option<u64>,

    /// Sleep between poll cycles
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Maximum messages fetched per conversation per cycle
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `[time] sender (conversation):` followed by indented content
    Text,
    /// One JSON object per line
    Json,
}

/// Get the default spool directory (~/.courier/spool)
fn default_spool_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courier")
        .join("spool")
}

/// Load the config file (if any) and apply flag overrides on top.
fn load_config(path: Option<&Path>, overrides: &EngineOverrides) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(overlap) = overrides.overlap_ms {
        config.overlap_millis = overlap;
    }
    if let Some(interval) = overrides.poll_interval_ms {
        config.poll_interval_millis = interval;
    }
    if let Some(page_size) = overrides.page_size {
        config.page_size = page_size;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// A delivered message in `--format json` output
#[derive(Serialize)]
struct DeliveredLine<'a> {
    id: &'a str,
    conversation_id: &'a str,
    sender: &'a str,
    sent_at_ms: i64,
    content: &'a str,
}

/// Sink printing each delivered message to stdout.
struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    fn format_time(millis: i64) -> String {
        chrono::DateTime::from_timestamp_millis(millis)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| millis.to_string())
    }
}

impl MessageSink for ConsoleSink {
    fn deliver(&mut self, record: MessageRecord) {
        let content = record.content_text();
        match self.format {
            OutputFormat::Text => {
                println!(
                    "[{}] {} ({}):",
                    Self::format_time(record.sent_at_millis),
                    record.sender_id,
                    record.conversation_id
                );
                for line in content.lines() {
                    println!("    {}", line);
                }
                println!();
            }
            OutputFormat::Json => {
                let line = DeliveredLine {
                    id: record.message_id.as_str(),
                    conversation_id: record.conversation_id.as_str(),
                    sender: &record.sender_id,
                    sent_at_ms: record.sent_at_millis,
                    content: &content,
                };
                match serde_json::to_string(&line) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!(message_id = %record.message_id, error = %e, "Failed to encode message"),
                }
            }
        }
    }
}

/// Print engine events as status lines until the engine drops its sender.
async fn report_events(
    mut events: tokio::sync::broadcast::Receiver<EngineEvent>,
    format: OutputFormat,
) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::ModeChanged { to, reason, .. }) => {
                if format == OutputFormat::Text {
                    println!("-- switched to {} ({})", to, reason);
                    println!();
                }
            }
            Ok(EngineEvent::CycleFailed {
                error,
                consecutive_failures,
            }) => {
                eprintln!(
                    "Poll cycle failed ({} in a row): {}",
                    consecutive_failures, error
                );
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event reporter lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "Stopped: {} delivered, {} duplicates dropped, {} conversations, {} poll cycles (final mode: {})",
                summary.delivered,
                summary.duplicates_dropped,
                summary.conversations_discovered,
                summary.poll_cycles,
                summary.final_mode
            );
        }
        // Keep stdout machine-readable
        OutputFormat::Json => eprintln!("{}", serde_json::to_string(summary)?),
    }
    Ok(())
}

async fn listen(args: ListenArgs, config: EngineConfig) -> Result<()> {
    let spool_dir = args.spool.unwrap_or_else(default_spool_dir);
    if !spool_dir.is_dir() {
        bail!("Spool directory not found: {}", spool_dir.display());
    }

    let client = SpoolClient::new(&spool_dir);
    let engine = ReconciliationEngine::new(config)?;
    let reporter = tokio::spawn(report_events(engine.subscribe(), args.format));

    if args.format == OutputFormat::Text {
        println!("Courier listening on {}", client.dir().display());
        println!(
            "Polling every {}ms with {}ms overlap. Press Ctrl+C to stop.",
            engine.config().poll_interval_millis,
            engine.config().overlap_millis
        );
        println!();
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let duration = args.duration_ms.map(Duration::from_millis);
    tokio::spawn(async move {
        match duration {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    let mut sink = ConsoleSink {
        format: args.format,
    };
    let summary = engine.run(&client, &mut sink, cancel).await?;
    let _ = reporter.await;

    print_summary(&summary, args.format)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen(args) => {
            let config = load_config(cli.config.as_deref(), &args.overrides)?;
            if let Some(path) = logging::init(cli.verbose, args.log_dir.as_deref(), &args.instance)? {
                info!(path = %path.display(), "Writing JSONL logs");
            }
            listen(args, config).await
        }
        Commands::Config(overrides) => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
