//! hooklens - webhook schema observatory.
//!
//! `serve` runs the worker pool against the durable queue; `submit` stands
//! in for the HTTP ingress during local use; the remaining commands are
//! read-only views over persisted state.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use hooklens_protocol::defaults;

#[derive(Parser)]
#[command(name = "hooklens", version, about = "Webhook schema observatory")]
struct Cli {
    /// Limit stderr output to warnings.
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool until interrupted.
    Serve(ServeArgs),
    /// Enqueue a payload from a file (or stdin with `-`).
    Submit(SubmitArgs),
    /// List every persisted event kind.
    Kinds,
    /// Show one kind's schema record.
    Show {
        /// Event kind, e.g. `z_api/received/image`.
        kind: String,

        /// Print the emitted validator schema instead of the summary.
        #[arg(long)]
        validator: bool,

        /// Print the emitted interface instead of the summary.
        #[arg(long, conflicts_with = "validator")]
        interface: bool,
    },
    /// Aggregate pipeline statistics.
    Stats,
    /// Most recently processed events.
    Events {
        /// Maximum rows to print.
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Restrict to one kind.
        #[arg(long)]
        kind: Option<String>,
    },
    /// Events-per-hour over a trailing window.
    Timeline {
        /// Window size in hours.
        #[arg(long, default_value_t = 24)]
        hours: i64,

        /// Restrict to one kind.
        #[arg(long)]
        kind: Option<String>,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Worker pool size.
    #[arg(long, env = "QUEUE_CONCURRENCY", default_value_t = defaults::QUEUE_CONCURRENCY)]
    concurrency: usize,

    /// Attempts before a job moves to the failed set.
    #[arg(long, env = "QUEUE_MAX_ATTEMPTS", default_value_t = defaults::QUEUE_MAX_ATTEMPTS)]
    max_attempts: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt).
    #[arg(long, env = "QUEUE_BACKOFF_DELAY_MS", default_value_t = defaults::QUEUE_BACKOFF_DELAY_MS)]
    backoff_delay_ms: u64,

    /// Characters retained from truncated strings.
    #[arg(long, env = "TRUNCATE_MAX_LENGTH", default_value_t = defaults::TRUNCATE_MAX_LENGTH)]
    truncate_max_length: usize,

    /// Comma-separated field-name substrings to truncate.
    #[arg(long, env = "TRUNCATE_FIELDS")]
    truncate_fields: Option<String>,

    /// Unredacted samples retained per kind.
    #[arg(long, env = "MAX_RAW_SAMPLES", default_value_t = defaults::MAX_RAW_SAMPLES)]
    max_raw_samples: usize,

    /// Example cap honored while merging.
    #[arg(long, env = "MAX_EXAMPLES_PER_SCHEMA", default_value_t = defaults::MAX_EXAMPLES_PER_SCHEMA)]
    max_examples_per_schema: usize,
}

#[derive(Args)]
struct SubmitArgs {
    /// Payload file; `-` reads stdin.
    payload: String,

    /// Request header as `name=value`; repeatable.
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    hooklens_logging::init_logging("hooklens", cli.quiet)?;

    match cli.command {
        Command::Serve(args) => commands::serve(args).await,
        Command::Submit(args) => commands::submit(args).await,
        Command::Kinds => commands::kinds().await,
        Command::Show {
            kind,
            validator,
            interface,
        } => commands::show(&kind, validator, interface).await,
        Command::Stats => commands::stats().await,
        Command::Events { limit, kind } => commands::events(limit, kind.as_deref()).await,
        Command::Timeline { hours, kind } => commands::timeline(hours, kind.as_deref()).await,
    }
}
