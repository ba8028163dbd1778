//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Adjutant - minimum-cost personal automation daemon
#[derive(Parser)]
#[command(
    name = "adj",
    about = "Routes requests and events to the cheapest execution path that can answer them",
    version,
    after_help = "Most requests never reach a large model: instant answers, bash shortcuts, \
                  and the cached routing manifest come first."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon in the background
    Start {
        /// Don't fork to background (run in foreground)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status and ledger totals
    Status,

    /// Route an input and print the decision without executing it
    Route {
        /// The request to route
        input: String,
    },

    /// Run a request end to end and print the answer
    Run {
        /// The request to run
        input: String,
    },

    /// Enqueue a scheduled task
    Schedule {
        /// Natural-language directive to run
        task: String,

        /// Interval in seconds for a recurring task
        #[arg(long, conflicts_with = "cron")]
        every: Option<u64>,

        /// Cron expression (5-field) for a recurring task
        #[arg(long)]
        cron: Option<String>,
    },

    /// Internal: run as the daemon process (used by `start`)
    #[command(hide = true)]
    RunDaemon,
}
