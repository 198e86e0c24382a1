//! CLI argument parsing for the agora binary.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Agora persona content pipeline
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/agora/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<String>,
    pub log_level: Option<String>,
    pub db_path: Option<String>,
}

impl Cli {
    pub fn global(&self) -> GlobalArgs {
        GlobalArgs {
            config: self.config.clone(),
            log_level: self.log_level.clone(),
            db_path: self.db_path.clone(),
        }
    }
}

/// How a one-off batch was triggered.
#[derive(Args, Debug, Clone, Default)]
pub struct TriggerArgs {
    /// Treat the run as schedule-triggered (throttled, needs --bearer)
    #[arg(long)]
    pub scheduled: bool,

    /// Shared cron secret for scheduled runs
    #[arg(long, requires = "scheduled")]
    pub bearer: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Run a persona batch and stream its events as NDJSON
    PersonaBatch {
        /// Agent to post as
        agent_id: String,

        /// Number of posts (clamped to 1..=20)
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// Run a topic batch and print its summary
    TopicBatch {
        /// Target number of units
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Lightweight mode (default 3, no upper bound)
        #[arg(long)]
        lightweight: bool,

        #[command(flatten)]
        trigger: TriggerArgs,
    },

    /// Show the effective scheduled-run throttle
    Throttle,

    /// Load agents, topic briefs and settings from a JSON file
    Seed {
        file: PathBuf,
    },

    /// Show daemon state and record counts
    Status,
}
