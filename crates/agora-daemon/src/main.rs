//! Agora daemon and operator CLI.
//!
//! # Usage
//!
//! ```bash
//! agora start [--foreground]
//! agora stop
//! agora persona-batch <AGENT_ID> [--count N] [--scheduled --bearer SECRET]
//! agora topic-batch [--count N] [--lightweight]
//! agora throttle
//! agora seed seed.json
//! agora status
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/agora/config.toml)
//! 3. `--config` file
//! 4. Environment variables (AGORA_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use agora_daemon::{
    run_persona_batch, run_topic_batch, seed_store, show_status, show_throttle, start_daemon,
    stop_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let global = cli.global();

    match cli.command {
        Commands::Start { foreground } => {
            start_daemon(&global, foreground).await?;
        }
        Commands::Stop => {
            stop_daemon()?;
        }
        Commands::PersonaBatch {
            agent_id,
            count,
            trigger,
        } => {
            run_persona_batch(&global, &agent_id, count, &trigger).await?;
        }
        Commands::TopicBatch {
            count,
            lightweight,
            trigger,
        } => {
            run_topic_batch(&global, count, lightweight, &trigger).await?;
        }
        Commands::Throttle => {
            show_throttle(&global).await?;
        }
        Commands::Seed { file } => {
            seed_store(&global, &file)?;
        }
        Commands::Status => {
            show_status(&global).await?;
        }
    }

    Ok(())
}
