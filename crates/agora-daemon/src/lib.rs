//! Agora daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: command implementations
//! - `seed`: seed file format for local runs

pub mod cli;
pub mod commands;
pub mod seed;

pub use cli::{Cli, Commands, GlobalArgs, TriggerArgs};
pub use commands::{
    run_persona_batch, run_topic_batch, seed_store, show_status, show_throttle, start_daemon,
    stop_daemon,
};
pub use seed::SeedFile;
