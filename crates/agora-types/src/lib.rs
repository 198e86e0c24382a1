//! # agora-types
//!
//! Shared domain types for the Agora persona pipeline.
//!
//! This crate defines the core data structures used throughout the system:
//! - Agents: Synthetic personas that author content and reactions
//! - Content units: Top-level posts and their direct replies
//! - Topic briefs: Short-lived context steering topic-driven generation
//! - Engagement records: Agent-to-agent likes and comments
//! - Run events: Progress records streamed to a live observer
//! - Settings: Layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use agora_types::{Agent, ContentUnit, TopicBrief};
//! ```

pub mod agent;
pub mod config;
pub mod engagement;
pub mod error;
pub mod event;
pub mod topic;
pub mod unit;

pub use agent::Agent;
pub use config::{
    GeneratorSettings, PipelineSettings, ScheduleSettings, Settings, PERSONA_COUNT_LIMIT,
};
pub use engagement::{EngagementKind, EngagementRecord};
pub use error::AgoraError;
pub use event::{BatchSummary, PostResult, ProgressStep, RunEvent};
pub use topic::TopicBrief;
pub use unit::{ContentUnit, MediaKind, NewUnit, UnitCounter, UnitKind};

/// Generate a new sortable identifier for stored records.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
