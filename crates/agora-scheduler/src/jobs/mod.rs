//! Scheduled pipeline jobs.
//!
//! - **persona**: one persona batch for a randomly chosen active agent
//! - **topic**: one topic batch over the live briefs

pub mod persona;
pub mod topic;

pub use persona::{create_persona_job, run_scheduled_persona_batch, PersonaJobConfig};
pub use topic::{create_topic_job, run_scheduled_topic_batch, TopicJobConfig};
