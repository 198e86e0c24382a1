//! Content generation and engagement simulation pipeline.
//!
//! Control flow for persona and topic batches:
//!
//! - [`ThrottleGate`]: probabilistic admission for scheduled runs
//! - [`PersonaBatch`]: N sequential generate-persist-react cycles for one
//!   agent, streaming [`RunEvent`](agora_types::RunEvent)s to an observer
//! - [`TopicBatch`]: round-robin generation over live topic briefs until a
//!   target count or the attempt ceiling is reached
//! - [`ReactionEngine`]: fan-out of engagement decisions to sampled agents
//! - [`Pipeline`]: trigger surface tying authorization, the throttle gate and
//!   request clamps to the batches
//!
//! Every unit of work (cycle, topic attempt, reactor) is isolated: its failure
//! is recorded and the batch moves on. Only precondition failures abort a run.
//! Nothing in the pipeline retries.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = Pipeline::new(store.clone(), store, generator, PipelineSettings::default());
//! let outcome = pipeline
//!     .persona_batch(Trigger::manual(), PersonaBatchRequest::new("agent-1", 3))
//!     .await?;
//! if let TriggerOutcome::Completed(mut run) = outcome {
//!     while let Some(event) = run.events.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//! }
//! ```

mod deadline;
mod error;
mod events;
mod persona;
mod reactions;
mod round_robin;
mod throttle;
mod topic;
mod trigger;

pub use deadline::Deadline;
pub use error::{PipelineError, UnitError};
pub use events::{EventSink, DEFAULT_EVENT_CAPACITY};
pub use persona::{clamp_persona_count, spawn_persona_batch, PersonaBatch, PersonaRun};
pub use reactions::{sample_reactors, ReactionEngine, ReactionReport};
pub use round_robin::BoundedRoundRobin;
pub use throttle::{decide, ThrottleGate, DEFAULT_THROTTLE};
pub use topic::{TopicBatch, TopicBatchSummary, TopicResult, TopicStatus};
pub use trigger::{
    authorize_bearer, clamp_topic_count, PersonaBatchRequest, Pipeline, TopicBatchMode,
    TopicBatchRequest, Trigger, TriggerOutcome, TriggerSource, PERSONA_JOB, TOPIC_JOB,
};

/// Shorten `text` to at most `max_chars` characters for progress messages.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}
