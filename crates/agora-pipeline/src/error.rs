//! Error types for the pipeline.

use thiserror::Error;

use agora_generator::GenerationError;
use agora_storage::StorageError;

/// Failures that refuse or abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Generation credential is not configured")]
    MissingCredential,

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("No active topic briefs")]
    NoActiveTopics,

    #[error("No active aggregator agent")]
    NoAggregatorAgent,

    #[error("Trigger is not authorized")]
    Unauthorized,

    /// A read the run cannot proceed without failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Run task failed: {0}")]
    Task(String),
}

/// Failure of one isolated unit of work: a cycle, a topic attempt, a reactor.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("persistence failed: {0}")]
    Storage(#[from] StorageError),
}
