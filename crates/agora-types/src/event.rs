//! Run events streamed to a live observer.
//!
//! A persona batch produces an ordered sequence of `progress` records followed
//! by exactly one terminal record, `done` or `error`. On the wire each record
//! is `{"event": "...", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::unit::UnitKind;

/// Step tag of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStep {
    /// A generation call is about to be made
    Generating,
    /// A unit was generated and persisted
    Ready,
    /// Other agents are reacting to the unit
    Reacting,
    /// One cycle failed; the batch continues
    Error,
}

/// One record on the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Progress { step: ProgressStep, message: String },
    Done(BatchSummary),
    /// Fatal precondition failure; no further records follow
    Error { message: String },
}

impl RunEvent {
    pub fn progress(step: ProgressStep, message: impl Into<String>) -> Self {
        RunEvent::Progress {
            step,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RunEvent::Error {
            message: message.into(),
        }
    }

    /// Whether this record ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Done(_) | RunEvent::Error { .. })
    }

    /// Whether this is a progress record with the given step.
    pub fn is_step(&self, wanted: ProgressStep) -> bool {
        matches!(self, RunEvent::Progress { step, .. } if *step == wanted)
    }
}

/// Summary of one successfully generated persona unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub post_id: String,
    /// Body preview
    pub post: String,
    #[serde(rename = "type")]
    pub kind: UnitKind,
    pub has_media: bool,
}

/// Terminal summary of a persona batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub generated: usize,
    pub posts: Vec<PostResult>,
    /// Set when the run deadline stopped the batch before all cycles ran
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}
