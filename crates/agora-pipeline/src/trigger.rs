//! Entry points for scheduled and manual runs.
//!
//! Authorization is decided by the caller and passed in with the trigger.
//! Scheduled triggers go through the throttle gate exactly once per run;
//! manual triggers always run. Request counts are clamped here before they
//! reach the batches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use agora_generator::Generator;
use agora_storage::{SettingsReader, Store};
use agora_types::PipelineSettings;

use crate::deadline::Deadline;
use crate::error::PipelineError;
use crate::persona::{spawn_persona_batch, PersonaBatch, PersonaRun};
use crate::throttle::ThrottleGate;
use crate::topic::{TopicBatch, TopicBatchSummary};

/// Throttle job name for persona batches.
pub const PERSONA_JOB: &str = "persona_batch";
/// Throttle job name for topic batches.
pub const TOPIC_JOB: &str = "topic_batch";

const DIRECT_DEFAULT_COUNT: usize = 10;
const DIRECT_MAX_COUNT: usize = 15;
const LIGHTWEIGHT_DEFAULT_COUNT: usize = 3;

/// Who started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

/// A run request's origin and authorization verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub source: TriggerSource,
    pub authorized: bool,
}

impl Trigger {
    pub fn scheduled(authorized: bool) -> Self {
        Self {
            source: TriggerSource::Scheduled,
            authorized,
        }
    }

    /// An operator-initiated run, already authorized.
    pub fn manual() -> Self {
        Self {
            source: TriggerSource::Manual,
            authorized: true,
        }
    }
}

/// Result of an admitted or throttled trigger.
#[derive(Debug)]
pub enum TriggerOutcome<T> {
    Completed(T),
    /// A scheduled run the throttle gate declined; no work was done
    Throttled,
}

impl<T> TriggerOutcome<T> {
    pub fn is_throttled(&self) -> bool {
        matches!(self, TriggerOutcome::Throttled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaBatchRequest {
    pub agent_id: String,
    #[serde(default = "default_persona_request_count")]
    pub count: usize,
}

fn default_persona_request_count() -> usize {
    1
}

impl PersonaBatchRequest {
    pub fn new(agent_id: impl Into<String>, count: usize) -> Self {
        Self {
            agent_id: agent_id.into(),
            count,
        }
    }
}

/// Topic batch flavours with different count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicBatchMode {
    #[default]
    Direct,
    Lightweight,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBatchRequest {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub mode: TopicBatchMode,
}

impl TopicBatchRequest {
    pub fn target(&self) -> usize {
        clamp_topic_count(self.count, self.mode)
    }
}

impl TopicBatchMode {
    /// Internal run deadline for this mode, in seconds (0 disables it).
    pub fn deadline_secs(&self, settings: &PipelineSettings) -> u64 {
        match self {
            TopicBatchMode::Direct => settings.topic_deadline_secs,
            TopicBatchMode::Lightweight => settings.lightweight_deadline_secs,
        }
    }
}

/// Effective target for a topic batch request.
///
/// Direct batches default to 10 and are clamped to `1..=15`. Lightweight
/// batches default to 3 and only have a lower bound.
pub fn clamp_topic_count(count: Option<usize>, mode: TopicBatchMode) -> usize {
    match mode {
        TopicBatchMode::Direct => count
            .unwrap_or(DIRECT_DEFAULT_COUNT)
            .clamp(1, DIRECT_MAX_COUNT),
        TopicBatchMode::Lightweight => count.unwrap_or(LIGHTWEIGHT_DEFAULT_COUNT).max(1),
    }
}

/// Compare a presented bearer secret against the configured one.
///
/// Runs over the full length of equal-length inputs regardless of where they
/// differ. No configured secret means nothing is authorized.
pub fn authorize_bearer(expected: Option<&str>, presented: Option<&str>) -> bool {
    let (Some(expected), Some(presented)) = (expected, presented) else {
        return false;
    };
    let presented = presented.strip_prefix("Bearer ").unwrap_or(presented);
    if expected.is_empty() || expected.len() != presented.len() {
        return false;
    }
    expected
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Authorization, throttling and clamping in front of the batches.
#[derive(Clone)]
pub struct Pipeline {
    persona: Arc<PersonaBatch>,
    topic: Arc<TopicBatch>,
    gate: ThrottleGate,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Store>,
        settings_reader: Arc<dyn SettingsReader>,
        generator: Arc<dyn Generator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            persona: Arc::new(PersonaBatch::new(
                store.clone(),
                generator.clone(),
                settings.clone(),
            )),
            topic: Arc::new(TopicBatch::new(store, generator, settings)),
            gate: ThrottleGate::new(settings_reader),
        }
    }

    pub fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    /// Start a persona batch and return its event stream.
    pub async fn persona_batch(
        &self,
        trigger: Trigger,
        request: PersonaBatchRequest,
    ) -> Result<TriggerOutcome<PersonaRun>, PipelineError> {
        if !self.admit(trigger, PERSONA_JOB).await? {
            return Ok(TriggerOutcome::Throttled);
        }
        info!(
            source = ?trigger.source,
            agent_id = %request.agent_id,
            count = request.count,
            "Persona batch triggered"
        );
        Ok(TriggerOutcome::Completed(spawn_persona_batch(
            self.persona.clone(),
            request.agent_id,
            request.count,
        )))
    }

    /// Run a topic batch to completion.
    pub async fn topic_batch(
        &self,
        trigger: Trigger,
        request: TopicBatchRequest,
    ) -> Result<TriggerOutcome<TopicBatchSummary>, PipelineError> {
        if !self.admit(trigger, TOPIC_JOB).await? {
            return Ok(TriggerOutcome::Throttled);
        }
        let target = request.target();
        info!(
            source = ?trigger.source,
            mode = ?request.mode,
            target,
            "Topic batch triggered"
        );
        let deadline = Deadline::after_secs(request.mode.deadline_secs(self.topic.settings()));
        self.topic
            .run_until(target, deadline)
            .await
            .map(TriggerOutcome::Completed)
    }

    async fn admit(&self, trigger: Trigger, job: &str) -> Result<bool, PipelineError> {
        if !trigger.authorized {
            return Err(PipelineError::Unauthorized);
        }
        match trigger.source {
            TriggerSource::Manual => Ok(true),
            TriggerSource::Scheduled => Ok(self.gate.should_run(job).await),
        }
    }
}
