//! Topic batch: units about live topic briefs, authored by the aggregator.
//!
//! Topics are visited round-robin so a failing topic never starves the
//! others. The attempt index runs from 0 through `2 × topics` inclusive, which
//! bounds the run even when every topic fails. The batch stops as soon as the
//! target count is met.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use agora_generator::{GeneratedUnit, Generator};
use agora_storage::Store;
use agora_types::{Agent, ContentUnit, MediaKind, PipelineSettings, TopicBrief};

use crate::deadline::{self, Deadline};
use crate::error::{PipelineError, UnitError};
use crate::round_robin::BoundedRoundRobin;

/// Outcome of one entry in a topic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Generated,
    Failed,
}

/// One generated unit, or one failed attempt, in a topic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicResult {
    pub headline: String,
    pub status: TopicStatus,
    pub has_video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TopicResult {
    fn generated(brief: &TopicBrief, unit: &ContentUnit) -> Self {
        Self {
            headline: brief.headline.clone(),
            status: TopicStatus::Generated,
            has_video: unit.has_video(),
            media_kind: unit.media_kind,
            post_id: Some(unit.unit_id.clone()),
            media_source: unit.media_source.clone(),
            error: None,
        }
    }

    fn failed(brief: &TopicBrief, error: &UnitError) -> Self {
        Self {
            headline: brief.headline.clone(),
            status: TopicStatus::Failed,
            has_video: false,
            media_kind: None,
            post_id: None,
            media_source: None,
            error: Some(error.to_string()),
        }
    }
}

/// Summary returned by a topic batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicBatchSummary {
    pub success: bool,
    pub generated: usize,
    pub video_count: usize,
    pub total_results: usize,
    pub briefing_topics_used: usize,
    pub results: Vec<TopicResult>,
    /// Set when the run deadline stopped the batch early
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl TopicBatchSummary {
    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == TopicStatus::Failed)
            .count()
    }
}

/// Runs topic batches against a store and generator.
pub struct TopicBatch {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    settings: PipelineSettings,
}

impl TopicBatch {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run a batch with the configured deadline.
    pub async fn run(&self, target: usize) -> Result<TopicBatchSummary, PipelineError> {
        let deadline = Deadline::after_secs(self.settings.topic_deadline_secs);
        self.run_until(target, deadline).await
    }

    /// Run a batch, starting no new attempt once `deadline` has passed.
    pub async fn run_until(
        &self,
        target: usize,
        deadline: Option<Deadline>,
    ) -> Result<TopicBatchSummary, PipelineError> {
        if !self.generator.has_credential() {
            return Err(PipelineError::MissingCredential);
        }

        let topics = self.store.live_topic_briefs(Utc::now()).await?;
        if topics.is_empty() {
            return Err(PipelineError::NoActiveTopics);
        }

        let aggregator = self
            .store
            .find_aggregator()
            .await?
            .ok_or(PipelineError::NoAggregatorAgent)?;

        info!(
            target,
            topics = topics.len(),
            aggregator = %aggregator.handle,
            "Starting topic batch"
        );

        let mut summary = TopicBatchSummary {
            success: true,
            briefing_topics_used: topics.len(),
            ..Default::default()
        };

        let mut attempts = BoundedRoundRobin::new(&topics, topics.len() * 2 + 1);
        for (attempt, brief) in attempts.by_ref() {
            if summary.generated >= target {
                break;
            }
            if deadline::expired(deadline) {
                warn!(attempt, generated = summary.generated, "Run deadline reached");
                summary.truncated = true;
                break;
            }

            debug!(attempt, topic = %brief.headline, "Topic attempt");
            match self
                .generator
                .generate_topic_units(&aggregator, brief)
                .await
            {
                Ok(units) => {
                    let remaining = target - summary.generated;
                    self.persist_units(&aggregator, brief, units, remaining, &mut summary)
                        .await;
                }
                Err(e) => {
                    let e = UnitError::from(e);
                    warn!(attempt, topic = %brief.headline, error = %e, "Topic attempt failed");
                    summary.results.push(TopicResult::failed(brief, &e));
                }
            }
        }

        summary.total_results = summary.results.len();
        info!(
            generated = summary.generated,
            videos = summary.video_count,
            failures = summary.failures(),
            attempts = attempts.attempts_made(),
            "Topic batch complete"
        );
        Ok(summary)
    }

    /// Persist up to `remaining` units; stop at the first write failure.
    async fn persist_units(
        &self,
        aggregator: &Agent,
        brief: &TopicBrief,
        units: Vec<GeneratedUnit>,
        remaining: usize,
        summary: &mut TopicBatchSummary,
    ) {
        for generated in units.into_iter().take(remaining) {
            match self.persist(aggregator, generated).await {
                Ok(unit) => {
                    summary.generated += 1;
                    if unit.has_video() {
                        summary.video_count += 1;
                    }
                    summary.results.push(TopicResult::generated(brief, &unit));
                }
                Err(e) => {
                    warn!(topic = %brief.headline, error = %e, "Failed to store topic unit");
                    summary.results.push(TopicResult::failed(brief, &e));
                    break;
                }
            }
        }
    }

    async fn persist(
        &self,
        aggregator: &Agent,
        generated: GeneratedUnit,
    ) -> Result<ContentUnit, UnitError> {
        let unit = self
            .store
            .insert_unit(generated.into_new_unit(&aggregator.agent_id))
            .await?;
        if let Err(e) = self.store.increment_agent_units(&aggregator.agent_id, 1).await {
            warn!(aggregator = %aggregator.handle, error = %e, "Failed to bump unit count");
        }
        Ok(unit)
    }
}
