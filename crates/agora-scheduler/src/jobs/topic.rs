//! Scheduled topic batch.

use serde::{Deserialize, Serialize};
use tracing::info;

use agora_pipeline::{
    Pipeline, TopicBatchMode, TopicBatchRequest, Trigger, TriggerOutcome, TOPIC_JOB,
};
use agora_types::ScheduleSettings;

use crate::{JitterConfig, JobOutput, SchedulerError, SchedulerService, TimeoutConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicJobConfig {
    /// Cron expression (default: every two hours)
    pub cron: String,
    pub timezone: String,
    /// Target units per batch
    pub count: usize,
    pub jitter_secs: u64,
    pub timeout_secs: u64,
}

impl Default for TopicJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 */2 * * *".to_string(),
            timezone: "UTC".to_string(),
            count: 10,
            jitter_secs: 60,
            timeout_secs: 720,
        }
    }
}

impl From<&ScheduleSettings> for TopicJobConfig {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            cron: settings.topic_cron.clone(),
            timezone: settings.timezone.clone(),
            count: settings.topic_count,
            jitter_secs: settings.jitter_secs,
            ..Default::default()
        }
    }
}

/// Register the topic batch job.
pub async fn create_topic_job(
    scheduler: &SchedulerService,
    pipeline: Pipeline,
    config: TopicJobConfig,
) -> Result<(), SchedulerError> {
    let count = config.count;
    scheduler
        .register_job(
            TOPIC_JOB,
            &config.cron,
            Some(&config.timezone),
            JitterConfig::new(config.jitter_secs),
            TimeoutConfig::new(config.timeout_secs),
            move || {
                let pipeline = pipeline.clone();
                async move { run_scheduled_topic_batch(&pipeline, count).await }
            },
        )
        .await?;

    info!(cron = %config.cron, count, "Registered topic batch job");
    Ok(())
}

/// One scheduled topic batch, reported in registry terms.
pub async fn run_scheduled_topic_batch(
    pipeline: &Pipeline,
    count: usize,
) -> Result<JobOutput, String> {
    let request = TopicBatchRequest {
        count: Some(count),
        mode: TopicBatchMode::Direct,
    };
    let outcome = pipeline
        .topic_batch(Trigger::scheduled(true), request)
        .await
        .map_err(|e| e.to_string())?;

    match outcome {
        TriggerOutcome::Throttled => Ok(JobOutput::skipped("throttled")),
        TriggerOutcome::Completed(summary) => Ok(JobOutput::new()
            .with_generated(summary.generated)
            .with_metadata("video_count", summary.video_count)
            .with_metadata("failures", summary.failures())
            .with_metadata("topics", summary.briefing_topics_used)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use agora_generator::ScriptedGenerator;
    use agora_storage::MemoryStore;
    use agora_types::{Agent, PipelineSettings, TopicBrief};

    fn pipeline(store: Arc<MemoryStore>, generator: ScriptedGenerator) -> Pipeline {
        Pipeline::new(
            store.clone(),
            store,
            Arc::new(generator),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_scheduled_topic_run() {
        let store = Arc::new(MemoryStore::new());
        store.put_agent(Agent::new("wire", "wire", "Wire").as_aggregator());
        store.put_topic_brief(TopicBrief::new("t1", "Storm", chrono::Duration::hours(1)));
        store.put_topic_brief(TopicBrief::new("t2", "Vote", chrono::Duration::hours(1)));

        let generator = ScriptedGenerator::new().failing_topic("t2");
        let output = run_scheduled_topic_batch(&pipeline(store.clone(), generator), 4)
            .await
            .unwrap();

        assert_eq!(output.metadata["generated"], "4");
        assert_eq!(output.metadata["failures"], "1");
        assert_eq!(output.metadata["topics"], "2");
        assert_eq!(store.units().len(), 4);
    }

    #[tokio::test]
    async fn test_no_topics_fails_the_job() {
        let store = Arc::new(MemoryStore::new());
        store.put_agent(Agent::new("wire", "wire", "Wire").as_aggregator());

        let result =
            run_scheduled_topic_batch(&pipeline(store, ScriptedGenerator::new()), 4).await;
        assert_eq!(result, Err("No active topic briefs".to_string()));
    }
}
