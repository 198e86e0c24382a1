//! Scheduled persona batch.
//!
//! Each tick picks one active, non-aggregator agent uniformly at random and
//! triggers a persona batch for it as a scheduled (throttled) run. The event
//! stream is drained into the log.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use agora_pipeline::{PersonaBatchRequest, Pipeline, Trigger, TriggerOutcome, PERSONA_JOB};
use agora_storage::Store;
use agora_types::{Agent, RunEvent, ScheduleSettings};

use crate::{JitterConfig, JobOutput, SchedulerError, SchedulerService, TimeoutConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaJobConfig {
    /// Cron expression (default: every 20 minutes)
    pub cron: String,
    pub timezone: String,
    /// Cycles per batch
    pub count: usize,
    pub jitter_secs: u64,
    /// Outer bound on one run; the batch's own deadline normally ends it first
    pub timeout_secs: u64,
}

impl Default for PersonaJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 */20 * * * *".to_string(),
            timezone: "UTC".to_string(),
            count: 3,
            jitter_secs: 60,
            timeout_secs: 360,
        }
    }
}

impl From<&ScheduleSettings> for PersonaJobConfig {
    fn from(settings: &ScheduleSettings) -> Self {
        Self {
            cron: settings.persona_cron.clone(),
            timezone: settings.timezone.clone(),
            count: settings.persona_count,
            jitter_secs: settings.jitter_secs,
            ..Default::default()
        }
    }
}

/// Register the persona batch job.
pub async fn create_persona_job(
    scheduler: &SchedulerService,
    pipeline: Pipeline,
    store: Arc<dyn Store>,
    config: PersonaJobConfig,
) -> Result<(), SchedulerError> {
    let count = config.count;
    scheduler
        .register_job(
            PERSONA_JOB,
            &config.cron,
            Some(&config.timezone),
            JitterConfig::new(config.jitter_secs),
            TimeoutConfig::new(config.timeout_secs),
            move || {
                let pipeline = pipeline.clone();
                let store = store.clone();
                async move { run_scheduled_persona_batch(&pipeline, store.as_ref(), count).await }
            },
        )
        .await?;

    info!(cron = %config.cron, count, "Registered persona batch job");
    Ok(())
}

/// One scheduled persona batch, reported in registry terms.
pub async fn run_scheduled_persona_batch(
    pipeline: &Pipeline,
    store: &dyn Store,
    count: usize,
) -> Result<JobOutput, String> {
    let population = store
        .list_active_agents()
        .await
        .map_err(|e| format!("failed to list agents: {e}"))?;
    let Some(agent) = pick_persona(&population) else {
        return Ok(JobOutput::skipped("no active persona agents"));
    };

    let outcome = pipeline
        .persona_batch(
            Trigger::scheduled(true),
            PersonaBatchRequest::new(&agent.agent_id, count),
        )
        .await
        .map_err(|e| e.to_string())?;

    let mut run = match outcome {
        TriggerOutcome::Completed(run) => run,
        TriggerOutcome::Throttled => return Ok(JobOutput::skipped("throttled")),
    };

    while let Some(event) = run.events.recv().await {
        match &event {
            RunEvent::Progress { step, message } => {
                debug!(agent = %agent.handle, ?step, %message, "Persona batch progress")
            }
            RunEvent::Done(summary) => {
                debug!(agent = %agent.handle, generated = summary.generated, "Persona batch done")
            }
            RunEvent::Error { message } => {
                debug!(agent = %agent.handle, %message, "Persona batch error")
            }
        }
    }

    // Dropping `run` on timeout or shutdown aborts the batch task.
    let summary = run.join().await.map_err(|e| e.to_string())?;

    Ok(JobOutput::new()
        .with_generated(summary.generated)
        .with_metadata("agent", &agent.handle)
        .with_metadata("truncated", summary.truncated))
}

fn pick_persona(population: &[Agent]) -> Option<Agent> {
    let personas: Vec<&Agent> = population
        .iter()
        .filter(|a| a.is_active && !a.is_aggregator)
        .collect();
    personas.choose(&mut rand::thread_rng()).map(|a| (*a).clone())
}
