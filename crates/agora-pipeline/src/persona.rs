//! Persona batch: a sequence of generate-persist-react cycles for one agent.
//!
//! Each cycle emits `generating`, then either `ready` and `reacting` (after
//! which the fan-out runs to completion) or a single `error` record naming the
//! cycle. A failed cycle never aborts the batch. The run ends with exactly one
//! terminal record: `done` with the summary, or `error` when a precondition
//! failed before any cycle ran.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use agora_generator::{GenerationContext, Generator};
use agora_storage::Store;
use agora_types::{
    Agent, BatchSummary, ContentUnit, PipelineSettings, PostResult, ProgressStep, RunEvent,
    PERSONA_COUNT_LIMIT,
};

use crate::deadline::{self, Deadline};
use crate::error::{PipelineError, UnitError};
use crate::events::{EventSink, DEFAULT_EVENT_CAPACITY};
use crate::preview;
use crate::reactions::ReactionEngine;

const PREVIEW_CHARS: usize = 80;

/// Clamp a requested cycle count to `1..=max`, with `max` itself held to
/// `1..=PERSONA_COUNT_LIMIT`.
pub fn clamp_persona_count(count: usize, max: usize) -> usize {
    count.clamp(1, max.clamp(1, PERSONA_COUNT_LIMIT))
}

/// Runs persona batches against a store and generator.
pub struct PersonaBatch {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    reactions: ReactionEngine,
    settings: PipelineSettings,
}

impl PersonaBatch {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        settings: PipelineSettings,
    ) -> Self {
        let reactions =
            ReactionEngine::new(store.clone(), generator.clone(), settings.reactor_sample_size);
        Self {
            store,
            generator,
            reactions,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run a batch with the configured deadline.
    pub async fn run(
        &self,
        agent_id: &str,
        count: usize,
        sink: EventSink,
    ) -> Result<BatchSummary, PipelineError> {
        let deadline = Deadline::after_secs(self.settings.persona_deadline_secs);
        self.run_until(agent_id, count, sink, deadline).await
    }

    /// Run a batch, starting no new cycle once `deadline` has passed.
    ///
    /// Consumes the sink; the stream is closed when this returns.
    pub async fn run_until(
        &self,
        agent_id: &str,
        count: usize,
        sink: EventSink,
        deadline: Option<Deadline>,
    ) -> Result<BatchSummary, PipelineError> {
        let result = self.run_cycles(agent_id, count, &sink, deadline).await;
        match &result {
            Ok(summary) => sink.finish(RunEvent::Done(summary.clone())).await,
            Err(e) => {
                warn!(agent_id, error = %e, "Persona batch refused");
                sink.finish(RunEvent::error(e.to_string())).await;
            }
        }
        result
    }

    async fn run_cycles(
        &self,
        agent_id: &str,
        count: usize,
        sink: &EventSink,
        deadline: Option<Deadline>,
    ) -> Result<BatchSummary, PipelineError> {
        if !self.generator.has_credential() {
            return Err(PipelineError::MissingCredential);
        }

        let agent = match self.store.get_agent(agent_id).await? {
            Some(agent) if agent.is_active => agent,
            _ => return Err(PipelineError::AgentNotFound(agent_id.to_string())),
        };

        let count = clamp_persona_count(count, self.settings.max_persona_count);
        let context = self.load_context().await;

        info!(
            agent = %agent.handle,
            count,
            recent = context.recent.len(),
            topics = context.topics.len(),
            "Starting persona batch"
        );

        let mut summary = BatchSummary::default();
        for cycle in 1..=count {
            if deadline::expired(deadline) {
                warn!(agent = %agent.handle, cycle, count, "Run deadline reached");
                sink.progress(
                    ProgressStep::Error,
                    format!("Deadline reached before post {cycle}/{count}, stopping early"),
                )
                .await;
                summary.truncated = true;
                break;
            }

            sink.progress(
                ProgressStep::Generating,
                format!("Generating post {cycle}/{count} for @{}", agent.handle),
            )
            .await;

            match self.generate_cycle(&agent, &context).await {
                Ok(unit) => {
                    sink.progress(
                        ProgressStep::Ready,
                        format!(
                            "Post {cycle}/{count} ready ({}): {}",
                            unit.kind,
                            preview(&unit.body, PREVIEW_CHARS)
                        ),
                    )
                    .await;
                    summary.posts.push(PostResult {
                        post_id: unit.unit_id.clone(),
                        post: preview(&unit.body, PREVIEW_CHARS),
                        kind: unit.kind,
                        has_media: unit.has_media(),
                    });

                    sink.progress(
                        ProgressStep::Reacting,
                        format!("Agents reacting to post {cycle}/{count}"),
                    )
                    .await;
                    self.reactions.react(&unit, &agent).await;
                }
                Err(e) => {
                    warn!(agent = %agent.handle, cycle, error = %e, "Cycle failed");
                    sink.progress(
                        ProgressStep::Error,
                        format!("Post {cycle}/{count} failed: {e}"),
                    )
                    .await;
                }
            }
        }

        summary.generated = summary.posts.len();
        info!(
            agent = %agent.handle,
            generated = summary.generated,
            requested = count,
            truncated = summary.truncated,
            "Persona batch complete"
        );
        Ok(summary)
    }

    /// Recent units and live topics. Either read may fail without stopping the run.
    async fn load_context(&self) -> GenerationContext {
        let recent = self
            .store
            .recent_top_level_units(self.settings.recent_window)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load recent units, continuing without them");
                Vec::new()
            });
        let topics = self
            .store
            .live_topic_briefs(Utc::now())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load topic briefs, continuing without them");
                Vec::new()
            });
        GenerationContext { recent, topics }
    }

    async fn generate_cycle(
        &self,
        agent: &Agent,
        context: &GenerationContext,
    ) -> Result<ContentUnit, UnitError> {
        let generated = self.generator.generate_unit(agent, context).await?;
        let unit = self
            .store
            .insert_unit(generated.into_new_unit(&agent.agent_id))
            .await?;
        if let Err(e) = self.store.increment_agent_units(&agent.agent_id, 1).await {
            warn!(agent = %agent.handle, error = %e, "Failed to bump unit count");
        }
        Ok(unit)
    }
}

/// A persona batch running on its own task.
///
/// The task belongs to this handle: dropping the run aborts the batch at its
/// next await point, so nothing is written once the owner has given up on it.
pub struct PersonaRun {
    /// Ordered event stream; ends after the terminal record
    pub events: mpsc::Receiver<RunEvent>,
    handle: JoinHandle<Result<BatchSummary, PipelineError>>,
}

impl PersonaRun {
    /// Wait for the batch task and return its result.
    pub async fn join(mut self) -> Result<BatchSummary, PipelineError> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Task(e.to_string())),
        }
    }

    /// Wait for the run, collecting every event.
    pub async fn collect(mut self) -> (Vec<RunEvent>, Result<BatchSummary, PipelineError>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.join().await)
    }
}

impl Drop for PersonaRun {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            debug!("Persona run dropped before completion, aborting batch");
            self.handle.abort();
        }
    }
}

/// Start a persona batch on a new task and hand back its event stream.
pub fn spawn_persona_batch(batch: Arc<PersonaBatch>, agent_id: String, count: usize) -> PersonaRun {
    let (sink, events) = EventSink::channel(DEFAULT_EVENT_CAPACITY);
    let handle = tokio::spawn(async move { batch.run(&agent_id, count, sink).await });
    PersonaRun { events, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_generator::ScriptedGenerator;
    use agora_storage::{MemoryStore, StoreOp};
    use agora_types::TopicBrief;
    use std::time::Duration;

    fn store_with_agents(n: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 0..n {
            store.put_agent(Agent::new(format!("a{i}"), format!("agent{i}"), format!("Agent {i}")));
        }
        store
    }

    fn batch(store: Arc<MemoryStore>, generator: ScriptedGenerator) -> Arc<PersonaBatch> {
        Arc::new(PersonaBatch::new(
            store,
            Arc::new(generator),
            PipelineSettings::default(),
        ))
    }

    fn steps(events: &[RunEvent]) -> Vec<ProgressStep> {
        events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Progress { step, .. } => Some(*step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_clamp_persona_count() {
        assert_eq!(clamp_persona_count(0, 20), 1);
        assert_eq!(clamp_persona_count(7, 20), 7);
        assert_eq!(clamp_persona_count(99, 20), 20);
        assert_eq!(clamp_persona_count(3, 0), 1);
        assert_eq!(clamp_persona_count(500, 500), 20);
    }

    #[tokio::test]
    async fn test_configured_max_cannot_exceed_limit() {
        let store = store_with_agents(1);
        let settings = PipelineSettings {
            max_persona_count: 500,
            reactor_sample_size: 0,
            ..Default::default()
        };
        let batch = Arc::new(PersonaBatch::new(
            store.clone(),
            Arc::new(ScriptedGenerator::new()),
            settings,
        ));

        let (_, result) = spawn_persona_batch(batch, "a0".into(), 500).collect().await;

        assert_eq!(result.unwrap().generated, PERSONA_COUNT_LIMIT);
        assert_eq!(store.units().len(), PERSONA_COUNT_LIMIT);
    }

    #[tokio::test]
    async fn test_every_third_failure_isolated() {
        let store = store_with_agents(1);
        let run = spawn_persona_batch(
            batch(store.clone(), ScriptedGenerator::new().failing_every(3)),
            "a0".to_string(),
            5,
        );
        let (events, result) = run.collect().await;

        let summary = result.unwrap();
        assert_eq!(summary.generated, 3);
        assert_eq!(summary.posts.len(), 3);
        assert_eq!(store.units().len(), 3);

        let errors: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::Progress {
                    step: ProgressStep::Error,
                    message,
                } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Post 3/5"));
        assert!(errors[1].starts_with("Post 5/5"));

        assert_eq!(events.last(), Some(&RunEvent::Done(summary)));
    }

    #[tokio::test]
    async fn test_cycle_event_order() {
        let store = store_with_agents(2);
        let run = spawn_persona_batch(batch(store, ScriptedGenerator::new()), "a0".into(), 2);
        let (events, _) = run.collect().await;

        use ProgressStep::*;
        assert_eq!(
            steps(&events),
            vec![Generating, Ready, Reacting, Generating, Ready, Reacting]
        );
        assert_eq!(events.len(), 7);
        assert!(events[6].is_terminal());
    }

    #[tokio::test]
    async fn test_reactions_finish_before_next_cycle() {
        let store = store_with_agents(3);
        let generator = ScriptedGenerator::new()
            .default_decision(agora_generator::EngagementDecision::Comment);
        let run = spawn_persona_batch(batch(store.clone(), generator), "a0".into(), 2);
        let (_, result) = run.collect().await;
        assert_eq!(result.unwrap().generated, 2);

        // Top-level units interleave with their replies: post, 2 replies, post, 2 replies.
        let units = store.units();
        assert_eq!(units.len(), 6);
        assert!(!units[0].is_reply());
        assert!(units[1].is_reply() && units[2].is_reply());
        assert!(!units[3].is_reply());
        assert_eq!(units[4].parent_id.as_deref(), Some(units[3].unit_id.as_str()));
    }

    #[tokio::test]
    async fn test_missing_credential_is_fatal() {
        let store = store_with_agents(1);
        let generator = Arc::new(ScriptedGenerator::new().without_credential());
        let batch = Arc::new(PersonaBatch::new(
            store.clone(),
            generator.clone(),
            PipelineSettings::default(),
        ));
        let (events, result) = spawn_persona_batch(batch, "a0".into(), 3).collect().await;

        assert!(matches!(result, Err(PipelineError::MissingCredential)));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RunEvent::Error { .. }));
        assert_eq!(generator.unit_calls(), 0);
        assert!(store.units().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_agent_is_fatal() {
        let store = store_with_agents(1);
        store.put_agent(Agent::new("gone", "gone", "Gone").deactivated());
        let batch = batch(store, ScriptedGenerator::new());

        let (events, result) = spawn_persona_batch(batch.clone(), "missing".into(), 1)
            .collect()
            .await;
        assert!(matches!(result, Err(PipelineError::AgentNotFound(id)) if id == "missing"));
        assert_eq!(events.len(), 1);

        let (_, result) = spawn_persona_batch(batch, "gone".into(), 1).collect().await;
        assert!(matches!(result, Err(PipelineError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn test_agent_lookup_failure_is_fatal() {
        let store = store_with_agents(1);
        store.fail_on(StoreOp::GetAgent);
        let generator = Arc::new(ScriptedGenerator::new());
        let batch = Arc::new(PersonaBatch::new(
            store.clone(),
            generator.clone(),
            PipelineSettings::default(),
        ));

        let (events, result) = spawn_persona_batch(batch, "a0".into(), 2).collect().await;

        assert!(matches!(result, Err(PipelineError::Storage(_))));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RunEvent::Error { .. }));
        assert_eq!(generator.unit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_batch() {
        let store = store_with_agents(1);
        let generator = ScriptedGenerator::new().with_unit_delay(Duration::from_millis(300));
        let run = spawn_persona_batch(batch(store.clone(), generator), "a0".into(), 10);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        drop(run);
        let written = store.units().len();
        assert!(written < 10);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.units().len(), written);
    }

    #[tokio::test]
    async fn test_context_reads_are_best_effort() {
        let store = store_with_agents(1);
        store.put_topic_brief(TopicBrief::new("t1", "Eclipse", chrono::Duration::hours(2)));
        store.fail_on(StoreOp::RecentUnits);
        store.fail_on(StoreOp::LiveTopics);

        let (_, result) =
            spawn_persona_batch(batch(store, ScriptedGenerator::new()), "a0".into(), 1)
                .collect()
                .await;
        assert_eq!(result.unwrap().generated, 1);
    }

    #[tokio::test]
    async fn test_persist_failure_is_a_cycle_error() {
        let store = store_with_agents(1);
        store.fail_on(StoreOp::InsertUnit);

        let (events, result) =
            spawn_persona_batch(batch(store, ScriptedGenerator::new()), "a0".into(), 2)
                .collect()
                .await;
        assert_eq!(result.unwrap().generated, 0);
        assert_eq!(
            events.iter().filter(|e| e.is_step(ProgressStep::Error)).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_unit_count_incremented() {
        let store = store_with_agents(1);
        let (_, result) =
            spawn_persona_batch(batch(store.clone(), ScriptedGenerator::new()), "a0".into(), 3)
                .collect()
                .await;
        assert_eq!(result.unwrap().generated, 3);
        assert_eq!(store.get_agent("a0").await.unwrap().unwrap().unit_count, 3);
    }

    #[tokio::test]
    async fn test_expired_deadline_truncates_with_done() {
        let store = store_with_agents(1);
        let batch = batch(store.clone(), ScriptedGenerator::new());
        let (sink, mut rx) = EventSink::channel(16);

        let deadline = Deadline::at(tokio::time::Instant::now());
        let summary = batch.run_until("a0", 4, sink, Some(deadline)).await.unwrap();

        assert!(summary.truncated);
        assert_eq!(summary.generated, 0);
        assert!(rx.recv().await.unwrap().is_step(ProgressStep::Error));
        assert!(matches!(rx.recv().await, Some(RunEvent::Done(s)) if s.truncated));
        assert!(rx.recv().await.is_none());
        assert!(store.units().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_observer_does_not_stop_run() {
        let store = store_with_agents(1);
        let mut run =
            spawn_persona_batch(batch(store.clone(), ScriptedGenerator::new()), "a0".into(), 3);
        run.events.close();

        let summary = run.join().await.unwrap();
        assert_eq!(summary.generated, 3);
        assert_eq!(store.units().len(), 3);
    }
}
