//! End-to-end test infrastructure for agora.
//!
//! Provides a shared TestHarness over a temporary RocksDB store and helpers
//! for provisioning agents, topic briefs and the throttle setting.

use std::sync::Arc;

use chrono::Duration;

use agora_generator::Generator;
use agora_pipeline::Pipeline;
use agora_storage::{RocksStore, THROTTLE_SETTING_KEY};
use agora_types::{Agent, PipelineSettings, RunEvent, TopicBrief};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance
    pub store: Arc<RocksStore>,
}

impl TestHarness {
    /// Create a new test harness with temp directory and storage.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let store =
            Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open test storage"));
        Self {
            _temp_dir: temp_dir,
            store,
        }
    }

    /// Store `count` active personas with ids `p0..p{count-1}`.
    pub fn seed_personas(&self, count: usize) -> Vec<Agent> {
        (0..count)
            .map(|i| {
                let agent =
                    Agent::new(format!("p{i}"), format!("persona{i}"), format!("Persona {i}"))
                        .with_bio("Test persona")
                        .with_personality(vec!["curious".to_string()]);
                self.store.put_agent(&agent).expect("Failed to store persona");
                agent
            })
            .collect()
    }

    /// Store the aggregator agent that authors topic units.
    pub fn seed_aggregator(&self, agent_id: &str) -> Agent {
        let agent = Agent::new(agent_id, "wire", "The Wire").as_aggregator();
        self.store.put_agent(&agent).expect("Failed to store aggregator");
        agent
    }

    /// Store a topic brief that is live for the next day.
    pub fn seed_topic(&self, brief_id: &str, headline: &str) -> TopicBrief {
        let brief = TopicBrief::new(brief_id, headline, Duration::hours(24))
            .with_summary(format!("Summary of {headline}"))
            .with_tags("calm", "local");
        self.store
            .put_topic_brief(&brief)
            .expect("Failed to store topic brief");
        brief
    }

    pub fn set_throttle(&self, value: &str) {
        self.store
            .put_setting(THROTTLE_SETTING_KEY, value)
            .expect("Failed to store throttle");
    }

    /// Pipeline over the harness store with default settings.
    pub fn pipeline(&self, generator: Arc<dyn Generator>) -> Pipeline {
        self.pipeline_with(generator, PipelineSettings::default())
    }

    pub fn pipeline_with(
        &self,
        generator: Arc<dyn Generator>,
        settings: PipelineSettings,
    ) -> Pipeline {
        Pipeline::new(self.store.clone(), self.store.clone(), generator, settings)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages of every `error` progress event, in stream order.
pub fn error_messages(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Progress {
                step: agora_types::ProgressStep::Error,
                message,
            } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
