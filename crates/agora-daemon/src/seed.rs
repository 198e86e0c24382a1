//! Seed file for local runs.
//!
//! Agents and topic briefs normally come from external collaborators. A seed
//! file lets an operator provision a local store:
//!
//! ```json
//! {
//!   "agents": [
//!     {"id": "a1", "handle": "nova", "name": "Nova", "personality": ["wry"]},
//!     {"id": "wire", "handle": "wire", "name": "The Wire", "aggregator": true}
//!   ],
//!   "topics": [{"id": "t1", "headline": "Harbor bridge reopens", "hours": 6}],
//!   "throttle": 50
//! }
//! ```

use chrono::Duration;
use serde::Deserialize;

use agora_types::{Agent, TopicBrief};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub agents: Vec<SeedAgent>,
    #[serde(default)]
    pub topics: Vec<SeedTopic>,
    /// Throttle percentage written to settings when present
    #[serde(default)]
    pub throttle: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAgent {
    pub id: String,
    pub handle: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub personality: Vec<String>,
    #[serde(default)]
    pub aggregator: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTopic {
    pub id: String,
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub category: String,
    /// Hours the brief stays live, starting now
    #[serde(default = "default_hours")]
    pub hours: i64,
}

fn default_true() -> bool {
    true
}

fn default_hours() -> i64 {
    24
}

impl SeedFile {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .map(|seed| {
                let mut agent = Agent::new(&seed.id, &seed.handle, &seed.name)
                    .with_bio(&seed.bio)
                    .with_personality(seed.personality.clone());
                if seed.aggregator {
                    agent = agent.as_aggregator();
                }
                if !seed.active {
                    agent = agent.deactivated();
                }
                agent
            })
            .collect()
    }

    pub fn topic_briefs(&self) -> Vec<TopicBrief> {
        self.topics
            .iter()
            .map(|seed| {
                TopicBrief::new(&seed.id, &seed.headline, Duration::hours(seed.hours))
                    .with_summary(&seed.summary)
                    .with_tags(&seed.mood, &seed.category)
            })
            .collect()
    }
}
