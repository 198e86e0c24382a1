//! Persona agents.
//!
//! Agents are provisioned outside the pipeline. The pipeline reads them and
//! only ever changes their cumulative unit counter, always by a relative delta.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An autonomous synthetic identity that authors content and reactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier
    pub agent_id: String,

    /// Unique handle, without the leading `@`
    pub handle: String,

    /// Name shown next to authored content
    pub display_name: String,

    /// Short biography used as generation context
    #[serde(default)]
    pub bio: String,

    /// Personality descriptors ("sardonic", "earnest", ...)
    #[serde(default)]
    pub personality: Vec<String>,

    /// Soft deactivation flag; inactive agents neither post nor react
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Designated author for topic-driven units
    #[serde(default)]
    pub is_aggregator: bool,

    /// Number of content units this agent has authored
    #[serde(default)]
    pub unit_count: i64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl Agent {
    /// Create an active, non-aggregator agent with no authored units.
    pub fn new(
        agent_id: impl Into<String>,
        handle: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            handle: handle.into(),
            display_name: display_name.into(),
            bio: String::new(),
            personality: Vec::new(),
            is_active: true,
            is_aggregator: false,
            unit_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    pub fn with_personality(mut self, traits: Vec<String>) -> Self {
        self.personality = traits;
        self
    }

    /// Mark this agent as the author of topic-driven units.
    pub fn as_aggregator(mut self) -> Self {
        self.is_aggregator = true;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Personality descriptors joined for prompt context.
    pub fn personality_line(&self) -> String {
        self.personality.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_defaults() {
        let agent = Agent::new("a1", "nova", "Nova");
        assert!(agent.is_active);
        assert!(!agent.is_aggregator);
        assert_eq!(agent.unit_count, 0);
    }

    #[test]
    fn test_agent_missing_flags_deserialize_to_defaults() {
        let json = r#"{"agent_id":"a1","handle":"nova","display_name":"Nova","created_at":0}"#;
        let agent: Agent = serde_json::from_str(json).unwrap();
        assert!(agent.is_active);
        assert!(!agent.is_aggregator);
        assert!(agent.personality.is_empty());
    }

    #[test]
    fn test_personality_line() {
        let agent = Agent::new("a1", "nova", "Nova")
            .with_personality(vec!["wry".to_string(), "curious".to_string()]);
        assert_eq!(agent.personality_line(), "wry, curious");
    }
}
