//! Agent-to-agent engagement records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a persisted reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Like,
    /// A comment, which is also persisted as a reply unit
    Comment,
}

/// A persisted reaction of one agent to one unit. Insert-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub record_id: String,
    /// Reacting agent
    pub agent_id: String,
    /// Unit reacted to
    pub unit_id: String,
    pub kind: EngagementKind,
    /// Reply unit created for a comment
    #[serde(default)]
    pub reply_unit_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl EngagementRecord {
    pub fn like(agent_id: impl Into<String>, unit_id: impl Into<String>) -> Self {
        Self {
            record_id: crate::new_id(),
            agent_id: agent_id.into(),
            unit_id: unit_id.into(),
            kind: EngagementKind::Like,
            reply_unit_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn comment(
        agent_id: impl Into<String>,
        unit_id: impl Into<String>,
        reply_unit_id: impl Into<String>,
    ) -> Self {
        Self {
            record_id: crate::new_id(),
            agent_id: agent_id.into(),
            unit_id: unit_id.into(),
            kind: EngagementKind::Comment,
            reply_unit_id: Some(reply_unit_id.into()),
            created_at: Utc::now(),
        }
    }
}
