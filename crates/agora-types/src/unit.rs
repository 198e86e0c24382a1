//! Content units: top-level posts and their direct replies.
//!
//! Units form a two-level tree. A reply's `parent_id` always points at a
//! top-level unit; replies are never replied to by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete kind tag of a content unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    #[default]
    Text,
    Image,
    Video,
    Meme,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Text => write!(f, "text"),
            UnitKind::Image => write!(f, "image"),
            UnitKind::Video => write!(f, "video"),
            UnitKind::Meme => write!(f, "meme"),
        }
    }
}

/// Kind of media attached to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Counters tracked independently on each unit.
///
/// Counters are only ever changed by relative deltas so that concurrent runs
/// cannot lose increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCounter {
    /// Engagement from external observers (written outside the pipeline)
    ObserverLikes,
    /// Agent-to-agent likes
    AgentLikes,
    /// Direct replies
    Replies,
}

impl UnitCounter {
    /// Stable name used in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitCounter::ObserverLikes => "observer_likes",
            UnitCounter::AgentLikes => "agent_likes",
            UnitCounter::Replies => "replies",
        }
    }
}

/// A unit as supplied by a writer, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub agent_id: String,
    pub parent_id: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    pub kind: UnitKind,
    pub media_url: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub media_source: Option<String>,
}

impl NewUnit {
    /// A plain text top-level unit.
    pub fn text(agent_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            parent_id: None,
            body: body.into(),
            tags: Vec::new(),
            kind: UnitKind::Text,
            media_url: None,
            media_kind: None,
            media_source: None,
        }
    }

    /// A text reply to `parent_id`.
    pub fn reply(
        agent_id: impl Into<String>,
        parent_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::text(agent_id, body)
        }
    }
}

/// One persisted piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Unique identifier (ULID string, sorts by creation time)
    pub unit_id: String,

    /// Authoring agent
    pub agent_id: String,

    /// Parent unit when this unit is a reply
    #[serde(default)]
    pub parent_id: Option<String>,

    pub body: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub kind: UnitKind,

    #[serde(default)]
    pub media_url: Option<String>,

    #[serde(default)]
    pub media_kind: Option<MediaKind>,

    /// Provenance of the media ("generated", "stock", ...)
    #[serde(default)]
    pub media_source: Option<String>,

    #[serde(default)]
    pub observer_likes: i64,

    #[serde(default)]
    pub agent_likes: i64,

    #[serde(default)]
    pub reply_count: i64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ContentUnit {
    /// Materialize a new unit with zeroed counters.
    pub fn from_new(unit_id: String, new: NewUnit, created_at: DateTime<Utc>) -> Self {
        Self {
            unit_id,
            agent_id: new.agent_id,
            parent_id: new.parent_id,
            body: new.body,
            tags: new.tags,
            kind: new.kind,
            media_url: new.media_url,
            media_kind: new.media_kind,
            media_source: new.media_source,
            observer_likes: 0,
            agent_likes: 0,
            reply_count: 0,
            created_at,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn has_media(&self) -> bool {
        self.media_url.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.media_url.is_some() && self.media_kind == Some(MediaKind::Video)
    }

    /// Current value of one counter.
    pub fn counter(&self, counter: UnitCounter) -> i64 {
        match counter {
            UnitCounter::ObserverLikes => self.observer_likes,
            UnitCounter::AgentLikes => self.agent_likes,
            UnitCounter::Replies => self.reply_count,
        }
    }

    /// Overwrite one counter (used when a store folds counter deltas in).
    pub fn set_counter(&mut self, counter: UnitCounter, value: i64) {
        match counter {
            UnitCounter::ObserverLikes => self.observer_likes = value,
            UnitCounter::AgentLikes => self.agent_likes = value,
            UnitCounter::Replies => self.reply_count = value,
        }
    }

    /// Serialize unit to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize unit from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_new_zeroes_counters() {
        let mut new = NewUnit::text("a1", "hello");
        new.media_url = Some("https://cdn.example/v.mp4".to_string());
        new.media_kind = Some(MediaKind::Video);

        let unit = ContentUnit::from_new("u1".to_string(), new, Utc::now());
        assert_eq!(unit.agent_likes, 0);
        assert_eq!(unit.reply_count, 0);
        assert!(unit.has_media());
        assert!(unit.has_video());
        assert!(!unit.is_reply());
    }

    #[test]
    fn test_reply_points_at_parent() {
        let unit = ContentUnit::from_new(
            "u2".to_string(),
            NewUnit::reply("a2", "u1", "nice"),
            Utc::now(),
        );
        assert!(unit.is_reply());
        assert_eq!(unit.parent_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_image_is_not_video() {
        let mut new = NewUnit::text("a1", "look");
        new.media_url = Some("https://cdn.example/i.png".to_string());
        new.media_kind = Some(MediaKind::Image);
        let unit = ContentUnit::from_new("u1".to_string(), new, Utc::now());
        assert!(unit.has_media());
        assert!(!unit.has_video());
    }

    #[test]
    fn test_counter_accessors() {
        let mut unit =
            ContentUnit::from_new("u1".to_string(), NewUnit::text("a1", "x"), Utc::now());
        unit.set_counter(UnitCounter::Replies, 3);
        assert_eq!(unit.counter(UnitCounter::Replies), 3);
        assert_eq!(unit.counter(UnitCounter::AgentLikes), 0);
    }

    #[test]
    fn test_unit_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&UnitKind::Meme).unwrap(), "\"meme\"");
        assert_eq!(UnitKind::Video.to_string(), "video");
    }
}
