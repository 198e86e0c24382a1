//! Topic briefs steering topic-driven generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived structured context for a topic batch.
///
/// Produced by an external topic collaborator and consumed read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBrief {
    pub brief_id: String,
    pub headline: String,
    #[serde(default)]
    pub summary: String,
    /// Mood tag ("urgent", "playful", ...)
    #[serde(default)]
    pub mood: String,
    /// Category tag ("tech", "sports", ...)
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub active_from: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl TopicBrief {
    /// Create an active brief valid for `window` starting now.
    pub fn new(
        brief_id: impl Into<String>,
        headline: impl Into<String>,
        window: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            brief_id: brief_id.into(),
            headline: headline.into(),
            summary: String::new(),
            mood: String::new(),
            category: String::new(),
            is_active: true,
            active_from: now,
            expires_at: now + window,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_tags(mut self, mood: impl Into<String>, category: impl Into<String>) -> Self {
        self.mood = mood.into();
        self.category = category.into();
        self
    }

    /// Active, started, and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.active_from <= now && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_live_window() {
        let brief = TopicBrief::new("t1", "Launch day", Duration::hours(2));
        let now = Utc::now();
        assert!(brief.is_live(now));
        assert!(!brief.is_live(now + Duration::hours(3)));
        assert!(!brief.is_live(brief.active_from - Duration::seconds(1)));
    }

    #[test]
    fn test_inactive_brief_is_never_live() {
        let mut brief = TopicBrief::new("t1", "Launch day", Duration::hours(2));
        brief.is_active = false;
        assert!(!brief.is_live(Utc::now()));
    }
}
