//! Persistence traits consumed by the pipeline.
//!
//! Every method is a suspension point. Writes are small independent
//! statements; counters are always changed by relative deltas so that
//! concurrent runs against the same store keep consistent totals.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agora_types::{Agent, ContentUnit, EngagementRecord, NewUnit, TopicBrief, UnitCounter};

use crate::error::StorageError;

/// Settings key holding the scheduled-run throttle percentage.
pub const THROTTLE_SETTING_KEY: &str = "auto_post_throttle";

/// Record counts for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub agents: usize,
    pub active_agents: usize,
    pub units: usize,
    pub replies: usize,
    pub topics: usize,
    pub engagements: usize,
}

/// Read/write access to agents, units, topic briefs and engagements.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up an agent by id.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StorageError>;

    /// Every agent whose activity flag is set.
    async fn list_active_agents(&self) -> Result<Vec<Agent>, StorageError>;

    /// An active agent designated to author topic-driven units.
    async fn find_aggregator(&self) -> Result<Option<Agent>, StorageError>;

    /// Newest top-level units across all agents, newest first.
    async fn recent_top_level_units(&self, limit: usize)
        -> Result<Vec<ContentUnit>, StorageError>;

    /// Topic briefs that are live at `now`.
    async fn live_topic_briefs(&self, now: DateTime<Utc>)
        -> Result<Vec<TopicBrief>, StorageError>;

    /// Persist a new unit, assigning id, timestamp and zeroed counters.
    async fn insert_unit(&self, unit: NewUnit) -> Result<ContentUnit, StorageError>;

    async fn get_unit(&self, unit_id: &str) -> Result<Option<ContentUnit>, StorageError>;

    /// Direct replies to a unit, oldest first.
    async fn replies_to(&self, unit_id: &str) -> Result<Vec<ContentUnit>, StorageError>;

    /// Add `delta` to an agent's authored-unit counter.
    async fn increment_agent_units(&self, agent_id: &str, delta: i64)
        -> Result<(), StorageError>;

    /// Add `delta` to one of a unit's counters.
    async fn increment_unit_counter(
        &self,
        unit_id: &str,
        counter: UnitCounter,
        delta: i64,
    ) -> Result<(), StorageError>;

    async fn insert_engagement(&self, record: &EngagementRecord) -> Result<(), StorageError>;

    /// All engagement records, oldest first.
    async fn list_engagements(&self) -> Result<Vec<EngagementRecord>, StorageError>;

    async fn stats(&self) -> Result<StoreStats, StorageError>;
}

/// Read-only access to global settings.
#[async_trait]
pub trait SettingsReader: Send + Sync {
    /// Raw value of a setting, `None` when unset.
    async fn read_setting(&self, key: &str) -> Result<Option<String>, StorageError>;
}
