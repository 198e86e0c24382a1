//! RocksDB-backed store.
//!
//! Provides:
//! - Database open with column family setup
//! - JSON-encoded records per column family
//! - Counters held outside the records as merge-operator deltas; reads fold
//!   the counter values into the returned records
//! - Provisioning helpers (agents, topic briefs, settings) for the seed path

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use agora_types::{Agent, ContentUnit, EngagementRecord, NewUnit, TopicBrief, UnitCounter};

use crate::column_families::{
    build_cf_descriptors, CF_AGENTS, CF_COUNTERS, CF_ENGAGEMENTS, CF_SETTINGS, CF_TOPICS,
    CF_UNITS,
};
use crate::error::StorageError;
use crate::keys::{agent_unit_count_key, decode_counter, encode_counter, unit_counter_key, UnitKey};
use crate::store::{SettingsReader, Store, StoreStats};

const UNIT_COUNTERS: [UnitCounter; 3] = [
    UnitCounter::ObserverLikes,
    UnitCounter::AgentLikes,
    UnitCounter::Replies,
];

/// Persistent store backed by a single RocksDB instance.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<(), StorageError> {
        let cf = self.cf(cf)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        cf: &str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        let cf = self.cf(cf)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(
        &self,
        cf: &str,
        mode: IteratorMode,
    ) -> Result<Vec<T>, StorageError> {
        let cf = self.cf(cf)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn read_counter(&self, key: &[u8]) -> Result<i64, StorageError> {
        let cf = self.cf(CF_COUNTERS)?;
        Ok(self.db.get_cf(cf, key)?.map(|v| decode_counter(&v)).unwrap_or(0))
    }

    fn merge_counter(&self, key: &[u8], delta: i64) -> Result<(), StorageError> {
        let cf = self.cf(CF_COUNTERS)?;
        self.db.merge_cf(cf, key, encode_counter(delta))?;
        Ok(())
    }

    fn with_agent_counters(&self, mut agent: Agent) -> Result<Agent, StorageError> {
        agent.unit_count += self.read_counter(&agent_unit_count_key(&agent.agent_id))?;
        Ok(agent)
    }

    fn with_unit_counters(&self, mut unit: ContentUnit) -> Result<ContentUnit, StorageError> {
        for counter in UNIT_COUNTERS {
            let value = self.read_counter(&unit_counter_key(&unit.unit_id, counter))?;
            unit.set_counter(counter, unit.counter(counter) + value);
        }
        Ok(unit)
    }

    fn all_agents(&self) -> Result<Vec<Agent>, StorageError> {
        self.scan_json::<Agent>(CF_AGENTS, IteratorMode::Start)?
            .into_iter()
            .map(|a| self.with_agent_counters(a))
            .collect()
    }

    /// Insert or replace an agent record (provisioning path).
    pub fn put_agent(&self, agent: &Agent) -> Result<(), StorageError> {
        self.put_json(CF_AGENTS, agent.agent_id.as_bytes(), agent)?;
        debug!(agent_id = %agent.agent_id, "Stored agent");
        Ok(())
    }

    /// Insert or replace a topic brief (provisioning path).
    pub fn put_topic_brief(&self, brief: &TopicBrief) -> Result<(), StorageError> {
        self.put_json(CF_TOPICS, brief.brief_id.as_bytes(), brief)?;
        debug!(brief_id = %brief.brief_id, "Stored topic brief");
        Ok(())
    }

    /// Write a global setting (provisioning path).
    pub fn put_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_SETTINGS)?;
        self.db.put_cf(cf, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        self.get_json::<Agent>(CF_AGENTS, agent_id.as_bytes())?
            .map(|a| self.with_agent_counters(a))
            .transpose()
    }

    async fn list_active_agents(&self) -> Result<Vec<Agent>, StorageError> {
        Ok(self
            .all_agents()?
            .into_iter()
            .filter(|a| a.is_active)
            .collect())
    }

    async fn find_aggregator(&self) -> Result<Option<Agent>, StorageError> {
        Ok(self
            .all_agents()?
            .into_iter()
            .find(|a| a.is_active && a.is_aggregator))
    }

    async fn recent_top_level_units(
        &self,
        limit: usize,
    ) -> Result<Vec<ContentUnit>, StorageError> {
        let cf = self.cf(CF_UNITS)?;
        let mut out = Vec::with_capacity(limit);
        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item?;
            let unit = ContentUnit::from_bytes(&value)?;
            if !unit.is_reply() {
                out.push(self.with_unit_counters(unit)?);
            }
        }
        Ok(out)
    }

    async fn live_topic_briefs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TopicBrief>, StorageError> {
        Ok(self
            .scan_json::<TopicBrief>(CF_TOPICS, IteratorMode::Start)?
            .into_iter()
            .filter(|b| b.is_live(now))
            .collect())
    }

    async fn insert_unit(&self, unit: NewUnit) -> Result<ContentUnit, StorageError> {
        let key = UnitKey::new();
        let created_at = DateTime::from_timestamp_millis(key.timestamp_ms).unwrap_or_else(Utc::now);
        let unit = ContentUnit::from_new(key.unit_id(), unit, created_at);

        let cf = self.cf(CF_UNITS)?;
        self.db.put_cf(cf, key.to_bytes(), unit.to_bytes()?)?;
        debug!(unit_id = %unit.unit_id, agent_id = %unit.agent_id, "Stored unit");
        Ok(unit)
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<ContentUnit>, StorageError> {
        let key = UnitKey::from_unit_id(unit_id)?;
        let cf = self.cf(CF_UNITS)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(self.with_unit_counters(ContentUnit::from_bytes(&bytes)?)?)),
            None => Ok(None),
        }
    }

    async fn replies_to(&self, unit_id: &str) -> Result<Vec<ContentUnit>, StorageError> {
        self.scan_json::<ContentUnit>(CF_UNITS, IteratorMode::Start)?
            .into_iter()
            .filter(|u| u.parent_id.as_deref() == Some(unit_id))
            .map(|u| self.with_unit_counters(u))
            .collect()
    }

    async fn increment_agent_units(&self, agent_id: &str, delta: i64) -> Result<(), StorageError> {
        self.merge_counter(&agent_unit_count_key(agent_id), delta)
    }

    async fn increment_unit_counter(
        &self,
        unit_id: &str,
        counter: UnitCounter,
        delta: i64,
    ) -> Result<(), StorageError> {
        self.merge_counter(&unit_counter_key(unit_id, counter), delta)
    }

    async fn insert_engagement(&self, record: &EngagementRecord) -> Result<(), StorageError> {
        self.put_json(CF_ENGAGEMENTS, record.record_id.as_bytes(), record)
    }

    async fn list_engagements(&self) -> Result<Vec<EngagementRecord>, StorageError> {
        self.scan_json(CF_ENGAGEMENTS, IteratorMode::Start)
    }

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        let agents = self.all_agents()?;
        let units: Vec<ContentUnit> = self.scan_json(CF_UNITS, IteratorMode::Start)?;
        let topics: Vec<TopicBrief> = self.scan_json(CF_TOPICS, IteratorMode::Start)?;
        let engagements: Vec<EngagementRecord> =
            self.scan_json(CF_ENGAGEMENTS, IteratorMode::Start)?;

        Ok(StoreStats {
            agents: agents.len(),
            active_agents: agents.iter().filter(|a| a.is_active).count(),
            units: units.len(),
            replies: units.iter().filter(|u| u.is_reply()).count(),
            topics: topics.len(),
            engagements: engagements.len(),
        })
    }
}

#[async_trait]
impl SettingsReader for RocksStore {
    async fn read_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let cf = self.cf(CF_SETTINGS)?;
        Ok(self
            .db
            .get_cf(cf, key.as_bytes())?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RocksStore) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_agent_roundtrip_and_counter() {
        let (_dir, store) = open_store();
        store.put_agent(&Agent::new("a1", "nova", "Nova")).unwrap();

        store.increment_agent_units("a1", 1).await.unwrap();
        store.increment_agent_units("a1", 2).await.unwrap();

        let agent = store.get_agent("a1").await.unwrap().unwrap();
        assert_eq!(agent.unit_count, 3);
        assert!(store.get_agent("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unit_counters_are_deltas() {
        let (_dir, store) = open_store();
        let unit = store.insert_unit(NewUnit::text("a1", "hello")).await.unwrap();

        store
            .increment_unit_counter(&unit.unit_id, UnitCounter::AgentLikes, 1)
            .await
            .unwrap();
        store
            .increment_unit_counter(&unit.unit_id, UnitCounter::AgentLikes, 1)
            .await
            .unwrap();
        store
            .increment_unit_counter(&unit.unit_id, UnitCounter::Replies, 1)
            .await
            .unwrap();

        let stored = store.get_unit(&unit.unit_id).await.unwrap().unwrap();
        assert_eq!(stored.agent_likes, 2);
        assert_eq!(stored.reply_count, 1);
        assert_eq!(stored.observer_likes, 0);
    }

    #[tokio::test]
    async fn test_recent_excludes_replies() {
        let (_dir, store) = open_store();
        let parent = store.insert_unit(NewUnit::text("a1", "first")).await.unwrap();
        store
            .insert_unit(NewUnit::reply("a2", &parent.unit_id, "reply"))
            .await
            .unwrap();
        store.insert_unit(NewUnit::text("a1", "second")).await.unwrap();

        let recent = store.recent_top_level_units(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|u| !u.is_reply()));

        let replies = store.replies_to(&parent.unit_id).await.unwrap();
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn test_live_topics_and_aggregator() {
        let (_dir, store) = open_store();
        store
            .put_topic_brief(&TopicBrief::new("t1", "Live", Duration::hours(1)))
            .unwrap();
        let mut expired = TopicBrief::new("t2", "Old", Duration::hours(1));
        expired.expires_at = Utc::now() - Duration::minutes(1);
        store.put_topic_brief(&expired).unwrap();

        let live = store.live_topic_briefs(Utc::now()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].brief_id, "t1");

        assert!(store.find_aggregator().await.unwrap().is_none());
        store
            .put_agent(&Agent::new("wire", "wire", "Wire Desk").as_aggregator())
            .unwrap();
        assert_eq!(
            store.find_aggregator().await.unwrap().unwrap().agent_id,
            "wire"
        );
    }

    #[tokio::test]
    async fn test_settings_and_stats() {
        let (_dir, store) = open_store();
        assert!(store.read_setting("auto_post_throttle").await.unwrap().is_none());
        store.put_setting("auto_post_throttle", "40").unwrap();
        assert_eq!(
            store.read_setting("auto_post_throttle").await.unwrap().as_deref(),
            Some("40")
        );

        store.put_agent(&Agent::new("a1", "nova", "Nova")).unwrap();
        store
            .put_agent(&Agent::new("a2", "old", "Old").deactivated())
            .unwrap();
        let unit = store.insert_unit(NewUnit::text("a1", "hi")).await.unwrap();
        store
            .insert_engagement(&EngagementRecord::like("a2", &unit.unit_id))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.active_agents, 1);
        assert_eq!(stats.units, 1);
        assert_eq!(stats.engagements, 1);
    }

    #[tokio::test]
    async fn test_reopen_preserves_counters() {
        let dir = TempDir::new().unwrap();
        let unit_id = {
            let store = RocksStore::open(dir.path()).unwrap();
            let unit = store.insert_unit(NewUnit::text("a1", "x")).await.unwrap();
            store
                .increment_unit_counter(&unit.unit_id, UnitCounter::Replies, 4)
                .await
                .unwrap();
            unit.unit_id
        };

        let store = RocksStore::open(dir.path()).unwrap();
        let unit = store.get_unit(&unit_id).await.unwrap().unwrap();
        assert_eq!(unit.reply_count, 4);
    }
}
