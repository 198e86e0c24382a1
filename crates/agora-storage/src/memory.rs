//! In-process store for tests and dry runs.
//!
//! Counter increments are applied under the write lock, which gives the same
//! relative-delta semantics as the RocksDB merge operator. Individual
//! operations can be made to fail to exercise the pipeline's isolation paths.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use agora_types::{
    new_id, Agent, ContentUnit, EngagementRecord, NewUnit, TopicBrief, UnitCounter,
};

use crate::error::StorageError;
use crate::store::{SettingsReader, Store, StoreStats};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetAgent,
    ListActiveAgents,
    RecentUnits,
    LiveTopics,
    InsertUnit,
    InsertReply,
    InsertEngagement,
    ReadSetting,
}

#[derive(Default)]
struct Inner {
    agents: Vec<Agent>,
    units: Vec<ContentUnit>,
    topics: Vec<TopicBrief>,
    engagements: Vec<EngagementRecord>,
    settings: HashMap<String, String>,
    failing: HashSet<StoreOp>,
    failing_agents: HashSet<String>,
}

/// Store holding everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_agent(&self, agent: Agent) {
        let mut inner = self.inner.write().unwrap();
        inner.agents.retain(|a| a.agent_id != agent.agent_id);
        inner.agents.push(agent);
    }

    pub fn put_topic_brief(&self, brief: TopicBrief) {
        let mut inner = self.inner.write().unwrap();
        inner.topics.retain(|b| b.brief_id != brief.brief_id);
        inner.topics.push(brief);
    }

    pub fn put_setting(&self, key: &str, value: &str) {
        self.inner
            .write()
            .unwrap()
            .settings
            .insert(key.to_string(), value.to_string());
    }

    /// Make every subsequent call of `op` fail.
    pub fn fail_on(&self, op: StoreOp) {
        self.inner.write().unwrap().failing.insert(op);
    }

    /// Make writes attributed to `agent_id` (units and engagements) fail.
    pub fn fail_writes_for(&self, agent_id: &str) {
        self.inner
            .write()
            .unwrap()
            .failing_agents
            .insert(agent_id.to_string());
    }

    /// Snapshot of all units in insertion order.
    pub fn units(&self) -> Vec<ContentUnit> {
        self.inner.read().unwrap().units.clone()
    }

    /// Snapshot of all engagement records in insertion order.
    pub fn engagements(&self) -> Vec<EngagementRecord> {
        self.inner.read().unwrap().engagements.clone()
    }

    fn check(&self, op: StoreOp) -> Result<(), StorageError> {
        if self.inner.read().unwrap().failing.contains(&op) {
            return Err(StorageError::Injected(format!("{op:?}")));
        }
        Ok(())
    }

    fn check_agent(&self, agent_id: &str) -> Result<(), StorageError> {
        if self.inner.read().unwrap().failing_agents.contains(agent_id) {
            return Err(StorageError::Injected(format!("write by {agent_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        self.check(StoreOp::GetAgent)?;
        let inner = self.inner.read().unwrap();
        Ok(inner.agents.iter().find(|a| a.agent_id == agent_id).cloned())
    }

    async fn list_active_agents(&self) -> Result<Vec<Agent>, StorageError> {
        self.check(StoreOp::ListActiveAgents)?;
        let inner = self.inner.read().unwrap();
        Ok(inner.agents.iter().filter(|a| a.is_active).cloned().collect())
    }

    async fn find_aggregator(&self) -> Result<Option<Agent>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .agents
            .iter()
            .find(|a| a.is_active && a.is_aggregator)
            .cloned())
    }

    async fn recent_top_level_units(
        &self,
        limit: usize,
    ) -> Result<Vec<ContentUnit>, StorageError> {
        self.check(StoreOp::RecentUnits)?;
        let inner = self.inner.read().unwrap();
        Ok(inner
            .units
            .iter()
            .rev()
            .filter(|u| !u.is_reply())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn live_topic_briefs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TopicBrief>, StorageError> {
        self.check(StoreOp::LiveTopics)?;
        let inner = self.inner.read().unwrap();
        Ok(inner.topics.iter().filter(|b| b.is_live(now)).cloned().collect())
    }

    async fn insert_unit(&self, unit: NewUnit) -> Result<ContentUnit, StorageError> {
        if unit.parent_id.is_some() {
            self.check(StoreOp::InsertReply)?;
        } else {
            self.check(StoreOp::InsertUnit)?;
        }
        self.check_agent(&unit.agent_id)?;

        let unit = ContentUnit::from_new(new_id(), unit, Utc::now());
        self.inner.write().unwrap().units.push(unit.clone());
        Ok(unit)
    }

    async fn get_unit(&self, unit_id: &str) -> Result<Option<ContentUnit>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.units.iter().find(|u| u.unit_id == unit_id).cloned())
    }

    async fn replies_to(&self, unit_id: &str) -> Result<Vec<ContentUnit>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .units
            .iter()
            .filter(|u| u.parent_id.as_deref() == Some(unit_id))
            .cloned()
            .collect())
    }

    async fn increment_agent_units(&self, agent_id: &str, delta: i64) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        let agent = inner
            .agents
            .iter_mut()
            .find(|a| a.agent_id == agent_id)
            .ok_or_else(|| StorageError::NotFound(format!("agent {agent_id}")))?;
        agent.unit_count += delta;
        Ok(())
    }

    async fn increment_unit_counter(
        &self,
        unit_id: &str,
        counter: UnitCounter,
        delta: i64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().unwrap();
        let unit = inner
            .units
            .iter_mut()
            .find(|u| u.unit_id == unit_id)
            .ok_or_else(|| StorageError::NotFound(format!("unit {unit_id}")))?;
        let current = unit.counter(counter);
        unit.set_counter(counter, current + delta);
        Ok(())
    }

    async fn insert_engagement(&self, record: &EngagementRecord) -> Result<(), StorageError> {
        self.check(StoreOp::InsertEngagement)?;
        self.check_agent(&record.agent_id)?;
        self.inner.write().unwrap().engagements.push(record.clone());
        Ok(())
    }

    async fn list_engagements(&self) -> Result<Vec<EngagementRecord>, StorageError> {
        Ok(self.engagements())
    }

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(StoreStats {
            agents: inner.agents.len(),
            active_agents: inner.agents.iter().filter(|a| a.is_active).count(),
            units: inner.units.len(),
            replies: inner.units.iter().filter(|u| u.is_reply()).count(),
            topics: inner.topics.len(),
            engagements: inner.engagements.len(),
        })
    }
}

#[async_trait]
impl SettingsReader for MemoryStore {
    async fn read_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check(StoreOp::ReadSetting)?;
        Ok(self.inner.read().unwrap().settings.get(key).cloned())
    }
}
