//! Deterministic generator for tests and dry runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use agora_types::{Agent, MediaKind, TopicBrief};

use super::{EngagementDecision, GeneratedUnit, GenerationContext, GenerationError, Generator};

/// Generator whose outputs and failures are fixed up front.
///
/// Topics are matched by `brief_id`. Engagement decisions come from a
/// per-reactor table, then a queue, then the default decision.
pub struct ScriptedGenerator {
    credential: bool,
    fail_every: Option<usize>,
    unit_delay: Option<Duration>,
    failing_topics: HashSet<String>,
    topic_yields: HashMap<String, usize>,
    default_yield: usize,
    topic_media: HashMap<String, MediaKind>,
    reactor_decisions: HashMap<String, EngagementDecision>,
    queued_decisions: Mutex<VecDeque<EngagementDecision>>,
    default_decision: EngagementDecision,
    failing_reactors: HashSet<String>,
    unit_calls: AtomicUsize,
    topic_calls: Mutex<Vec<String>>,
    decision_calls: Mutex<Vec<String>>,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    /// Always succeeds, yields 2 units per topic, and never engages.
    pub fn new() -> Self {
        Self {
            credential: true,
            fail_every: None,
            unit_delay: None,
            failing_topics: HashSet::new(),
            topic_yields: HashMap::new(),
            default_yield: 2,
            topic_media: HashMap::new(),
            reactor_decisions: HashMap::new(),
            queued_decisions: Mutex::new(VecDeque::new()),
            default_decision: EngagementDecision::None,
            failing_reactors: HashSet::new(),
            unit_calls: AtomicUsize::new(0),
            topic_calls: Mutex::new(Vec::new()),
            decision_calls: Mutex::new(Vec::new()),
        }
    }

    /// Report the generation credential as missing.
    pub fn without_credential(mut self) -> Self {
        self.credential = false;
        self
    }

    /// Fail every `n`th persona generation call (1-based: call n, 2n, ...).
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Sleep before answering each persona or topic generation call.
    pub fn with_unit_delay(mut self, delay: Duration) -> Self {
        self.unit_delay = Some(delay);
        self
    }

    pub fn failing_topic(mut self, brief_id: impl Into<String>) -> Self {
        self.failing_topics.insert(brief_id.into());
        self
    }

    pub fn topic_yield(mut self, brief_id: impl Into<String>, units: usize) -> Self {
        self.topic_yields.insert(brief_id.into(), units);
        self
    }

    pub fn default_yield(mut self, units: usize) -> Self {
        self.default_yield = units;
        self
    }

    /// Attach media of `kind` to every unit generated for a topic.
    pub fn topic_media(mut self, brief_id: impl Into<String>, kind: MediaKind) -> Self {
        self.topic_media.insert(brief_id.into(), kind);
        self
    }

    pub fn decision_for(mut self, reactor_id: impl Into<String>, d: EngagementDecision) -> Self {
        self.reactor_decisions.insert(reactor_id.into(), d);
        self
    }

    pub fn queued_decisions(self, decisions: impl IntoIterator<Item = EngagementDecision>) -> Self {
        self.queued_decisions
            .lock()
            .unwrap()
            .extend(decisions);
        self
    }

    pub fn default_decision(mut self, d: EngagementDecision) -> Self {
        self.default_decision = d;
        self
    }

    /// Make decision and comment calls for this reactor fail.
    pub fn failing_reactor(mut self, reactor_id: impl Into<String>) -> Self {
        self.failing_reactors.insert(reactor_id.into());
        self
    }

    /// Number of persona generation calls made so far.
    pub fn unit_calls(&self) -> usize {
        self.unit_calls.load(Ordering::SeqCst)
    }

    /// Brief ids in the order topic generation was attempted.
    pub fn topic_calls(&self) -> Vec<String> {
        self.topic_calls.lock().unwrap().clone()
    }

    /// Reactor ids in the order engagement decisions were requested.
    pub fn decision_calls(&self) -> Vec<String> {
        self.decision_calls.lock().unwrap().clone()
    }

    fn check_reactor(&self, reactor: &Agent) -> Result<(), GenerationError> {
        if self.failing_reactors.contains(&reactor.agent_id) {
            return Err(GenerationError::Scripted(format!(
                "reactor {} fails",
                reactor.agent_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn has_credential(&self) -> bool {
        self.credential
    }

    async fn generate_unit(
        &self,
        agent: &Agent,
        context: &GenerationContext,
    ) -> Result<GeneratedUnit, GenerationError> {
        if let Some(delay) = self.unit_delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.unit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.fail_every {
            if call % n == 0 {
                return Err(GenerationError::Scripted(format!("call {call} fails")));
            }
        }

        let mut unit = GeneratedUnit::text(format!(
            "@{} post #{call} ({} recent, {} topics)",
            agent.handle,
            context.recent.len(),
            context.topics.len()
        ));
        unit.tags.push(agent.handle.clone());
        Ok(unit)
    }

    async fn generate_topic_units(
        &self,
        agent: &Agent,
        brief: &TopicBrief,
    ) -> Result<Vec<GeneratedUnit>, GenerationError> {
        if let Some(delay) = self.unit_delay {
            tokio::time::sleep(delay).await;
        }
        self.topic_calls
            .lock()
            .unwrap()
            .push(brief.brief_id.clone());

        if self.failing_topics.contains(&brief.brief_id) {
            return Err(GenerationError::Scripted(format!(
                "topic {} fails",
                brief.brief_id
            )));
        }

        let count = self
            .topic_yields
            .get(&brief.brief_id)
            .copied()
            .unwrap_or(self.default_yield);
        let media = self.topic_media.get(&brief.brief_id).copied();

        Ok((1..=count)
            .map(|i| {
                let unit = GeneratedUnit::text(format!(
                    "@{} on {}: take {i}",
                    agent.handle, brief.headline
                ));
                match media {
                    Some(kind) => unit.with_media(
                        format!("https://media.invalid/{}/{i}", brief.brief_id),
                        kind,
                        "scripted",
                    ),
                    None => unit,
                }
            })
            .collect())
    }

    async fn decide_engagement(
        &self,
        reactor: &Agent,
        _unit_body: &str,
        _author_handle: &str,
    ) -> Result<EngagementDecision, GenerationError> {
        self.decision_calls
            .lock()
            .unwrap()
            .push(reactor.agent_id.clone());
        self.check_reactor(reactor)?;

        if let Some(decision) = self.reactor_decisions.get(&reactor.agent_id) {
            return Ok(*decision);
        }
        let queued = self.queued_decisions.lock().unwrap().pop_front();
        Ok(queued.unwrap_or(self.default_decision))
    }

    async fn generate_comment(
        &self,
        reactor: &Agent,
        author: &Agent,
        _unit_body: &str,
    ) -> Result<String, GenerationError> {
        self.check_reactor(reactor)?;
        Ok(format!("@{} replying to @{}", reactor.handle, author.handle))
    }
}
