//! Reaction fan-out: other agents engaging with a freshly generated unit.
//!
//! A fixed-size sample of active agents (never the author) is drawn once, up
//! front, from the population as it was before any reply was written. Each
//! reactor then asks the generator for a decision and applies it. Reactors run
//! one after another; a failing reactor is logged and the rest continue.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use agora_generator::{EngagementDecision, Generator};
use agora_storage::Store;
use agora_types::{Agent, ContentUnit, EngagementRecord, NewUnit, UnitCounter};

use crate::error::UnitError;

/// Tally of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionReport {
    pub sampled: usize,
    pub likes: usize,
    pub comments: usize,
    pub ignored: usize,
    pub failures: usize,
}

/// Applies sampled agents' reactions to a unit.
#[derive(Clone)]
pub struct ReactionEngine {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    sample_size: usize,
}

impl ReactionEngine {
    pub fn new(store: Arc<dyn Store>, generator: Arc<dyn Generator>, sample_size: usize) -> Self {
        Self {
            store,
            generator,
            sample_size,
        }
    }

    /// Run every sampled reactor against `unit` to completion.
    pub async fn react(&self, unit: &ContentUnit, author: &Agent) -> ReactionReport {
        let population = match self.store.list_active_agents().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(
                    unit_id = %unit.unit_id,
                    error = %e,
                    "Failed to list reactors, skipping reactions"
                );
                return ReactionReport::default();
            }
        };

        let reactors = {
            let mut rng = rand::thread_rng();
            sample_reactors(&population, &author.agent_id, self.sample_size, &mut rng)
        };

        let mut report = ReactionReport {
            sampled: reactors.len(),
            ..Default::default()
        };

        for reactor in &reactors {
            match self.react_one(unit, author, reactor).await {
                Ok(EngagementDecision::Like) => report.likes += 1,
                Ok(EngagementDecision::Comment) => report.comments += 1,
                Ok(EngagementDecision::None) => report.ignored += 1,
                Err(e) => {
                    warn!(
                        unit_id = %unit.unit_id,
                        reactor = %reactor.handle,
                        error = %e,
                        "Reactor failed"
                    );
                    report.failures += 1;
                }
            }
        }

        debug!(
            unit_id = %unit.unit_id,
            sampled = report.sampled,
            likes = report.likes,
            comments = report.comments,
            failures = report.failures,
            "Reactions complete"
        );
        report
    }

    async fn react_one(
        &self,
        unit: &ContentUnit,
        author: &Agent,
        reactor: &Agent,
    ) -> Result<EngagementDecision, UnitError> {
        let decision = self
            .generator
            .decide_engagement(reactor, &unit.body, &author.handle)
            .await?;

        match decision {
            EngagementDecision::None => {}
            EngagementDecision::Like => {
                self.store
                    .insert_engagement(&EngagementRecord::like(&reactor.agent_id, &unit.unit_id))
                    .await?;
                self.store
                    .increment_unit_counter(&unit.unit_id, UnitCounter::AgentLikes, 1)
                    .await?;
            }
            EngagementDecision::Comment => {
                let text = self
                    .generator
                    .generate_comment(reactor, author, &unit.body)
                    .await?;
                let reply = self
                    .store
                    .insert_unit(NewUnit::reply(&reactor.agent_id, &unit.unit_id, text))
                    .await?;
                if let Err(e) = self.store.increment_agent_units(&reactor.agent_id, 1).await {
                    warn!(
                        reactor = %reactor.handle,
                        error = %e,
                        "Failed to bump reactor unit count"
                    );
                }
                self.store
                    .increment_unit_counter(&unit.unit_id, UnitCounter::Replies, 1)
                    .await?;
                self.store
                    .insert_engagement(&EngagementRecord::comment(
                        &reactor.agent_id,
                        &unit.unit_id,
                        &reply.unit_id,
                    ))
                    .await?;
            }
        }
        Ok(decision)
    }
}

/// Uniform sample of up to `n` agents from `population`, excluding the author.
pub fn sample_reactors<R: Rng + ?Sized>(
    population: &[Agent],
    author_id: &str,
    n: usize,
    rng: &mut R,
) -> Vec<Agent> {
    let candidates: Vec<&Agent> = population
        .iter()
        .filter(|a| a.is_active && a.agent_id != author_id)
        .collect();
    candidates
        .choose_multiple(rng, n)
        .map(|a| (*a).clone())
        .collect()
}
