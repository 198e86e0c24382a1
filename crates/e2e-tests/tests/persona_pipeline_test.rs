//! Persona batch E2E tests against a RocksDB store.
//!
//! Covers the full trigger -> generate -> persist -> react -> stream path.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use agora_generator::{EngagementDecision, ScriptedGenerator};
use agora_pipeline::{PersonaBatchRequest, PipelineError, Trigger, TriggerOutcome};
use agora_storage::Store;
use agora_types::{EngagementKind, ProgressStep, RunEvent, UnitCounter};
use e2e_tests::{error_messages, TestHarness};

async fn run_manual(
    harness: &TestHarness,
    generator: Arc<ScriptedGenerator>,
    agent_id: &str,
    count: usize,
) -> (Vec<RunEvent>, Result<agora_types::BatchSummary, PipelineError>) {
    let pipeline = harness.pipeline(generator);
    match pipeline
        .persona_batch(Trigger::manual(), PersonaBatchRequest::new(agent_id, count))
        .await
        .unwrap()
    {
        TriggerOutcome::Completed(run) => run.collect().await,
        TriggerOutcome::Throttled => panic!("manual runs are never throttled"),
    }
}

/// One post, nobody reacts: one unit, no engagements, done with generated 1.
#[tokio::test]
async fn test_single_post_without_reactions() {
    let harness = TestHarness::new();
    harness.seed_personas(4);
    let generator = Arc::new(ScriptedGenerator::new());

    let (events, result) = run_manual(&harness, generator, "p0", 1).await;

    let summary = result.unwrap();
    assert_eq!(summary.generated, 1);
    assert!(matches!(events.last(), Some(RunEvent::Done(done)) if done.generated == 1));

    let stats = harness.store.stats().await.unwrap();
    assert_eq!(stats.units, 1);
    assert_eq!(stats.engagements, 0);

    let author = harness.store.get_agent("p0").await.unwrap().unwrap();
    assert_eq!(author.unit_count, 1);
}

/// Every third generation fails: 3 of 5 posts land and two errors stream in order.
#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let harness = TestHarness::new();
    harness.seed_personas(2);
    let generator = Arc::new(ScriptedGenerator::new().failing_every(3));

    let (events, result) = run_manual(&harness, generator, "p0", 5).await;

    assert_eq!(result.unwrap().generated, 3);
    let errors = error_messages(&events);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("Post 3/5 failed"));
    assert!(errors[1].starts_with("Post 5/5 failed"));
    assert_eq!(harness.store.stats().await.unwrap().units, 3);
    assert!(events.last().unwrap().is_terminal());
}

/// Everyone comments: one reply per reactor, parented to the post, never by the author.
#[tokio::test]
async fn test_comments_create_replies() {
    let harness = TestHarness::new();
    harness.seed_personas(4);
    let generator =
        Arc::new(ScriptedGenerator::new().default_decision(EngagementDecision::Comment));

    let (_, result) = run_manual(&harness, generator, "p0", 1).await;
    let post_id = result.unwrap().posts[0].post_id.clone();

    let replies = harness.store.replies_to(&post_id).await.unwrap();
    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|r| r.agent_id != "p0"));

    let post = harness.store.get_unit(&post_id).await.unwrap().unwrap();
    assert_eq!(post.counter(UnitCounter::Replies), 3);

    let engagements = harness.store.list_engagements().await.unwrap();
    assert_eq!(engagements.len(), 3);
    assert!(engagements
        .iter()
        .all(|e| e.kind == EngagementKind::Comment && e.agent_id != "p0"));
}

/// Likes bump the counter and create no units.
#[tokio::test]
async fn test_likes_do_not_create_units() {
    let harness = TestHarness::new();
    harness.seed_personas(3);
    let generator = Arc::new(ScriptedGenerator::new().default_decision(EngagementDecision::Like));

    let (_, result) = run_manual(&harness, generator, "p1", 1).await;
    let post_id = result.unwrap().posts[0].post_id.clone();

    let post = harness.store.get_unit(&post_id).await.unwrap().unwrap();
    assert_eq!(post.counter(UnitCounter::AgentLikes), 2);
    assert_eq!(harness.store.stats().await.unwrap().units, 1);
}

/// A failing reactor is skipped and the others still react.
#[tokio::test]
async fn test_reactor_failure_is_isolated() {
    let harness = TestHarness::new();
    harness.seed_personas(3);
    let generator = Arc::new(
        ScriptedGenerator::new()
            .default_decision(EngagementDecision::Like)
            .failing_reactor("p1"),
    );

    let (events, result) = run_manual(&harness, generator, "p0", 1).await;
    let post_id = result.unwrap().posts[0].post_id.clone();

    let post = harness.store.get_unit(&post_id).await.unwrap().unwrap();
    assert_eq!(post.counter(UnitCounter::AgentLikes), 1);
    assert!(error_messages(&events).is_empty());
}

/// Missing credential refuses the run with a single terminal error.
#[tokio::test]
async fn test_missing_credential_is_fatal() {
    let harness = TestHarness::new();
    harness.seed_personas(2);
    let generator = Arc::new(ScriptedGenerator::new().without_credential());

    let (events, result) = run_manual(&harness, generator.clone(), "p0", 3).await;

    assert!(matches!(result, Err(PipelineError::MissingCredential)));
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RunEvent::Error { .. }));
    assert_eq!(generator.unit_calls(), 0);
    assert_eq!(harness.store.stats().await.unwrap().units, 0);
}

/// Unknown agent refuses the run.
#[tokio::test]
async fn test_unknown_agent_is_fatal() {
    let harness = TestHarness::new();
    let (events, result) =
        run_manual(&harness, Arc::new(ScriptedGenerator::new()), "ghost", 1).await;

    assert!(matches!(result, Err(PipelineError::AgentNotFound(id)) if id == "ghost"));
    assert_eq!(events.len(), 1);
}

/// Progress events follow cycle order and the terminal event is last.
#[tokio::test]
async fn test_event_order() {
    let harness = TestHarness::new();
    harness.seed_personas(2);

    let (events, _) = run_manual(&harness, Arc::new(ScriptedGenerator::new()), "p0", 2).await;

    let steps: Vec<ProgressStep> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            ProgressStep::Generating,
            ProgressStep::Ready,
            ProgressStep::Reacting,
            ProgressStep::Generating,
            ProgressStep::Ready,
            ProgressStep::Reacting,
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());
}

/// Concurrent runs for one agent never lose counter increments.
#[tokio::test]
async fn test_concurrent_runs_merge_counters() {
    let harness = TestHarness::new();
    harness.seed_personas(3);
    let pipeline = harness.pipeline(Arc::new(ScriptedGenerator::new()));

    let mut runs = Vec::new();
    for _ in 0..4 {
        match pipeline
            .persona_batch(Trigger::manual(), PersonaBatchRequest::new("p2", 3))
            .await
            .unwrap()
        {
            TriggerOutcome::Completed(run) => runs.push(tokio::spawn(run.collect())),
            TriggerOutcome::Throttled => panic!("manual runs are never throttled"),
        }
    }
    for run in runs {
        let (_, result) = run.await.unwrap();
        assert_eq!(result.unwrap().generated, 3);
    }

    let author = harness.store.get_agent("p2").await.unwrap().unwrap();
    assert_eq!(author.unit_count, 12);
    assert_eq!(harness.store.stats().await.unwrap().units, 12);
}
