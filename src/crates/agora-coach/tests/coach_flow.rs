//! End-to-end coaching sessions against scripted models.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use agora_checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, StepCursor,
};
use agora_coach::agents::{ARGUMENT_SCORER, FALLACY_DETECTOR};
use agora_coach::model::{scripted_default, ChatModel, ChatRequest, ScriptedModel};
use agora_coach::workflow::ANALYSIS_GROUP;
use agora_coach::{prompts, CoachError, DebateCoach, DebateSession};
use agora_graph::{EngineEvent, EventSink, GraphError};

const TOPIC: &str = "Artificial general intelligence will benefit humanity";
const POSITION: &str = "I believe AGI will bring enormous benefits because it will solve problems humans cannot.";

fn coach(store: Arc<dyn CheckpointStore>) -> DebateCoach {
    DebateCoach::new(Arc::new(scripted_default()), store)
}

#[tokio::test]
async fn one_round_session_runs_straight_to_the_report() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let outcome = coach(store)
        .start_session(TOPIC, POSITION, "s-one", Some(1))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    // intake, fallacy detector, analysis barrier, final coach.
    assert_eq!(outcome.steps, 4);

    let session = &outcome.session;
    assert!(session.is_finished());
    assert_eq!(session.round_number, 1);
    assert_eq!(session.counter_arguments.len(), 1);
    assert_eq!(session.socratic_questions.len(), 2);
    assert_eq!(session.score_cards.len(), 1);
    assert_eq!(session.score_cards[0].round, 1);
    assert!(session.fallacy_reports.is_empty());
    assert!(session.verdict.contains("Overall Assessment"));
    assert_eq!(session.coaching_tips.len(), 3);

    // Opening position, one fallacy analysis, the final report.
    let ids: Vec<u64> = session
        .dialogue_history
        .iter()
        .map(|m| m.sequence_id)
        .collect();
    assert_eq!(ids, [1, 2, 3]);
    assert_eq!(session.dialogue_history[0].content, POSITION);
}

#[tokio::test]
async fn three_rounds_accumulate_distinct_output_per_round() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let outcome = coach(store)
        .start_session(TOPIC, POSITION, "s-three", None)
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.steps, 10);

    let session = &outcome.session;
    assert_eq!(session.round_number, 3);

    assert_eq!(session.counter_arguments.len(), 3);
    for (index, rebuttal) in session.counter_arguments.iter().enumerate() {
        assert!(rebuttal.starts_with(&format!("Round {} rebuttal.", index + 1)));
    }

    let questions = &session.socratic_questions;
    assert_eq!(questions.len(), 6);
    let distinct: std::collections::HashSet<&String> = questions.iter().collect();
    assert_eq!(distinct.len(), 6);

    let rounds: Vec<u64> = session.score_cards.iter().map(|c| c.round).collect();
    assert_eq!(rounds, [1, 2, 3]);
    for card in &session.score_cards {
        assert_eq!(card.total, card.metrics().iter().copied().sum::<u8>());
    }
    assert!(session.score_cards[0].total < session.score_cards[2].total);

    // The canned detector flags the refined positions of rounds two and three.
    let fallacy_rounds: Vec<u64> = session.fallacy_reports.iter().map(|f| f.round).collect();
    assert_eq!(fallacy_rounds, [2, 3]);

    let ids: Vec<u64> = session
        .dialogue_history
        .iter()
        .map(|m| m.sequence_id)
        .collect();
    assert_eq!(ids, [1, 2, 3, 4, 5, 6, 7]);
    assert!(session.dialogue_history[2]
        .content
        .starts_with("[Round 2 - refined position]"));
}

#[tokio::test]
async fn out_of_range_severity_aborts_before_the_checkpoint() {
    let model = ScriptedModel::new(|_: &ChatRequest| {
        r#"[{"fallacyName": "X", "quote": "q", "explanation": "e", "severity": "extreme"}]"#
            .to_string()
    });
    let store = Arc::new(MemoryCheckpointStore::new());
    let coach = DebateCoach::new(Arc::new(model), store.clone());

    let err = coach
        .start_session(TOPIC, POSITION, "s-bad", Some(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoachError::Graph(GraphError::MalformedUpdate { ref field, .. }) if field == "fallacyReports"
    ));

    // The failed step never committed: the checkpoint still points at the
    // detector, with only the intake output in the state.
    let checkpoint = store.load("s-bad").await.unwrap().unwrap();
    assert_eq!(checkpoint.cursor, StepCursor::node(FALLACY_DETECTOR));
    assert_eq!(checkpoint.metadata.step, 1);
    let session: DebateSession = serde_json::from_value(checkpoint.state).unwrap();
    assert!(session.fallacy_reports.is_empty());
    assert_eq!(session.round_number, 1);
    assert_eq!(session.dialogue_history.len(), 1);
}

/// Healthy everywhere except one persona, which errors like a dead provider.
struct OutageModel {
    healthy: ScriptedModel,
    broken_system: &'static str,
}

#[async_trait]
impl ChatModel for OutageModel {
    async fn complete(&self, request: ChatRequest) -> agora_coach::Result<String> {
        if request.system == self.broken_system {
            return Err(CoachError::model("provider outage"));
        }
        self.healthy.complete(request).await
    }
}

#[tokio::test]
async fn failed_analyst_discards_the_whole_panel_and_resume_recovers() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let flaky = OutageModel {
        healthy: scripted_default(),
        broken_system: prompts::ARGUMENT_SCORER_SYSTEM,
    };
    let flaky_coach = DebateCoach::new(Arc::new(flaky), store.clone());

    let err = flaky_coach
        .start_session(TOPIC, POSITION, "s-outage", Some(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoachError::Graph(GraphError::TaskExecution { ref node, .. }) if node == ARGUMENT_SCORER
    ));

    // Siblings completed but their updates were thrown away with the group.
    let checkpoint = store.load("s-outage").await.unwrap().unwrap();
    assert_eq!(checkpoint.cursor, StepCursor::group(ANALYSIS_GROUP));
    assert_eq!(checkpoint.metadata.step, 2);
    let session: DebateSession = serde_json::from_value(checkpoint.state).unwrap();
    assert!(session.counter_arguments.is_empty());
    assert!(session.socratic_questions.is_empty());
    assert!(session.score_cards.is_empty());

    // Once the provider is back, resume replays the panel and finishes.
    let recovered = coach(store).resume_session("s-outage").await;
    let outcome = recovered.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.steps, 4);
    assert_eq!(outcome.session.counter_arguments.len(), 1);
    assert_eq!(outcome.session.socratic_questions.len(), 2);
    assert_eq!(outcome.session.score_cards.len(), 1);
    assert!(outcome.session.is_finished());
}

/// Cancels its token once `after` checkpoints have been written.
struct CancelAfter {
    token: CancellationToken,
    remaining: AtomicU64,
}

impl EventSink for CancelAfter {
    fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::CheckpointSaved { .. })
            && self.remaining.fetch_sub(1, Ordering::SeqCst) == 1
        {
            self.token.cancel();
        }
    }
}

#[tokio::test]
async fn interrupted_session_resumes_to_the_uninterrupted_result() {
    let dir = tempfile::tempdir().unwrap();

    // Reference run, no interruptions.
    let full_store = Arc::new(MemoryCheckpointStore::new());
    let full = coach(full_store)
        .start_session(TOPIC, POSITION, "s-ref", Some(3))
        .await
        .unwrap();

    // Interrupted run against the filesystem store.
    let store = Arc::new(FileCheckpointStore::new(dir.path()).unwrap());
    let cancel = CancellationToken::new();
    let sink = Arc::new(CancelAfter {
        token: cancel.clone(),
        remaining: AtomicU64::new(4),
    });
    let interrupted = DebateCoach::new(Arc::new(scripted_default()), store.clone())
        .with_event_sink(sink)
        .start_session_with_cancellation(TOPIC, POSITION, "s-ref", Some(3), cancel)
        .await
        .unwrap();
    assert!(!interrupted.is_completed());
    assert_eq!(interrupted.steps, 4);

    // A fresh process picks the session up from disk.
    let resumed = coach(Arc::new(FileCheckpointStore::new(dir.path()).unwrap()))
        .resume_session("s-ref")
        .await
        .unwrap();
    assert!(resumed.is_completed());
    assert_eq!(resumed.steps, full.steps);
    assert_eq!(resumed.session, full.session);
}

#[tokio::test]
async fn finished_sessions_resume_unchanged() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let first = coach(store.clone())
        .start_session(TOPIC, POSITION, "s-done", Some(1))
        .await
        .unwrap();

    let again = coach(store).resume_session("s-done").await.unwrap();
    assert!(again.is_completed());
    assert_eq!(again.steps, first.steps);
    assert_eq!(again.session, first.session);
    assert_eq!(again.session.dialogue_history.len(), 3);
}

#[tokio::test]
async fn stored_sessions_are_listed_and_inspectable() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let coach = coach(store);
    coach
        .start_session(TOPIC, POSITION, "s-b", Some(1))
        .await
        .unwrap();
    coach
        .start_session("Another topic", "Another position.", "s-a", Some(1))
        .await
        .unwrap();

    assert_eq!(coach.list_sessions().await.unwrap(), ["s-a", "s-b"]);

    let snapshot = coach.inspect("s-b").await.unwrap();
    assert_eq!(snapshot.session_id, "s-b");
    assert!(snapshot.cursor.is_done());
    assert!(snapshot.session.is_finished());
}
