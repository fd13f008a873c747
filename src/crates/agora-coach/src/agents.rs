//! The seven workflow nodes.
//!
//! Five are coaching personas backed by a [`ChatModel`]; `intake` and
//! `incrementRound` are deterministic bookkeeping. Each node reads the
//! session snapshot it is given and returns only the fields it changes.
//!
//! Replies that fail to parse are logged and dropped (the node returns an
//! empty update); replies that parse but carry out-of-range values are
//! passed through so the schema rejects them at the fold.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use agora_graph::{GraphError, NodeExecutor, Result as GraphResult};

use crate::model::{extract_json, ChatModel, ChatRequest};
use crate::prompts;
use crate::session::{fields, DebateSession, Message};

pub const INTAKE: &str = "intake";
pub const FALLACY_DETECTOR: &str = "fallacyDetector";
pub const DEVIL_ADVOCATE: &str = "devilAdvocate";
pub const SOCRATIC_QUESTIONER: &str = "socraticQuestioner";
pub const ARGUMENT_SCORER: &str = "argumentScorer";
pub const INCREMENT_ROUND: &str = "incrementRound";
pub const FINAL_COACH: &str = "finalCoach";

const FALLACY_DETECTOR_TEMPERATURE: f32 = 0.1;
const DEVIL_ADVOCATE_TEMPERATURE: f32 = 0.7;
const SOCRATIC_QUESTIONER_TEMPERATURE: f32 = 0.6;
const ARGUMENT_SCORER_TEMPERATURE: f32 = 0.1;
const FINAL_COACH_TEMPERATURE: f32 = 0.5;

fn session_from(snapshot: Value, node: &str) -> GraphResult<DebateSession> {
    serde_json::from_value(snapshot).map_err(|err| {
        GraphError::task_execution(node, format!("snapshot does not parse as a session: {err}"))
    })
}

async fn complete(
    model: &Arc<dyn ChatModel>,
    node: &str,
    request: ChatRequest,
) -> GraphResult<String> {
    model
        .complete(request)
        .await
        .map_err(|err| GraphError::task_execution(node, err.to_string()))
}

/// Seeds the session: round one, opening position on the record.
pub struct Intake;

#[async_trait]
impl NodeExecutor for Intake {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, INTAKE)?;
        let opener = Message::user(session.initial_position.clone(), session.next_sequence_id());
        Ok(json!({
            (fields::ROUND_NUMBER): 1,
            (fields::DIALOGUE_HISTORY): [opener],
        }))
    }
}

/// Names the logical fallacies in the debater's latest argument.
pub struct FallacyDetector {
    model: Arc<dyn ChatModel>,
}

impl FallacyDetector {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFallacy {
    fallacy_name: String,
    quote: String,
    explanation: String,
    severity: String,
}

#[async_trait]
impl NodeExecutor for FallacyDetector {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, FALLACY_DETECTOR)?;
        let argument = session.latest_user_argument().to_string();
        let request = ChatRequest::new(
            prompts::FALLACY_DETECTOR_SYSTEM,
            prompts::fallacy_detector_prompt(&session.topic, &argument),
            FALLACY_DETECTOR_TEMPERATURE,
        );
        let reply = complete(&self.model, FALLACY_DETECTOR, request).await?;

        let raw: Vec<RawFallacy> = match serde_json::from_str(extract_json(&reply)) {
            Ok(list) => list,
            Err(err) => {
                warn!(node = FALLACY_DETECTOR, %err, "dropping unparseable fallacy reply");
                return Ok(json!({}));
            }
        };

        // Severity strings pass through untouched; the schema decides whether
        // they are in the allowed set when the update is folded.
        let stamped: Vec<Value> = raw
            .into_iter()
            .map(|f| {
                json!({
                    "round": session.round_number,
                    "fallacyName": f.fallacy_name,
                    "quote": f.quote,
                    "explanation": f.explanation,
                    "severity": f.severity,
                })
            })
            .collect();
        let reports = Value::Array(stamped);
        let note = Message::agent(
            format!("[Fallacy Analysis] {reports}"),
            session.next_sequence_id(),
        );
        Ok(json!({
            (fields::FALLACY_REPORTS): reports,
            (fields::DIALOGUE_HISTORY): [note],
        }))
    }
}

/// Argues the other side: one three-angle rebuttal per round.
pub struct DevilAdvocate {
    model: Arc<dyn ChatModel>,
}

impl DevilAdvocate {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl NodeExecutor for DevilAdvocate {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, DEVIL_ADVOCATE)?;
        let request = ChatRequest::new(
            prompts::DEVIL_ADVOCATE_SYSTEM,
            prompts::devil_advocate_prompt(
                &session.topic,
                &session.initial_position,
                session.round_number,
            ),
            DEVIL_ADVOCATE_TEMPERATURE,
        );
        let reply = complete(&self.model, DEVIL_ADVOCATE, request).await?;
        let rebuttal = reply.trim();
        if rebuttal.is_empty() {
            warn!(node = DEVIL_ADVOCATE, "empty rebuttal reply, skipping round");
            return Ok(json!({}));
        }
        Ok(json!({ (fields::COUNTER_ARGUMENTS): [rebuttal] }))
    }
}

/// Asks two fresh probing questions about the latest argument.
pub struct SocraticQuestioner {
    model: Arc<dyn ChatModel>,
}

impl SocraticQuestioner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl NodeExecutor for SocraticQuestioner {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, SOCRATIC_QUESTIONER)?;
        let argument = session.latest_user_argument().to_string();
        let request = ChatRequest::new(
            prompts::SOCRATIC_QUESTIONER_SYSTEM,
            prompts::socratic_questioner_prompt(&argument, &session.socratic_questions),
            SOCRATIC_QUESTIONER_TEMPERATURE,
        );
        let reply = complete(&self.model, SOCRATIC_QUESTIONER, request).await?;

        let questions: Vec<String> = reply
            .lines()
            .map(str::trim)
            .filter(|line| {
                !line.is_empty()
                    && (line.starts_with('-')
                        || line.chars().next().is_some_and(|c| c.is_ascii_digit()))
            })
            .map(str::to_string)
            .collect();
        if questions.is_empty() {
            warn!(node = SOCRATIC_QUESTIONER, "no questions found in reply");
            return Ok(json!({}));
        }
        Ok(json!({ (fields::SOCRATIC_QUESTIONS): questions }))
    }
}

/// Scores the latest argument on the five judging criteria.
pub struct ArgumentScorer {
    model: Arc<dyn ChatModel>,
}

impl ArgumentScorer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[derive(Debug, Deserialize)]
struct RawScore {
    clarity: u8,
    evidence: u8,
    logic: u8,
    originality: u8,
    persuasiveness: u8,
    summary: String,
}

#[async_trait]
impl NodeExecutor for ArgumentScorer {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, ARGUMENT_SCORER)?;
        let argument = session.latest_user_argument().to_string();
        let request = ChatRequest::new(
            prompts::ARGUMENT_SCORER_SYSTEM,
            prompts::argument_scorer_prompt(session.round_number, &argument),
            ARGUMENT_SCORER_TEMPERATURE,
        );
        let reply = complete(&self.model, ARGUMENT_SCORER, request).await?;

        let raw: RawScore = match serde_json::from_str(extract_json(&reply)) {
            Ok(score) => score,
            Err(err) => {
                warn!(node = ARGUMENT_SCORER, %err, "dropping unparseable score reply");
                return Ok(json!({}));
            }
        };

        // The total is always the metric sum, whatever arithmetic the model did.
        let total: u16 = [
            raw.clarity,
            raw.evidence,
            raw.logic,
            raw.originality,
            raw.persuasiveness,
        ]
        .iter()
        .map(|m| u16::from(*m))
        .sum();
        Ok(json!({
            (fields::SCORE_CARDS): [{
                "round": session.round_number,
                "clarity": raw.clarity,
                "evidence": raw.evidence,
                "logic": raw.logic,
                "originality": raw.originality,
                "persuasiveness": raw.persuasiveness,
                "total": total,
                "summary": raw.summary,
            }],
        }))
    }
}

/// Opens the next round with the debater's refined position.
pub struct IncrementRound;

#[async_trait]
impl NodeExecutor for IncrementRound {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, INCREMENT_ROUND)?;
        let next_round = session.round_number + 1;
        let refined = format!(
            "[Round {next_round} - refined position] Building on my earlier argument about {}: {} \
             Furthermore, the evidence suggests this is inevitable.",
            session.topic, session.initial_position
        );
        let message = Message::user(refined, session.next_sequence_id());
        Ok(json!({
            (fields::ROUND_NUMBER): next_round,
            (fields::DIALOGUE_HISTORY): [message],
        }))
    }
}

/// Writes the closing report: verdict, coaching tips, final transcript entry.
pub struct FinalCoach {
    model: Arc<dyn ChatModel>,
}

impl FinalCoach {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl NodeExecutor for FinalCoach {
    async fn execute(&self, snapshot: Value) -> GraphResult<Value> {
        let session = session_from(snapshot, FINAL_COACH)?;
        let request = ChatRequest::new(
            prompts::FINAL_COACH_SYSTEM,
            prompts::final_coach_prompt(&session),
            FINAL_COACH_TEMPERATURE,
        );
        let reply = complete(&self.model, FINAL_COACH, request).await?;

        let text = reply.trim();
        let (verdict, tips) = if text.is_empty() {
            warn!(node = FINAL_COACH, "empty coaching reply, falling back to score summary");
            fallback_report(&session)
        } else {
            (text.to_string(), parse_tips(text))
        };
        let note = Message::agent(format!("[Final Report]\n{verdict}"), session.next_sequence_id());
        Ok(json!({
            (fields::VERDICT): verdict,
            (fields::COACHING_TIPS): tips,
            (fields::DIALOGUE_HISTORY): [note],
        }))
    }
}

/// Tip lines in a coaching report start with a bullet, a dash, `Tip`, or a
/// numbered `n.` prefix. At most five are kept.
fn parse_tips(report: &str) -> Vec<String> {
    report
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with('•')
                || line.starts_with('-')
                || line.starts_with("Tip")
                || (line.as_bytes().first().is_some_and(u8::is_ascii_digit)
                    && line.as_bytes().get(1) == Some(&b'.'))
        })
        .take(5)
        .map(str::to_string)
        .collect()
}

/// Deterministic closing report for when the model has nothing to say. The
/// verdict must never be empty on the terminal step.
fn fallback_report(session: &DebateSession) -> (String, Vec<String>) {
    let average = session.average_score();
    let verdict = format!(
        "Overall Assessment: you completed {} round(s) on \"{}\" with an average score of \
         {average:.1}/50. Review the counter-arguments and questions above before your next session.",
        session.round_number, session.topic
    );
    (verdict, tips_for_score(average))
}

fn tips_for_score(average: f64) -> Vec<String> {
    let tips: [&str; 3] = if average >= 40.0 {
        [
            "1. Practice pre-emptive refutation: answer the strongest objection before it is raised.",
            "2. Add warrant and backing to each claim instead of stacking more claims.",
            "3. Steelman the opposing view, then beat the steelman.",
        ]
    } else if average >= 25.0 {
        [
            "1. Cite one specific study, statistic, or event per round.",
            "2. Restate your core claim in every round so it cannot drift.",
            "3. Structure each argument as point, evidence, explanation, link.",
        ]
    } else {
        [
            "1. Defend one clear claim fully before adding another.",
            "2. Learn the five most common fallacies and spot them in your own drafts.",
            "3. Study how experienced debaters structure an opening argument.",
        ]
    };
    tips.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{scripted_default, ScriptedModel};
    use crate::session::ScoreCard;

    fn seeded_session() -> DebateSession {
        let mut session = DebateSession::new(
            "Remote work is better for society",
            "I believe remote work wins because commuting wastes lives.",
        );
        session.round_number = 1;
        session
            .dialogue_history
            .push(Message::user(session.initial_position.clone(), 1));
        session
    }

    fn snapshot(session: &DebateSession) -> Value {
        serde_json::to_value(session).unwrap()
    }

    fn scripted(reply: &str) -> Arc<dyn ChatModel> {
        let reply = reply.to_string();
        Arc::new(ScriptedModel::new(move |_: &ChatRequest| reply.clone()))
    }

    #[tokio::test]
    async fn intake_opens_round_one_with_the_position_on_record() {
        let session = DebateSession::new("t", "my opening position");
        let update = Intake.execute(snapshot(&session)).await.unwrap();
        assert_eq!(update[fields::ROUND_NUMBER], 1);
        assert_eq!(
            update[fields::DIALOGUE_HISTORY][0]["content"],
            "my opening position"
        );
        assert_eq!(update[fields::DIALOGUE_HISTORY][0]["role"], "user");
        assert_eq!(update[fields::DIALOGUE_HISTORY][0]["sequenceId"], 1);
    }

    #[tokio::test]
    async fn fallacy_detector_stamps_the_round_and_logs_the_analysis() {
        let reply = r#"```json
[{"fallacyName": "Hasty generalization", "quote": "wastes lives", "explanation": "Generalizes from commuting to all of society.", "severity": "low"}]
```"#;
        let node = FallacyDetector::new(scripted(reply));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();

        let report = &update[fields::FALLACY_REPORTS][0];
        assert_eq!(report["round"], 1);
        assert_eq!(report["fallacyName"], "Hasty generalization");
        assert_eq!(report["severity"], "low");

        let note = &update[fields::DIALOGUE_HISTORY][0];
        assert_eq!(note["role"], "agent");
        assert!(note["content"]
            .as_str()
            .unwrap()
            .starts_with("[Fallacy Analysis]"));
        assert_eq!(note["sequenceId"], 2);
    }

    #[tokio::test]
    async fn fallacy_detector_passes_unknown_severities_through() {
        let reply = r#"[{"fallacyName": "X", "quote": "q", "explanation": "e", "severity": "extreme"}]"#;
        let node = FallacyDetector::new(scripted(reply));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        assert_eq!(update[fields::FALLACY_REPORTS][0]["severity"], "extreme");
    }

    #[tokio::test]
    async fn fallacy_detector_degrades_to_an_empty_update() {
        let node = FallacyDetector::new(scripted("I could not find any JSON to give you."));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        assert_eq!(update, json!({}));
    }

    #[tokio::test]
    async fn devil_advocate_stores_the_whole_rebuttal_as_one_entry() {
        let node = DevilAdvocate::new(scripted(
            "**[Empirical]**: a\n**[Philosophical]**: b\n**[Practical]**: c",
        ));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        let entries = update[fields::COUNTER_ARGUMENTS].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].as_str().unwrap().contains("**[Practical]**"));
        assert!(update.get(fields::DIALOGUE_HISTORY).is_none());
    }

    #[tokio::test]
    async fn socratic_questioner_keeps_numbered_and_dashed_lines() {
        let node = SocraticQuestioner::new(scripted(
            "Here you go:\n1. What would change your mind?\n- Who pays the cost?\nGood luck!",
        ));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        let questions = update[fields::SOCRATIC_QUESTIONS].as_array().unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0], "1. What would change your mind?");
        assert_eq!(questions[1], "- Who pays the cost?");
    }

    #[tokio::test]
    async fn scorer_recomputes_the_total_from_the_metrics() {
        let reply = r#"{"clarity": 7, "evidence": 6, "logic": 8, "originality": 5, "persuasiveness": 7, "total": 99, "summary": "solid"}"#;
        let node = ArgumentScorer::new(scripted(reply));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        let card = &update[fields::SCORE_CARDS][0];
        assert_eq!(card["round"], 1);
        assert_eq!(card["total"], 33);
        assert_eq!(card["summary"], "solid");
    }

    #[tokio::test]
    async fn scorer_degrades_when_fields_are_missing() {
        let node = ArgumentScorer::new(scripted(r#"{"clarity": 7}"#));
        let update = node.execute(snapshot(&seeded_session())).await.unwrap();
        assert_eq!(update, json!({}));
    }

    #[tokio::test]
    async fn increment_round_opens_the_next_round_with_a_refined_position() {
        let update = IncrementRound
            .execute(snapshot(&seeded_session()))
            .await
            .unwrap();
        assert_eq!(update[fields::ROUND_NUMBER], 2);
        let content = update[fields::DIALOGUE_HISTORY][0]["content"]
            .as_str()
            .unwrap();
        assert!(content.starts_with("[Round 2 - refined position]"));
        assert!(content.contains("Remote work is better for society"));
        assert_eq!(update[fields::DIALOGUE_HISTORY][0]["role"], "user");
    }

    #[tokio::test]
    async fn final_coach_returns_verdict_tips_and_a_transcript_entry() {
        let mut session = seeded_session();
        session.round_number = 3;
        let node = FinalCoach::new(Arc::new(scripted_default()));
        let update = node.execute(snapshot(&session)).await.unwrap();

        let verdict = update[fields::VERDICT].as_str().unwrap();
        assert!(verdict.contains("Overall Assessment"));
        let tips = update[fields::COACHING_TIPS].as_array().unwrap();
        assert_eq!(tips.len(), 3);
        assert!(tips[0].as_str().unwrap().starts_with("1."));
        assert!(update[fields::DIALOGUE_HISTORY][0]["content"]
            .as_str()
            .unwrap()
            .starts_with("[Final Report]"));
    }

    #[tokio::test]
    async fn final_coach_falls_back_when_the_model_is_silent() {
        let mut session = seeded_session();
        session.score_cards.push(ScoreCard {
            round: 1,
            clarity: 6,
            evidence: 6,
            logic: 6,
            originality: 6,
            persuasiveness: 6,
            total: 30,
            summary: "even".to_string(),
        });
        let node = FinalCoach::new(scripted("   "));
        let update = node.execute(snapshot(&session)).await.unwrap();

        let verdict = update[fields::VERDICT].as_str().unwrap();
        assert!(!verdict.is_empty());
        assert!(verdict.contains("30.0/50"));
        let tips = update[fields::COACHING_TIPS].as_array().unwrap();
        assert_eq!(tips.len(), 3);
        assert!(tips[0].as_str().unwrap().contains("study, statistic, or event"));
    }

    #[tokio::test]
    async fn tips_cap_at_five() {
        let report = "1. a\n2. b\n3. c\n- d\n• e\nTip: f\nplain prose";
        assert_eq!(parse_tips(report).len(), 5);
    }
}
