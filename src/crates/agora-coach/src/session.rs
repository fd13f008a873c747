//! The debate session model and its state schema.
//!
//! A [`DebateSession`] is the aggregate the whole workflow revolves around. It is
//! serialized with camelCase field names, which is also the layout inside checkpoints;
//! [`session_schema`] declares the same fields for the engine, pairing each with its
//! merge policy and, where elements have a required shape, a validator that rejects a
//! malformed update before anything merges.

use agora_graph::{append, append_distinct_by, replace, GraphError, StateSchema, ValidatorFn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// State field names as they appear on the wire and in the schema.
pub mod fields {
    pub const TOPIC: &str = "topic";
    pub const INITIAL_POSITION: &str = "initialPosition";
    pub const ROUND_NUMBER: &str = "roundNumber";
    pub const DIALOGUE_HISTORY: &str = "dialogueHistory";
    pub const FALLACY_REPORTS: &str = "fallacyReports";
    pub const SCORE_CARDS: &str = "scoreCards";
    pub const COUNTER_ARGUMENTS: &str = "counterArguments";
    pub const SOCRATIC_QUESTIONS: &str = "socraticQuestions";
    pub const COACHING_TIPS: &str = "coachingTips";
    pub const VERDICT: &str = "verdict";
}

/// Who said a line of dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// One line of the debate transcript.
///
/// `sequence_id` is allocated from the snapshot a node read, so re-running the same
/// step after a crash regenerates the same id and the dialogue reducer de-duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub sequence_id: u64,
}

impl Message {
    pub fn user(content: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sequence_id,
        }
    }

    pub fn agent(content: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            sequence_id,
        }
    }
}

/// Severity of a detected fallacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// A logical fallacy found in the user's argumentation, stamped with the round it was
/// detected in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallacyReport {
    pub round: u64,
    pub fallacy_name: String,
    pub quote: String,
    pub explanation: String,
    pub severity: Severity,
}

/// Per-round scoring of the user's argumentation, five metrics of 1..=10 each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    pub round: u64,
    pub clarity: u8,
    pub evidence: u8,
    pub logic: u8,
    pub originality: u8,
    pub persuasiveness: u8,
    pub total: u8,
    pub summary: String,
}

impl ScoreCard {
    pub fn metrics(&self) -> [u8; 5] {
        [
            self.clarity,
            self.evidence,
            self.logic,
            self.originality,
            self.persuasiveness,
        ]
    }
}

/// The aggregate root, one per debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSession {
    pub topic: String,
    pub initial_position: String,
    pub round_number: u64,
    #[serde(default)]
    pub dialogue_history: Vec<Message>,
    #[serde(default)]
    pub fallacy_reports: Vec<FallacyReport>,
    #[serde(default)]
    pub score_cards: Vec<ScoreCard>,
    #[serde(default)]
    pub counter_arguments: Vec<String>,
    #[serde(default)]
    pub socratic_questions: Vec<String>,
    #[serde(default)]
    pub coaching_tips: Vec<String>,
    #[serde(default)]
    pub verdict: String,
}

impl DebateSession {
    /// Fresh session: all sequences empty, round 0, no verdict.
    pub fn new(topic: impl Into<String>, initial_position: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            initial_position: initial_position.into(),
            round_number: 0,
            dialogue_history: Vec::new(),
            fallacy_reports: Vec::new(),
            score_cards: Vec::new(),
            counter_arguments: Vec::new(),
            socratic_questions: Vec::new(),
            coaching_tips: Vec::new(),
            verdict: String::new(),
        }
    }

    /// The verdict is written exactly once, by the terminal node.
    pub fn is_finished(&self) -> bool {
        !self.verdict.is_empty()
    }

    /// Next dialogue sequence id, derived from the snapshot rather than a counter so
    /// a re-run of the same step allocates the same id.
    pub fn next_sequence_id(&self) -> u64 {
        self.dialogue_history
            .iter()
            .map(|m| m.sequence_id)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Mean of the per-round score totals, zero when nothing has been scored.
    pub fn average_score(&self) -> f64 {
        if self.score_cards.is_empty() {
            return 0.0;
        }
        self.score_cards.iter().map(|c| f64::from(c.total)).sum::<f64>()
            / self.score_cards.len() as f64
    }

    /// The debater's most recent argument: the last user message, or the
    /// opening position when nothing has been said yet.
    pub fn latest_user_argument(&self) -> &str {
        self.dialogue_history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map_or(self.initial_position.as_str(), |m| m.content.as_str())
    }

    /// Transcript lines for prompt building, oldest first.
    pub fn transcript(&self) -> String {
        self.dialogue_history
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The engine-facing schema: every session field with its reducer, validators on the
/// fields whose elements have a required shape.
pub fn session_schema() -> StateSchema {
    StateSchema::new()
        .field(fields::TOPIC, replace())
        .field(fields::INITIAL_POSITION, replace())
        .field(fields::ROUND_NUMBER, replace())
        .validated_field(
            fields::DIALOGUE_HISTORY,
            append_distinct_by("sequenceId"),
            typed_validator::<Message>(),
        )
        .validated_field(fields::FALLACY_REPORTS, append(), typed_validator::<FallacyReport>())
        .validated_field(fields::SCORE_CARDS, append(), score_card_validator())
        .field(fields::COUNTER_ARGUMENTS, append())
        .field(fields::SOCRATIC_QUESTIONS, append())
        .field(fields::COACHING_TIPS, append())
        .field(fields::VERDICT, replace())
}

fn update_elements(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// Each incoming element must deserialize into `T`; deserialization failures (wrong
/// keys, a severity outside the allowed set) become `MalformedUpdate`.
fn typed_validator<T: serde::de::DeserializeOwned>() -> ValidatorFn {
    Arc::new(|field, value| {
        for element in update_elements(value) {
            serde_json::from_value::<T>(element.clone())
                .map_err(|err| GraphError::malformed_update(field, err.to_string()))?;
        }
        Ok(())
    })
}

fn score_card_validator() -> ValidatorFn {
    Arc::new(|field, value| {
        for element in update_elements(value) {
            let card: ScoreCard = serde_json::from_value(element.clone())
                .map_err(|err| GraphError::malformed_update(field, err.to_string()))?;
            for metric in card.metrics() {
                if !(1..=10).contains(&metric) {
                    return Err(GraphError::malformed_update(
                        field,
                        format!("metric {} is outside 1..=10", metric),
                    ));
                }
            }
            if card.total > 50 {
                return Err(GraphError::malformed_update(
                    field,
                    format!("total {} exceeds 50", card.total),
                ));
            }
        }
        Ok(())
    })
}
