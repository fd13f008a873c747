//! Chat model abstraction and providers.
//!
//! Agents talk to a [`ChatModel`]: one system prompt, one user prompt,
//! a temperature, a plain-text reply. Two providers are included:
//!
//! - [`HttpChatModel`] for OpenAI-compatible `/chat/completions` endpoints.
//! - [`ScriptedModel`] for deterministic offline runs and tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_coach::model::{ChatModel, ChatRequest, ScriptedModel};
//!
//! let model = ScriptedModel::new(|req: &ChatRequest| format!("echo: {}", req.user));
//! let reply = model.complete(ChatRequest::new("system", "user", 0.2)).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{CoachError, Result};
use crate::prompts;

/// A single completion call: persona, task, sampling temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, temperature: f32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature,
        }
    }
}

/// Provider interface the agents program against.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Runs one completion and returns the reply text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

impl fmt::Debug for dyn ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn ChatModel")
    }
}

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct HttpChatModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl HttpChatModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CoachError::config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: request.system,
                },
                WireMessage {
                    role: "user",
                    content: request.user,
                },
            ],
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|err| CoachError::model(format!("chat request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => CoachError::model(format!("authentication rejected: {detail}")),
                429 => CoachError::model(format!("rate limited: {detail}")),
                _ => CoachError::model(format!("chat API error {status}: {detail}")),
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| CoachError::model(format!("invalid completion payload: {err}")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoachError::model("completion contained no choices"))?;
        Ok(choice.message.content.unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    content: Option<String>,
}

/// Deterministic provider: a closure maps each request to its reply.
#[derive(Clone)]
pub struct ScriptedModel {
    script: Arc<dyn Fn(&ChatRequest) -> String + Send + Sync>,
}

impl ScriptedModel {
    pub fn new(script: impl Fn(&ChatRequest) -> String + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        Ok((self.script)(&request))
    }
}

/// Canned replies for every coaching persona, varying by round. Lets the CLI
/// run a full session offline and gives tests a model that always cooperates.
pub fn scripted_default() -> ScriptedModel {
    ScriptedModel::new(|request: &ChatRequest| {
        let round = extract_round(&request.user).unwrap_or(1);
        match request.system.as_str() {
            s if s == prompts::FALLACY_DETECTOR_SYSTEM => {
                if round <= 1 {
                    "[]".to_string()
                } else {
                    r#"[{"fallacyName": "Appeal to inevitability", "quote": "the evidence suggests this is inevitable", "explanation": "Asserts the conclusion as unavoidable instead of arguing for it.", "severity": "medium"}]"#.to_string()
                }
            }
            s if s == prompts::DEVIL_ADVOCATE_SYSTEM => format!(
                "Round {round} rebuttal.\n\
                 **[Empirical]**: Comparable predictions have repeatedly missed their mark; the track record cuts against you.\n\
                 **[Philosophical]**: Your position assumes the outcome is desirable for everyone, which begs the question of whose values count.\n\
                 **[Practical]**: Even granting the goal, the incentives of the actors involved push in the opposite direction."
            ),
            s if s == prompts::SOCRATIC_QUESTIONER_SYSTEM => {
                match (round - 1) % 3 {
                    0 => "1. What evidence would persuade you that you are wrong?\n2. Whose interests does your position serve?",
                    1 => "1. Which assumption in your argument is doing the most work?\n2. What would your strongest opponent concede, and what would they never concede?",
                    _ => "1. How would you measure the outcome you predict?\n2. If the timeline doubled, would your conclusion survive?",
                }
                .to_string()
            }
            s if s == prompts::ARGUMENT_SCORER_SYSTEM => {
                let bump = round.min(3) as u8;
                let (clarity, evidence, logic, originality, persuasiveness) =
                    (5 + bump, 3 + bump, 6, 4, 4 + bump);
                let total = clarity + evidence + logic + originality + persuasiveness;
                format!(
                    r#"{{"clarity": {clarity}, "evidence": {evidence}, "logic": {logic}, "originality": {originality}, "persuasiveness": {persuasiveness}, "total": {total}, "summary": "Round {round}: structure held, evidence still thin."}}"#
                )
            }
            s if s == prompts::FINAL_COACH_SYSTEM => "\
                Overall Assessment: You held a consistent line and sharpened it under pressure.\n\
                Strongest Moments: Your refined positions engaged the counter-arguments instead of restating the opening.\n\
                Growth Areas: Inevitability claims crept in where evidence should have been.\n\
                Improvement Tips:\n\
                1. Lead each round with your single strongest piece of evidence.\n\
                2. Answer the practical objection before the philosophical one.\n\
                3. Replace claims of inevitability with measurable predictions.\n\
                Keep going: every round of this session was stronger than the last."
                .to_string(),
            _ => String::new(),
        }
    })
}

/// Strips a markdown code fence from a model reply, if present. Models often
/// wrap JSON in ```json fences despite being told not to.
pub fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        return rest.trim();
    }
    trimmed
}

/// Finds the first `Round <n>` marker in a prompt or argument.
pub fn extract_round(text: &str) -> Option<u64> {
    let start = text.find("Round ")? + "Round ".len();
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
