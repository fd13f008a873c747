//! Prompt text for the five coaching agents.
//!
//! System prompts fix each agent's persona and output contract; the
//! builder functions below assemble the per-round user prompt from the
//! current session. Agents that expect structured output spell out the
//! exact JSON shape here so the parsers in [`crate::agents`] stay dumb.

use crate::session::DebateSession;

/// Fallacy detector persona. Must answer with a JSON array only.
pub const FALLACY_DETECTOR_SYSTEM: &str = "\
You are an expert in logic and rhetoric. Examine the debater's argument \
and identify every logical fallacy it contains.

Respond with a JSON array only, no prose. Each element must have exactly \
these fields:
  {\"fallacyName\": \"...\", \"quote\": \"...\", \"explanation\": \"...\", \"severity\": \"high|medium|low\"}

\"quote\" is the exact span of the argument that commits the fallacy. \
\"severity\" reflects how much the fallacy undermines the argument. If \
the argument is clean, respond with [].";

/// Devil's advocate persona. Plain text, three counter-arguments.
pub const DEVIL_ADVOCATE_SYSTEM: &str = "\
You are a rigorous devil's advocate. Whatever position the debater \
takes, you argue the opposite with the strongest available case.

Produce exactly 3 counter-arguments, one from each angle:
  **[Empirical]**: grounded in data, studies, or historical record.
  **[Philosophical]**: grounded in principle, values, or definitions.
  **[Practical]**: grounded in feasibility, incentives, or second-order effects.

Keep each counter-argument to a short paragraph. Be forceful but fair: \
attack the argument, never the debater.";

/// Socratic questioner persona. Exactly two numbered questions.
pub const SOCRATIC_QUESTIONER_SYSTEM: &str = "\
You are a Socratic tutor. You never state opinions and never argue. You \
ask exactly 2 probing questions that expose hidden assumptions or \
unexamined consequences in the debater's latest argument.

Number them \"1.\" and \"2.\", one per line, nothing else. Never repeat a \
question you have already asked in this session.";

/// Argument scorer persona. Must answer with a JSON object only.
pub const ARGUMENT_SCORER_SYSTEM: &str = "\
You are an impartial debate judge. Score the argument on five criteria, \
each an integer from 1 to 10:
  clarity, evidence, logic, originality, persuasiveness

Respond with a JSON object only, no prose:
  {\"clarity\": n, \"evidence\": n, \"logic\": n, \"originality\": n, \"persuasiveness\": n, \"total\": n, \"summary\": \"one sentence\"}

\"total\" must be the sum of the five criteria.";

/// Final coach persona. Free text report.
pub const FINAL_COACH_SYSTEM: &str = "\
You are a warm, encouraging debate coach delivering a final report after \
a multi-round practice session. Structure your report as:

Overall Assessment: how the debater performed across the session.
Strongest Moments: what genuinely worked, with specifics.
Growth Areas: the weaknesses that cost the most points.
Improvement Tips: exactly 3 numbered, concrete practice suggestions.

Close with one sentence of encouragement. Speak directly to the debater.";

pub fn fallacy_detector_prompt(topic: &str, argument: &str) -> String {
    format!(
        "Topic: {topic}\n\nDebater's argument:\n\"{argument}\"\n\n\
         Identify every logical fallacy in this argument. Respond with the JSON array only."
    )
}

pub fn devil_advocate_prompt(topic: &str, position: &str, round: u64) -> String {
    format!(
        "Topic: {topic}\nDebater's position: {position}\n\n\
         Round {round}. Provide your 3 strongest counter-arguments now."
    )
}

pub fn socratic_questioner_prompt(argument: &str, previous: &[String]) -> String {
    let asked = if previous.is_empty() {
        "None yet.".to_string()
    } else {
        previous.join("\n")
    };
    format!(
        "Previous questions already asked (do not repeat):\n{asked}\n\n\
         Debater's latest argument:\n\"{argument}\"\n\nAsk your two questions."
    )
}

pub fn argument_scorer_prompt(round: u64, argument: &str) -> String {
    format!(
        "Round {round} argument:\n\"{argument}\"\n\n\
         Score it now. Respond with the JSON object only."
    )
}

/// Assembles the end-of-session digest the final coach works from.
pub fn final_coach_prompt(session: &DebateSession) -> String {
    let fallacies = serde_json::to_string(&session.fallacy_reports)
        .unwrap_or_else(|_| "[]".to_string());
    let scores = serde_json::to_string(&session.score_cards)
        .unwrap_or_else(|_| "[]".to_string());
    let counters = if session.counter_arguments.is_empty() {
        "(none)".to_string()
    } else {
        session.counter_arguments.join("\n---\n")
    };
    let questions = if session.socratic_questions.is_empty() {
        "(none)".to_string()
    } else {
        session.socratic_questions.join("\n")
    };
    format!(
        "Topic: {topic}\nRounds completed: {rounds}\n\n\
         Fallacies detected:\n{fallacies}\n\n\
         Score cards:\n{scores}\n\n\
         Counter-arguments the debater faced:\n{counters}\n\n\
         Socratic questions asked:\n{questions}\n\n\
         Deliver your final coaching report.",
        topic = session.topic,
        rounds = session.round_number,
    )
}
