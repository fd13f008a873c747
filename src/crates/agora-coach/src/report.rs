//! Plain-text rendering of a session for the terminal.

use std::fmt::Write;

use crate::session::DebateSession;

const RULE: &str = "============================================================";
const COL: usize = 12;

/// Renders the whole session: summary, score progression, fallacies,
/// counter-arguments, questions, and the closing report when there is one.
pub fn render(session: &DebateSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "  DEBATE COACHING REPORT");
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Topic: {}", session.topic);
    let _ = writeln!(out, "Rounds completed: {}", session.round_number);
    let _ = writeln!(out, "Average score: {:.1}/50", session.average_score());
    let _ = writeln!(out, "Fallacies caught: {}", session.fallacy_reports.len());
    let _ = writeln!(
        out,
        "Questions asked: {}",
        session.socratic_questions.len()
    );

    render_scores(&mut out, session);
    render_fallacies(&mut out, session);
    render_rebuttals(&mut out, session);
    render_questions(&mut out, session);
    render_verdict(&mut out, session);
    out
}

fn render_scores(out: &mut String, session: &DebateSession) {
    let _ = writeln!(out, "\nSCORE PROGRESSION");
    if session.score_cards.is_empty() {
        let _ = writeln!(out, "  No scores recorded.");
        return;
    }
    let headers = [
        "Round",
        "Clarity",
        "Evidence",
        "Logic",
        "Originality",
        "Persuasion",
        "Total",
    ];
    for header in headers {
        let _ = write!(out, "{header:<COL$}");
    }
    let _ = writeln!(out);
    for card in &session.score_cards {
        let cells = [
            card.round.to_string(),
            card.clarity.to_string(),
            card.evidence.to_string(),
            card.logic.to_string(),
            card.originality.to_string(),
            card.persuasiveness.to_string(),
            format!("{}/50", card.total),
        ];
        for cell in cells {
            let _ = write!(out, "{cell:<COL$}");
        }
        let _ = writeln!(out, "  {}", card.summary);
    }
}

fn render_fallacies(out: &mut String, session: &DebateSession) {
    let _ = writeln!(out, "\nFALLACIES");
    if session.fallacy_reports.is_empty() {
        let _ = writeln!(out, "  None detected across the session.");
        return;
    }
    for report in &session.fallacy_reports {
        let _ = writeln!(
            out,
            "  [{}] {} (round {})",
            report.severity, report.fallacy_name, report.round
        );
        let _ = writeln!(out, "    quote: \"{}\"", report.quote);
        let _ = writeln!(out, "    why: {}", report.explanation);
    }
}

fn render_rebuttals(out: &mut String, session: &DebateSession) {
    let _ = writeln!(out, "\nCOUNTER-ARGUMENTS FACED");
    if session.counter_arguments.is_empty() {
        let _ = writeln!(out, "  None recorded.");
        return;
    }
    for (index, rebuttal) in session.counter_arguments.iter().enumerate() {
        let _ = writeln!(out, "  --- rebuttal {} ---", index + 1);
        for line in rebuttal.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }
}

fn render_questions(out: &mut String, session: &DebateSession) {
    let _ = writeln!(out, "\nSOCRATIC QUESTIONS");
    if session.socratic_questions.is_empty() {
        let _ = writeln!(out, "  None asked.");
        return;
    }
    for question in &session.socratic_questions {
        let _ = writeln!(out, "  {question}");
    }
}

fn render_verdict(out: &mut String, session: &DebateSession) {
    let _ = writeln!(out, "\n{RULE}");
    if session.is_finished() {
        let _ = writeln!(out, "  FINAL VERDICT & COACHING");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "{}", session.verdict);
        for tip in &session.coaching_tips {
            let _ = writeln!(out, "  tip: {tip}");
        }
    } else {
        let _ = writeln!(out, "  Session still in progress.");
        let _ = writeln!(out, "{RULE}");
    }
}
