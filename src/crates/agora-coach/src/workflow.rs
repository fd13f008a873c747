//! Graph wiring for a coaching session.
//!
//! The shape never changes: intake seeds the session, the fallacy detector
//! opens each round, three analysts run concurrently behind one barrier, and
//! the barrier's router either loops into the next round or hands over to
//! the final coach.
//!
//! ```text
//! intake -> fallacyDetector -> { devilAdvocate | socraticQuestioner | argumentScorer }
//!                |                                  |
//!                +---------- incrementRound <- continue / finalize -> finalCoach
//! ```

use std::sync::Arc;

use serde_json::Value;

use agora_graph::{BranchRouter, Graph, Result as GraphResult};

use crate::agents::{
    ArgumentScorer, DevilAdvocate, FallacyDetector, FinalCoach, IncrementRound, Intake,
    SocraticQuestioner, ARGUMENT_SCORER, DEVIL_ADVOCATE, FALLACY_DETECTOR, FINAL_COACH,
    INCREMENT_ROUND, INTAKE, SOCRATIC_QUESTIONER,
};
use crate::model::ChatModel;
use crate::session::fields;

/// The fan-out barrier the three analysts run behind.
pub const ANALYSIS_GROUP: &str = "analysis";
/// Branch label for another round.
pub const CONTINUE: &str = "continue";
/// Branch label for the closing report.
pub const FINALIZE: &str = "finalize";

/// Builds the session graph. `max_rounds` is baked into the barrier router;
/// the session loops until `roundNumber` reaches it.
pub fn debate_graph(model: Arc<dyn ChatModel>, max_rounds: u64) -> GraphResult<Graph> {
    let router: BranchRouter = Arc::new(move |state: &Value| {
        let round = state[fields::ROUND_NUMBER].as_u64().unwrap_or(0);
        if round >= max_rounds {
            FINALIZE.to_string()
        } else {
            CONTINUE.to_string()
        }
    });

    Graph::builder()
        .add_node(INTAKE, Arc::new(Intake))
        .add_node(
            FALLACY_DETECTOR,
            Arc::new(FallacyDetector::new(model.clone())),
        )
        .add_node(DEVIL_ADVOCATE, Arc::new(DevilAdvocate::new(model.clone())))
        .add_node(
            SOCRATIC_QUESTIONER,
            Arc::new(SocraticQuestioner::new(model.clone())),
        )
        .add_node(ARGUMENT_SCORER, Arc::new(ArgumentScorer::new(model.clone())))
        .add_node(INCREMENT_ROUND, Arc::new(IncrementRound))
        .add_node(FINAL_COACH, Arc::new(FinalCoach::new(model)))
        .set_entry(INTAKE)
        .add_edge(INTAKE, FALLACY_DETECTOR)
        .add_fan_out(
            FALLACY_DETECTOR,
            ANALYSIS_GROUP,
            [DEVIL_ADVOCATE, SOCRATIC_QUESTIONER, ARGUMENT_SCORER],
        )
        .add_condition(
            ANALYSIS_GROUP,
            router,
            [(CONTINUE, INCREMENT_ROUND), (FINALIZE, FINAL_COACH)],
        )
        .add_edge(INCREMENT_ROUND, FALLACY_DETECTOR)
        .build()
}
