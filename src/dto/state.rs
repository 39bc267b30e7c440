use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{
    GameStateSnapshot,
    game::{FinalStage, PlayerRecord, Question, QuestionId},
    state_machine::GamePhase,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Player name and score as shown to clients.
pub struct PlayerSummary {
    /// Display name.
    pub name: String,
    /// Current score.
    pub score: i64,
}

impl From<&PlayerRecord> for PlayerSummary {
    fn from(value: &PlayerRecord) -> Self {
        Self {
            name: value.name.clone(),
            score: value.score,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public view of the clue on screen; the expected answer is withheld.
pub struct QuestionView {
    /// Question id.
    #[schema(value_type = String)]
    pub id: QuestionId,
    /// Category name.
    pub category: String,
    /// Value, or the wager on a daily double.
    pub value: i64,
    /// Empty while a daily double waits for its wager.
    pub text: String,
    /// Whether the clue is a daily double.
    pub daily_double: bool,
}

impl From<&Question> for QuestionView {
    fn from(value: &Question) -> Self {
        Self {
            id: value.id,
            category: value.category.clone(),
            value: value.value,
            text: if value.revealed {
                value.text.clone()
            } else {
                String::new()
            },
            daily_double: value.daily_double,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Game state returned by `GET /state`.
pub struct StateView {
    /// Gameplay phase.
    pub phase: GamePhase,
    /// State version.
    pub version: u64,
    /// Clue on screen.
    pub question: Option<QuestionView>,
    /// Player holding the buzz.
    pub buzzed_player: Option<String>,
    /// Players who already missed this clue.
    pub incorrect_attempts: Vec<String>,
    /// Player who picks next.
    pub player_with_control: Option<String>,
    /// Whether the buzzer is open.
    pub buzzer_active: bool,
    /// Accepted buzzes so far.
    pub buzz_cycle: u64,
    /// Roster with scores.
    pub players: Vec<PlayerSummary>,
    /// Board preferences collected.
    pub preference_count: usize,
    /// Final round stage.
    pub final_stage: Option<FinalStage>,
}

impl From<&GameStateSnapshot> for StateView {
    fn from(value: &GameStateSnapshot) -> Self {
        Self {
            phase: value.phase,
            version: value.version,
            question: value.question.as_ref().map(QuestionView::from),
            buzzed_player: value.buzzed_player.clone(),
            incorrect_attempts: value.incorrect_attempts.iter().cloned().collect(),
            player_with_control: value.player_with_control.clone(),
            buzzer_active: value.buzzer_active,
            buzz_cycle: value.buzz_cycle,
            players: value.players.iter().map(PlayerSummary::from).collect(),
            preference_count: value.preference_count,
            final_stage: value.final_stage,
        }
    }
}
