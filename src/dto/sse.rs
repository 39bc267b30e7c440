use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::state::PlayerSummary,
    state::{game::FinalStage, state_machine::GamePhase},
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Dispatched payload carried across SSE and WebSocket channels.
pub struct ServerEvent {
    /// Event name; `None` for unnamed messages.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Frame used on WebSocket connections: `{"type": <event>, "payload": <data>}`.
    pub fn to_ws_frame(&self) -> serde_json::Result<String> {
        let payload: serde_json::Value = serde_json::from_str(&self.data)?;
        serde_json::to_string(&serde_json::json!({
            "type": self.event,
            "payload": payload,
        }))
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Phase at subscription time.
    pub phase: GamePhase,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the buzzer opens or closes.
pub struct BuzzerStatusEvent {
    /// Whether players may buzz.
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a buzz is accepted.
pub struct BuzzerEvent {
    /// Player who buzzed first.
    pub contestant: String,
    /// Acceptance time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the answer timer starts for a player.
pub struct AnswerTimerStartEvent {
    /// Player who has to answer.
    pub player: String,
    /// Length of the answer window.
    pub seconds: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once an answer was judged or timed out.
pub struct AnswerEvent {
    /// Player who answered.
    pub contestant: String,
    /// Verdict.
    pub correct: bool,
    /// Amount won or lost.
    pub value: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when a clue is put on screen.
pub struct QuestionDisplayEvent {
    /// Category of the clue.
    pub category: String,
    /// Clue value, or the wager on a daily double.
    pub value: i64,
    /// Clue text.
    pub text: String,
    /// Expected answer, for host displays.
    pub answer: String,
    /// Whether the clue is a daily double.
    pub daily_double: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the current clue is taken off screen.
pub struct QuestionDismissEvent {}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Chat line echoed to every client.
pub struct ChatMessageEvent {
    /// Sender.
    pub username: String,
    /// Line as typed.
    pub message: String,
    /// Whether the host said it.
    pub is_host: bool,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Asks displays to play a narration clip and report completion.
pub struct PlayAudioEvent {
    /// Where to fetch the clip.
    pub url: String,
    /// Id to report back on completion.
    pub audio_id: String,
    /// Whether the host waits for the completion report.
    pub wait_for_completion: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast after a narration clip finished playing.
pub struct AudioCompleteEvent {
    /// Clip that finished.
    pub audio_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast for each category during the board reveal.
pub struct RevealCategoryEvent {
    /// Column on the board.
    pub index: usize,
    /// Category name.
    pub category: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once the player quota is reached.
pub struct GameReadyEvent {
    /// Always true.
    pub ready: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player gets control of the board.
pub struct SelectQuestionEvent {
    /// Player picking the next clue.
    pub contestant: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Broadcast when the selected clue is a daily double.
pub struct DailyDoubleEvent {
    /// Player who found it.
    pub contestant: String,
    /// Category of the clue.
    pub category: String,
    /// Board value of the clue.
    pub value: i64,
    /// Largest wager accepted.
    pub max_wager: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the roster or scores change.
pub struct PlayerListEvent {
    /// Players in registration order.
    pub players: Vec<PlayerSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the final round changes stage.
pub struct FinalRoundEvent {
    /// Stage just entered.
    pub stage: FinalStage,
    /// Final category.
    pub category: String,
    /// Clue text, once answers are open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clue: Option<String>,
    /// Time allowed for this stage.
    pub seconds: u64,
}

#[derive(Debug, Serialize, ToSchema)]
/// One line of the final round results.
pub struct FinalResultEntry {
    /// Player.
    pub name: String,
    /// Wager after clamping.
    pub wager: i64,
    /// Submitted answer, if any.
    pub answer: Option<String>,
    /// Verdict.
    pub correct: bool,
    /// Score after the final round.
    pub score: i64,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once final round answers are judged.
pub struct FinalResultsEvent {
    /// One entry per player.
    pub results: Vec<FinalResultEntry>,
    /// Highest scorer.
    pub winner: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an operation hits an unrecoverable condition.
pub struct ErrorEvent {
    /// What went wrong.
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever the gameplay phase changes.
pub struct PhaseChangedEvent {
    /// Phase entered.
    pub phase: GamePhase,
    /// State version of the transition.
    pub version: u64,
}
