use serde::Serialize;
use tracing::warn;

use crate::{
    collaborators::Broadcaster,
    dto::{
        epoch_millis, now_rfc3339,
        sse::{
            AnswerEvent, AnswerTimerStartEvent, AudioCompleteEvent, BuzzerEvent,
            BuzzerStatusEvent, ChatMessageEvent, DailyDoubleEvent, ErrorEvent, FinalResultEntry,
            FinalResultsEvent, FinalRoundEvent, GameReadyEvent, PhaseChangedEvent, PlayAudioEvent,
            PlayerListEvent, QuestionDismissEvent, QuestionDisplayEvent, RevealCategoryEvent,
            SelectQuestionEvent, ServerEvent,
        },
        state::PlayerSummary,
    },
    state::{
        ClientId,
        game::{FinalStage, PlayerRecord, Question},
        state_machine::GamePhase,
    },
};

/// Buzzer opened or closed.
pub const EVENT_BUZZER_STATUS: &str = "buzzer_status";
/// Buzz accepted.
pub const EVENT_BUZZER: &str = "buzzer";
/// Answer window started.
pub const EVENT_ANSWER_TIMER_START: &str = "answer_timer_start";
/// Answer judged or timed out.
pub const EVENT_ANSWER: &str = "answer";
/// Clue on screen.
pub const EVENT_QUESTION_DISPLAY: &str = "question_display";
/// Clue taken off screen.
pub const EVENT_QUESTION_DISMISS: &str = "question_dismiss";
/// Chat line echo.
pub const EVENT_CHAT_MESSAGE: &str = "chat_message";
/// Narration clip to play.
pub const EVENT_PLAY_AUDIO: &str = "play_audio";
/// Narration clip finished.
pub const EVENT_AUDIO_COMPLETE: &str = "audio_complete";
/// One category of a new board.
pub const EVENT_REVEAL_CATEGORY: &str = "reveal_category";
/// Player quota reached.
pub const EVENT_GAME_READY: &str = "game_ready";
/// A player has control of the board.
pub const EVENT_SELECT_QUESTION: &str = "select_question";
/// Daily double found.
pub const EVENT_DAILY_DOUBLE: &str = "daily_double";
/// Roster and scores.
pub const EVENT_PLAYER_LIST: &str = "player_list";
/// Final round stage change.
pub const EVENT_FINAL_ROUND: &str = "final_round";
/// Final round results.
pub const EVENT_FINAL_RESULTS: &str = "final_results";
/// Operation failed.
pub const EVENT_ERROR: &str = "error";
/// Phase transition.
pub const EVENT_PHASE_CHANGED: &str = "phase_changed";
/// First message on an SSE stream.
pub const EVENT_HANDSHAKE: &str = "handshake";
// unicast
/// Registration acknowledgement.
pub const EVENT_REGISTERED: &str = "registered";
/// Outcome of the sender's buzz.
pub const EVENT_BUZZ_FEEDBACK: &str = "buzz_feedback";
/// Full state for a client that just connected.
pub const EVENT_GAME_STATE: &str = "game_state";

/// Broadcast whether the buzzer is open.
pub fn broadcast_buzzer_status(bc: &dyn Broadcaster, active: bool) {
    send_public_event(bc, EVENT_BUZZER_STATUS, &BuzzerStatusEvent { active });
}

/// Broadcast an accepted buzz.
pub fn broadcast_buzzer(bc: &dyn Broadcaster, contestant: &str) {
    let payload = BuzzerEvent {
        contestant: contestant.to_string(),
        timestamp: epoch_millis(),
    };
    send_public_event(bc, EVENT_BUZZER, &payload);
}

/// Broadcast the start of a player's answer window.
pub fn broadcast_answer_timer_start(bc: &dyn Broadcaster, player: &str, seconds: u64) {
    let payload = AnswerTimerStartEvent {
        player: player.to_string(),
        seconds,
    };
    send_public_event(bc, EVENT_ANSWER_TIMER_START, &payload);
}

/// Broadcast the verdict on an answer.
pub fn broadcast_answer(bc: &dyn Broadcaster, contestant: &str, correct: bool, value: i64) {
    let payload = AnswerEvent {
        contestant: contestant.to_string(),
        correct,
        value,
    };
    send_public_event(bc, EVENT_ANSWER, &payload);
}

/// Broadcast the clue now on screen.
pub fn broadcast_question_display(bc: &dyn Broadcaster, question: &Question) {
    let payload = QuestionDisplayEvent {
        category: question.category.clone(),
        value: question.value,
        text: question.text.clone(),
        answer: question.answer.clone(),
        daily_double: question.daily_double,
    };
    send_public_event(bc, EVENT_QUESTION_DISPLAY, &payload);
}

/// Broadcast that the clue left the screen.
pub fn broadcast_question_dismiss(bc: &dyn Broadcaster) {
    send_public_event(bc, EVENT_QUESTION_DISMISS, &QuestionDismissEvent {});
}

/// Echo a player's chat line.
pub fn broadcast_player_chat(bc: &dyn Broadcaster, username: &str, message: &str) {
    let payload = ChatMessageEvent {
        username: username.to_string(),
        message: message.to_string(),
        is_host: false,
        timestamp: now_rfc3339(),
    };
    send_public_event(bc, EVENT_CHAT_MESSAGE, &payload);
}

/// Post a chat line in the host's name.
pub fn broadcast_host_chat(bc: &dyn Broadcaster, host_name: &str, message: &str) {
    let payload = ChatMessageEvent {
        username: host_name.to_string(),
        message: message.to_string(),
        is_host: true,
        timestamp: now_rfc3339(),
    };
    send_public_event(bc, EVENT_CHAT_MESSAGE, &payload);
}

/// Ask displays to play a narration clip.
pub fn broadcast_play_audio(bc: &dyn Broadcaster, url: &str, audio_id: &str) {
    let payload = PlayAudioEvent {
        url: url.to_string(),
        audio_id: audio_id.to_string(),
        wait_for_completion: true,
    };
    send_public_event(bc, EVENT_PLAY_AUDIO, &payload);
}

/// Broadcast that a narration clip finished.
pub fn broadcast_audio_complete(bc: &dyn Broadcaster, audio_id: &str) {
    let payload = AudioCompleteEvent {
        audio_id: audio_id.to_string(),
    };
    send_public_event(bc, EVENT_AUDIO_COMPLETE, &payload);
}

/// Reveal one board category.
pub fn broadcast_reveal_category(bc: &dyn Broadcaster, index: usize, category: &str) {
    let payload = RevealCategoryEvent {
        index,
        category: category.to_string(),
    };
    send_public_event(bc, EVENT_REVEAL_CATEGORY, &payload);
}

/// Broadcast that enough players joined.
pub fn broadcast_game_ready(bc: &dyn Broadcaster) {
    send_public_event(bc, EVENT_GAME_READY, &GameReadyEvent { ready: true });
}

/// Broadcast which player picks next.
pub fn broadcast_select_question(bc: &dyn Broadcaster, contestant: &str) {
    let payload = SelectQuestionEvent {
        contestant: contestant.to_string(),
    };
    send_public_event(bc, EVENT_SELECT_QUESTION, &payload);
}

/// Broadcast a daily double awaiting a wager.
pub fn broadcast_daily_double(
    bc: &dyn Broadcaster,
    contestant: &str,
    question: &Question,
    max_wager: i64,
) {
    let payload = DailyDoubleEvent {
        contestant: contestant.to_string(),
        category: question.category.clone(),
        value: question.value,
        max_wager,
    };
    send_public_event(bc, EVENT_DAILY_DOUBLE, &payload);
}

/// Broadcast the roster with scores.
pub fn broadcast_player_list<'a>(
    bc: &dyn Broadcaster,
    players: impl IntoIterator<Item = &'a PlayerRecord>,
) {
    let payload = PlayerListEvent {
        players: players.into_iter().map(PlayerSummary::from).collect(),
    };
    send_public_event(bc, EVENT_PLAYER_LIST, &payload);
}

/// Broadcast a final round stage change.
pub fn broadcast_final_round(
    bc: &dyn Broadcaster,
    stage: FinalStage,
    category: &str,
    clue: Option<&str>,
    seconds: u64,
) {
    let payload = FinalRoundEvent {
        stage,
        category: category.to_string(),
        clue: clue.map(str::to_string),
        seconds,
    };
    send_public_event(bc, EVENT_FINAL_ROUND, &payload);
}

/// Broadcast judged final round results.
pub fn broadcast_final_results(
    bc: &dyn Broadcaster,
    results: Vec<FinalResultEntry>,
    winner: Option<String>,
) {
    send_public_event(bc, EVENT_FINAL_RESULTS, &FinalResultsEvent { results, winner });
}

/// Broadcast an unrecoverable operation failure.
pub fn broadcast_error(bc: &dyn Broadcaster, message: &str) {
    let payload = ErrorEvent {
        message: message.to_string(),
    };
    send_public_event(bc, EVENT_ERROR, &payload);
}

/// Broadcast the new gameplay phase.
pub fn broadcast_phase_changed(bc: &dyn Broadcaster, phase: GamePhase, version: u64) {
    send_public_event(bc, EVENT_PHASE_CHANGED, &PhaseChangedEvent { phase, version });
}

/// Send `payload` to one client.
pub fn send_client_event(
    bc: &dyn Broadcaster,
    client: ClientId,
    event: &str,
    payload: &impl Serialize,
) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => {
            if !bc.send_to(client, message) {
                warn!(event, client = %client, "client is gone; dropping event");
            }
        }
        Err(err) => warn!(event, error = %err, "failed to serialize client payload"),
    }
}

fn send_public_event(bc: &dyn Broadcaster, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => bc.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public payload"),
    }
}
