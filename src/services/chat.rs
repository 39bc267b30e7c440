//! Chat classification and the flows a chat line can start: answers, clue
//! selection, wagers and lobby preferences.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    collaborators::{
        AnswerJudge, Broadcaster, ClueResolution, ClueResolver, Judgement, local::first_number,
    },
    config::AppConfig,
    error::ServiceError,
    services::{
        buzzer::BuzzerArbiter,
        events::{
            broadcast_answer, broadcast_daily_double, broadcast_error, broadcast_player_chat,
            broadcast_player_list, broadcast_question_display,
        },
        final_round::FinalRoundService,
        narration::{AudioKind, AudioSequencer, NarrationBinding},
        phrases,
    },
    state::{
        GameStateSnapshot, SharedGame,
        game::{AvailableCategory, FinalStage, PreferenceMessage},
        state_machine::{GameEvent, GamePhase},
        timeout::TimeoutKind,
    },
};

/// Smallest daily double wager.
pub const MIN_DAILY_DOUBLE_WAGER: i64 = 5;
/// Wager ceiling for players with less than this on the board.
pub const DAILY_DOUBLE_FLOOR_CAP: i64 = 1_000;
/// Preferences must be longer than this many characters.
const MIN_PREFERENCE_CHARS: usize = 3;

/// What a chat line means in the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatIntent {
    /// Topic wish collected before the board is built.
    Preference,
    /// Response from the player holding the buzz.
    Answer,
    /// Clue pick from the player with control.
    ClueSelection,
    /// Daily double or final round wager.
    Wager,
    /// Final round response.
    FinalAnswer,
    /// Anything else; echoed and otherwise ignored.
    Noise,
}

/// Loose player name comparison: case-insensitive, equal or contained either way.
/// Empty names never match.
pub fn is_same_player(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

/// Registered player a chat sender stands for: exact name first, then a loose match.
pub fn matching_player(snapshot: &GameStateSnapshot, username: &str) -> Option<String> {
    snapshot
        .players
        .iter()
        .find(|player| player.name == username)
        .or_else(|| {
            snapshot
                .players
                .iter()
                .find(|player| is_same_player(&player.name, username))
        })
        .map(|player| player.name.clone())
}

/// Whether `username` is the host. Exact up to case and surrounding whitespace, so a
/// player whose name merely overlaps the host's is not filtered.
pub fn is_host(host_name: &str, username: &str) -> bool {
    let host = host_name.trim();
    !host.is_empty() && host.to_lowercase() == username.trim().to_lowercase()
}

fn sender_matches(candidate: Option<&str>, username: &str) -> bool {
    candidate.is_some_and(|name| is_same_player(name, username))
}

/// Classify a chat line against `snapshot`.
pub fn classify(
    snapshot: &GameStateSnapshot,
    host_name: &str,
    username: &str,
    message: &str,
) -> ChatIntent {
    if is_host(host_name, username) {
        return ChatIntent::Noise;
    }

    match snapshot.phase {
        GamePhase::Lobby | GamePhase::CollectingPreferences => {
            if message.trim().chars().count() > MIN_PREFERENCE_CHARS {
                ChatIntent::Preference
            } else {
                ChatIntent::Noise
            }
        }
        GamePhase::AwaitingAnswer
            if snapshot.question.is_some()
                && sender_matches(snapshot.buzzed_player.as_deref(), username) =>
        {
            ChatIntent::Answer
        }
        GamePhase::QuestionActive
            if snapshot
                .question
                .as_ref()
                .is_some_and(|q| q.daily_double && !q.revealed)
                && sender_matches(snapshot.player_with_control.as_deref(), username) =>
        {
            ChatIntent::Wager
        }
        GamePhase::AwaitingSelection
            if sender_matches(snapshot.player_with_control.as_deref(), username) =>
        {
            ChatIntent::ClueSelection
        }
        GamePhase::Final if matching_player(snapshot, username).is_some() => {
            match snapshot.final_stage {
                Some(FinalStage::Wagering) => ChatIntent::Wager,
                Some(FinalStage::Answering) => ChatIntent::FinalAnswer,
                _ => ChatIntent::Noise,
            }
        }
        _ => ChatIntent::Noise,
    }
}

/// Largest daily double wager allowed for a player with `score`.
pub fn daily_double_cap(score: i64) -> i64 {
    score.max(DAILY_DOUBLE_FLOOR_CAP)
}

/// Clamp a requested daily double wager into `[5, max(1000, score)]`.
pub fn clamp_daily_double_wager(requested: i64, score: i64) -> i64 {
    requested.clamp(MIN_DAILY_DOUBLE_WAGER, daily_double_cap(score))
}

fn selection_help(available: &[AvailableCategory]) -> String {
    if available.is_empty() {
        return "There are no clues left to choose from.".into();
    }
    let options = available
        .iter()
        .map(|category| {
            let values = category
                .values
                .iter()
                .map(|value| format!("${value}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} ({values})", category.name)
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("I didn't catch that. Please pick a category and value from: {options}.")
}

/// Routes chat lines to the flow they belong to.
pub struct ChatRouter {
    game: SharedGame,
    broadcaster: Arc<dyn Broadcaster>,
    judge: Arc<dyn AnswerJudge>,
    resolver: Arc<dyn ClueResolver>,
    narrator: Arc<AudioSequencer>,
    arbiter: Arc<BuzzerArbiter>,
    final_round: Arc<FinalRoundService>,
    config: Arc<AppConfig>,
}

impl ChatRouter {
    /// Build a router; every handle is shared with the other host components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game: SharedGame,
        broadcaster: Arc<dyn Broadcaster>,
        judge: Arc<dyn AnswerJudge>,
        resolver: Arc<dyn ClueResolver>,
        narrator: Arc<AudioSequencer>,
        arbiter: Arc<BuzzerArbiter>,
        final_round: Arc<FinalRoundService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            game,
            broadcaster,
            judge,
            resolver,
            narrator,
            arbiter,
            final_round,
            config,
        }
    }

    fn bc(&self) -> &dyn Broadcaster {
        self.broadcaster.as_ref()
    }

    /// Echo a chat line and act on it. Returns how the line was understood.
    pub async fn handle(&self, username: &str, message: &str) -> Result<ChatIntent, ServiceError> {
        broadcast_player_chat(self.bc(), username, message);

        let snapshot = self.game.lock().await.snapshot();
        let intent = classify(&snapshot, &self.config.host_name, username, message);
        debug!(username, ?intent, "chat classified");

        match intent {
            ChatIntent::Preference => self.record_preference(username, message).await,
            ChatIntent::Answer => self.handle_answer(message).await?,
            ChatIntent::ClueSelection => self.handle_selection(message).await?,
            ChatIntent::Wager => match snapshot.phase {
                GamePhase::Final => {
                    if let Some(player) = matching_player(&snapshot, username) {
                        self.handle_final_wager(&player, message).await;
                    }
                }
                _ => self.handle_daily_double_wager(message).await,
            },
            ChatIntent::FinalAnswer => {
                if let Some(player) = matching_player(&snapshot, username) {
                    self.final_round.submit_answer(&player, message).await;
                }
            }
            ChatIntent::Noise => {}
        }
        Ok(intent)
    }

    async fn record_preference(&self, username: &str, message: &str) {
        let mut state = self.game.lock().await;
        state.push_preference(PreferenceMessage {
            username: username.to_string(),
            message: message.trim().to_string(),
        });
    }

    async fn handle_answer(&self, submitted: &str) -> Result<(), ServiceError> {
        let (player, cycle, question) = {
            let mut state = self.game.lock().await;
            let Some(player) = state.buzzed_player().map(str::to_string) else {
                return Ok(());
            };
            let Some(question) = state.current_question().cloned() else {
                return Ok(());
            };
            if !state.timeouts().is_armed(TimeoutKind::Answer) {
                debug!(player, "answer arrived after the window closed");
                return Ok(());
            }
            state.timeouts().cancel(TimeoutKind::Answer);
            (player, state.buzz_cycle(), question)
        };

        let mut judge_failed = false;
        let judgement = match self.judge.evaluate(&question.answer, submitted).await {
            Ok(judgement) => judgement,
            Err(err) => {
                warn!(player, error = %err, "answer judge failed; treating answer as incorrect");
                judge_failed = true;
                Judgement {
                    correct: false,
                    explanation: "I couldn't evaluate that answer.".into(),
                }
            }
        };

        let mut state = self.game.lock().await;
        let still_current = state.buzzed_player() == Some(player.as_str())
            && state.buzz_cycle() == cycle
            && state.current_question().map(|q| q.id) == Some(question.id);
        if !still_current {
            debug!(player, cycle, "answer overtaken while judging");
            return Ok(());
        }

        info!(player, correct = judgement.correct, "answer judged");
        if judgement.correct {
            let line = phrases::correct(&player);
            self.arbiter.say(&line);
            broadcast_answer(self.bc(), &player, true, question.value);
            state.adjust_score(&player, question.value);
            broadcast_player_list(self.bc(), state.players());
            self.arbiter.resolve_correct_locked(&mut state, &player);
            self.narrator
                .enqueue(&line, AudioKind::Generic, NarrationBinding::default());
        } else {
            let mut line = phrases::incorrect(&player);
            if judge_failed {
                line = format!("{line} {}", judgement.explanation);
            }
            self.arbiter.say(&line);
            broadcast_answer(self.bc(), &player, false, question.value);
            state.adjust_score(&player, -question.value);
            broadcast_player_list(self.bc(), state.players());
            let reactivation = self.arbiter.resolve_incorrect_locked(&mut state, &player);
            self.arbiter
                .narrate_incorrect_locked(&mut state, &line, question.id, reactivation);
        }
        Ok(())
    }

    async fn handle_selection(&self, message: &str) -> Result<(), ServiceError> {
        let available = {
            let state = self.game.lock().await;
            state.board().map(|board| board.available()).unwrap_or_default()
        };

        let resolution = match self.resolver.resolve(message, &available).await {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(error = %err, "clue resolver failed");
                ClueResolution::Invalid {
                    error: err.to_string(),
                }
            }
        };
        let (category, value) = match resolution {
            ClueResolution::Valid { category, value } => (category, value),
            ClueResolution::Invalid { error } => {
                debug!(error, "selection not understood");
                self.arbiter.say(&selection_help(&available));
                return Ok(());
            }
        };

        let mut state = self.game.lock().await;
        if state.phase() != GamePhase::AwaitingSelection {
            debug!(phase = ?state.phase(), "selection arrived too late");
            return Ok(());
        }
        let question = match state.select_question(&category, value) {
            Ok(Some(question)) => question,
            Ok(None) => {
                let available = state.board().map(|board| board.available()).unwrap_or_default();
                self.arbiter.say(&selection_help(&available));
                return Ok(());
            }
            Err(err) => {
                warn!(error = %err, "clue selection failed");
                broadcast_error(self.bc(), &err.to_string());
                return Err(err);
            }
        };
        state.apply(GameEvent::ClueSelected)?;
        info!(category = %question.category, value = question.value, daily_double = question.daily_double, "clue selected");

        if question.daily_double {
            let player = state.player_with_control().unwrap_or_default().to_string();
            let cap = daily_double_cap(state.score(&player).unwrap_or(0));
            broadcast_daily_double(self.bc(), &player, &question, cap);
            self.arbiter.say(&format!(
                "{player}, you found the Daily Double! How much would you like to wager? You can bet up to ${cap}."
            ));
            self.arbiter.arm_wager_timeout_locked(&mut state);
        } else {
            broadcast_question_display(self.bc(), &question);
        }
        Ok(())
    }

    async fn handle_daily_double_wager(&self, message: &str) {
        let mut state = self.game.lock().await;
        let awaiting_wager = state
            .current_question()
            .is_some_and(|q| q.daily_double && !q.revealed);
        let Some(player) = state.player_with_control().map(str::to_string) else {
            return;
        };
        if !awaiting_wager {
            return;
        }

        let Some(requested) = first_number(message) else {
            let cap = daily_double_cap(state.score(&player).unwrap_or(0));
            self.arbiter.say(&format!(
                "{player}, please tell me a dollar amount between ${MIN_DAILY_DOUBLE_WAGER} and ${cap}."
            ));
            return;
        };
        let wager = clamp_daily_double_wager(requested, state.score(&player).unwrap_or(0));
        debug!(player, requested, wager, "daily double wager clamped");
        let line = format!("{player} wagers ${wager}. Here is your clue.");
        self.arbiter
            .place_daily_double_wager_locked(&mut state, &player, wager, &line);
    }

    async fn handle_final_wager(&self, player: &str, message: &str) {
        match first_number(message) {
            Some(amount) => self.final_round.submit_wager(player, amount).await,
            None => self
                .arbiter
                .say(&format!("{player}, please tell me how much you want to wager.")),
        }
    }
}
