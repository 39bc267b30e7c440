//! Buzzer arbitration: who may answer, for how long, and what happens when time runs out.

use std::sync::{Arc, Weak};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    collaborators::Broadcaster,
    config::AppConfig,
    error::ServiceError,
    services::{
        events::{
            broadcast_answer, broadcast_answer_timer_start, broadcast_buzzer,
            broadcast_buzzer_status, broadcast_host_chat, broadcast_player_list,
            broadcast_question_dismiss, broadcast_question_display, broadcast_select_question,
        },
        chat::MIN_DAILY_DOUBLE_WAGER,
        narration::{AudioKind, AudioSequencer, NarrationBinding, NarrationCompleted},
        phrases,
    },
    state::{
        GameState, SharedGame,
        game::QuestionId,
        state_machine::{GameEvent, GamePhase},
        timeout::{TimeoutKind, TimerToken},
    },
};

/// Why a buzz was not accepted. Rejections never change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuzzRejection {
    /// The buzzer is closed.
    #[error("the buzzer is not active")]
    Inactive,
    /// The player is not registered.
    #[error("unknown player")]
    UnknownPlayer,
    /// The player already answered this clue wrong.
    #[error("you already answered this clue")]
    AlreadyAttempted,
}

/// What should happen once a wrong answer has been narrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reactivation {
    /// Reopen the buzzer for the remaining players.
    Armed,
    /// The clue is over; nothing to reopen.
    Dismissed,
}

/// Owns every transition of the buzzer and the question timers.
pub struct BuzzerArbiter {
    game: SharedGame,
    broadcaster: Arc<dyn Broadcaster>,
    narrator: Arc<AudioSequencer>,
    config: Arc<AppConfig>,
    this: Weak<Self>,
}

impl BuzzerArbiter {
    /// Build an arbiter over `game`.
    pub fn new(
        game: SharedGame,
        broadcaster: Arc<dyn Broadcaster>,
        narrator: Arc<AudioSequencer>,
        config: Arc<AppConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            game,
            broadcaster,
            narrator,
            config,
            this: this.clone(),
        })
    }

    fn bc(&self) -> &dyn Broadcaster {
        self.broadcaster.as_ref()
    }

    pub(crate) fn say(&self, line: &str) {
        broadcast_host_chat(self.bc(), &self.config.host_name, line);
    }

    /// Open the buzzer. Returns whether it is open afterwards.
    pub async fn activate(&self) -> bool {
        let mut state = self.game.lock().await;
        self.activate_locked(&mut state)
    }

    pub(crate) fn activate_locked(&self, state: &mut GameState) -> bool {
        if state.buzzer_active() {
            return true;
        }
        if !state.set_buzzer_active(true) {
            debug!(
                buzzed = ?state.buzzed_player(),
                "buzzer stays closed; no revealed clue or buzz already held"
            );
            return false;
        }

        let this = self.this.clone();
        state
            .timeouts()
            .arm(TimeoutKind::Buzz, self.config.timings.buzz, move |token| async move {
                match this.upgrade() {
                    Some(arbiter) => arbiter.on_buzz_timeout(token).await,
                    None => Ok(()),
                }
            });
        broadcast_buzzer_status(self.bc(), true);
        info!("buzzer activated");
        true
    }

    /// Close the buzzer. Returns whether it was open.
    pub async fn deactivate(&self) -> bool {
        let mut state = self.game.lock().await;
        self.deactivate_locked(&mut state)
    }

    pub(crate) fn deactivate_locked(&self, state: &mut GameState) -> bool {
        state.timeouts().cancel(TimeoutKind::Buzz);
        if !state.buzzer_active() {
            return false;
        }
        state.set_buzzer_active(false);
        broadcast_buzzer_status(self.bc(), false);
        info!("buzzer deactivated");
        true
    }

    /// Try to take the buzz for `player`. On success returns the new buzz cycle.
    pub async fn register_buzz(&self, player: &str) -> Result<u64, BuzzRejection> {
        let mut state = self.game.lock().await;
        if !state.has_player(player) {
            return Err(BuzzRejection::UnknownPlayer);
        }
        if !state.buzzer_active() {
            return Err(BuzzRejection::Inactive);
        }
        if state.has_attempted(player) {
            return Err(BuzzRejection::AlreadyAttempted);
        }

        state.timeouts().cancel(TimeoutKind::Buzz);
        let cycle = state.take_buzz(player);
        if state.try_apply(GameEvent::BuzzAccepted).is_none() {
            warn!(phase = ?state.phase(), "buzz accepted outside an active question");
        }
        broadcast_buzzer_status(self.bc(), false);
        broadcast_buzzer(self.bc(), player);
        self.arm_answer_timeout_locked(&mut state, player, cycle);
        info!(player, cycle, "buzz accepted");
        Ok(cycle)
    }

    fn arm_answer_timeout_locked(&self, state: &mut GameState, player: &str, cycle: u64) {
        let this = self.this.clone();
        let owner = player.to_string();
        let duration = self.config.timings.answer;
        state
            .timeouts()
            .arm(TimeoutKind::Answer, duration, move |token| async move {
                match this.upgrade() {
                    Some(arbiter) => arbiter.on_answer_timeout(token, owner, cycle).await,
                    None => Ok(()),
                }
            });
        broadcast_answer_timer_start(self.bc(), player, duration.as_secs());
    }

    /// Settle a correct answer: `player` takes control and the clue leaves the screen.
    pub(crate) fn resolve_correct_locked(&self, state: &mut GameState, player: &str) {
        state.timeouts().cancel(TimeoutKind::Answer);
        state.set_control(player);
        self.dismiss_locked(state);
        self.prompt_selection_locked(state);
    }

    /// Settle a wrong answer. The buzzer is never reopened here: the caller attaches the
    /// returned decision to the narration of the wrong answer.
    pub(crate) fn resolve_incorrect_locked(&self, state: &mut GameState, player: &str) -> Reactivation {
        state.timeouts().cancel(TimeoutKind::Answer);
        state.record_incorrect(player);
        state.clear_buzz();
        if state.try_apply(GameEvent::AnswerIncorrect).is_none() {
            debug!(phase = ?state.phase(), "wrong answer outside the answer window");
        }

        let daily_double = state
            .current_question()
            .is_some_and(|question| question.daily_double);
        if state.all_players_attempted() || daily_double {
            self.give_up_question_locked(state);
            return Reactivation::Dismissed;
        }
        Reactivation::Armed
    }

    /// Reveal the answer, dismiss the clue and hand the board back.
    fn give_up_question_locked(&self, state: &mut GameState) {
        if let Some(answer) = state.current_question().map(|q| q.answer.clone()) {
            self.say(&phrases::nobody_got_it(&answer));
        }
        self.dismiss_locked(state);
        if let Some(player) = self.prompt_selection_locked(state) {
            self.say(&phrases::your_pick(&player));
        }
    }

    /// Clear the current clue and move to selection, or to the final round when the board is spent.
    pub(crate) fn dismiss_locked(&self, state: &mut GameState) {
        let was_active = state.buzzer_active();
        let Some(question) = state.clear_question() else {
            return;
        };
        if was_active {
            broadcast_buzzer_status(self.bc(), false);
        }
        let event = if state.board_exhausted() {
            GameEvent::BoardExhausted
        } else {
            GameEvent::QuestionCleared
        };
        if let Err(err) = state.apply(event) {
            warn!(error = %err, "could not leave the question phase");
        }
        broadcast_question_dismiss(self.bc());
        info!(question = %question.id, phase = ?state.phase(), "question dismissed");
    }

    /// Ask the controller (or the leader) to pick. Returns who was asked.
    pub(crate) fn prompt_selection_locked(&self, state: &mut GameState) -> Option<String> {
        if state.phase() != GamePhase::AwaitingSelection {
            return None;
        }
        let player = state.controller_or_leader()?;
        state.set_control(&player);
        broadcast_select_question(self.bc(), &player);
        Some(player)
    }

    /// Queue the narration of a wrong answer, reopening the buzzer once it has played.
    pub(crate) fn narrate_incorrect_locked(
        &self,
        state: &mut GameState,
        line: &str,
        question: QuestionId,
        reactivation: Reactivation,
    ) {
        let binding = NarrationBinding {
            question: Some(question),
            reactivate_buzzer: reactivation == Reactivation::Armed,
        };
        let queued = self.narrator.enqueue(line, AudioKind::Incorrect, binding);
        if queued.is_none() && reactivation == Reactivation::Armed {
            self.reopen_after_incorrect_locked(state);
        }
    }

    async fn on_buzz_timeout(&self, token: TimerToken) -> Result<(), ServiceError> {
        let mut state = self.game.lock().await;
        if !state.timeouts().release(token) {
            debug!("stale buzz timeout");
            return Ok(());
        }
        if state.buzzed_player().is_some() {
            return Ok(());
        }
        let Some(answer) = state.current_question().map(|q| q.answer.clone()) else {
            return Ok(());
        };

        info!("nobody buzzed in time");
        let line = phrases::buzz_time_up(&answer);
        self.say(&line);
        self.narrator
            .enqueue(&line, AudioKind::Generic, NarrationBinding::default());
        self.dismiss_locked(&mut state);
        if let Some(player) = self.prompt_selection_locked(&mut state) {
            self.say(&phrases::your_pick(&player));
        }
        Ok(())
    }

    async fn on_answer_timeout(
        &self,
        token: TimerToken,
        player: String,
        cycle: u64,
    ) -> Result<(), ServiceError> {
        let mut state = self.game.lock().await;
        if !state.timeouts().release(token) {
            debug!(player, cycle, "stale answer timeout");
            return Ok(());
        }
        if !answer_window_is_current(&state, &player, cycle) {
            debug!(player, cycle, "answer timeout for a finished buzz");
            return Ok(());
        }
        let Some((question_id, value)) = state.current_question().map(|q| (q.id, q.value)) else {
            return Ok(());
        };

        info!(player, cycle, "answer window expired");
        let line = phrases::answer_time_up(&player);
        self.say(&line);
        broadcast_answer(self.bc(), &player, false, value);
        state.adjust_score(&player, -value);
        broadcast_player_list(self.bc(), state.players());

        let reactivation = self.resolve_incorrect_locked(&mut state, &player);
        self.narrate_incorrect_locked(&mut state, &line, question_id, reactivation);
        Ok(())
    }

    /// React to a narration clip having played.
    pub async fn on_narration_completed(&self, event: NarrationCompleted) {
        let mut state = self.game.lock().await;
        let current = state.current_question().map(|q| q.id);
        if event.question.is_none() || event.question != current {
            debug!(audio_id = %event.id, "narration completed for another clue");
            return;
        }

        match event.kind {
            AudioKind::Incorrect if event.should_reactivate_buzzer => {
                self.reopen_after_incorrect_locked(&mut state);
            }
            AudioKind::Question => {
                let daily_double = state
                    .current_question()
                    .is_some_and(|question| question.daily_double);
                if daily_double {
                    self.begin_daily_double_answer_locked(&mut state);
                } else if state.phase() == GamePhase::QuestionActive
                    && state.buzzed_player().is_none()
                {
                    self.activate_locked(&mut state);
                }
            }
            _ => {}
        }
    }

    fn reopen_after_incorrect_locked(&self, state: &mut GameState) {
        if state.all_players_attempted() {
            self.give_up_question_locked(state);
        } else if state.phase() == GamePhase::QuestionActive && state.buzzed_player().is_none() {
            self.activate_locked(state);
        }
    }

    /// Give the player who found a daily double a deadline for their wager.
    pub(crate) fn arm_wager_timeout_locked(&self, state: &mut GameState) {
        let this = self.this.clone();
        state.timeouts().arm(
            TimeoutKind::DailyDoubleWager,
            self.config.timings.daily_double_wager,
            move |token| async move {
                match this.upgrade() {
                    Some(arbiter) => arbiter.on_wager_timeout(token).await,
                    None => Ok(()),
                }
            },
        );
    }

    /// Fix the daily double wager and put the clue on screen. Returns false when no
    /// daily double is waiting for a wager.
    pub(crate) fn place_daily_double_wager_locked(
        &self,
        state: &mut GameState,
        player: &str,
        wager: i64,
        line: &str,
    ) -> bool {
        state.timeouts().cancel(TimeoutKind::DailyDoubleWager);
        let Some(question) = state.reveal_daily_double(wager).cloned() else {
            return false;
        };
        info!(player, wager, "daily double wager placed");
        self.say(line);
        broadcast_question_display(self.bc(), &question);
        true
    }

    async fn on_wager_timeout(&self, token: TimerToken) -> Result<(), ServiceError> {
        let mut state = self.game.lock().await;
        if !state.timeouts().release(token) {
            debug!("stale daily double wager timeout");
            return Ok(());
        }
        let waiting = state
            .current_question()
            .is_some_and(|q| q.daily_double && !q.revealed);
        let Some(player) = state.player_with_control().map(str::to_string) else {
            return Ok(());
        };
        if !waiting {
            return Ok(());
        }
        let wager = MIN_DAILY_DOUBLE_WAGER;
        let line = format!("Time's up, {player}. I'll put you down for ${wager}. Here is your clue.");
        self.place_daily_double_wager_locked(&mut state, &player, wager, &line);
        Ok(())
    }

    /// The player who found the daily double answers it without buzzing.
    fn begin_daily_double_answer_locked(&self, state: &mut GameState) {
        if state.phase() != GamePhase::QuestionActive || state.buzzed_player().is_some() {
            return;
        }
        let Some(player) = state.controller_or_leader() else {
            warn!("daily double with nobody to answer it");
            return;
        };
        state.timeouts().cancel(TimeoutKind::Buzz);
        let cycle = state.take_buzz(&player);
        if state.try_apply(GameEvent::BuzzAccepted).is_none() {
            warn!(phase = ?state.phase(), "could not open the daily double answer window");
        }
        self.arm_answer_timeout_locked(state, &player, cycle);
        info!(player, cycle, "daily double answer window open");
    }
}

/// Whether the answer window of `(player, cycle)` is still the live one.
fn answer_window_is_current(state: &GameState, player: &str, cycle: u64) -> bool {
    state.buzzed_player() == Some(player) && state.buzz_cycle() == cycle
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::test_support::{TestHost, settle};

    async fn question_on_screen(host: &TestHost, category: &str, value: i64) -> QuestionId {
        let mut state = host.game.lock().await;
        let question = state.select_question(category, value).unwrap().unwrap();
        state.apply(GameEvent::ClueSelected).unwrap();
        question.id
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_while_inactive_is_rejected_without_mutation() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        let before = host.game.latest();

        let result = host.arbiter().register_buzz("Ann").await;

        assert_eq!(result, Err(BuzzRejection::Inactive));
        assert_eq!(host.game.latest(), before);
        assert_eq!(host.fakes.broadcaster.count("buzzer"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_player_cannot_buzz() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        assert!(host.arbiter().activate().await);

        assert_eq!(
            host.arbiter().register_buzz("Mallory").await,
            Err(BuzzRejection::UnknownPlayer)
        );
        assert!(host.game.latest().buzzer_active);
    }

    #[tokio::test(start_paused = true)]
    async fn first_buzz_wins_and_closes_the_buzzer() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;

        assert_eq!(host.arbiter().register_buzz("Ann").await, Ok(1));
        assert_eq!(
            host.arbiter().register_buzz("Bob").await,
            Err(BuzzRejection::Inactive)
        );

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingAnswer);
        assert_eq!(snapshot.buzzed_player.as_deref(), Some("Ann"));
        assert!(!snapshot.buzzer_active);
        let timer = host.fakes.broadcaster.payloads("answer_timer_start");
        assert_eq!(timer[0]["player"], "Ann");
        assert_eq!(timer[0]["seconds"], 7);
    }

    #[tokio::test(start_paused = true)]
    async fn activation_needs_a_revealed_question() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        assert!(!host.arbiter().activate().await);
        question_on_screen(&host, "Science", 400).await;
        assert!(!host.arbiter().activate().await);
        assert_eq!(host.fakes.broadcaster.count("buzzer_status"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_window_check_tracks_player_and_cycle() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;
        let cycle = host.arbiter().register_buzz("Ann").await.unwrap();

        let state = host.game.lock().await;
        assert!(answer_window_is_current(&state, "Ann", cycle));
        assert!(!answer_window_is_current(&state, "Ann", cycle + 1));
        assert!(!answer_window_is_current(&state, "Bob", cycle));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_answer_silences_its_timeout() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;
        host.arbiter().register_buzz("Ann").await.unwrap();
        {
            let mut state = host.game.lock().await;
            host.arbiter().resolve_correct_locked(&mut state, "Ann");
        }

        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert_eq!(snapshot.players[0].score, 0);
        assert_eq!(host.fakes.broadcaster.count("answer"), 0);
        assert_eq!(snapshot.player_with_control.as_deref(), Some("Ann"));
    }

    #[tokio::test(start_paused = true)]
    async fn answer_timeout_deducts_and_arms_reactivation() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        host.start();
        let question = question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;
        host.arbiter().register_buzz("Ann").await.unwrap();

        tokio::time::sleep(Duration::from_secs(8)).await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::QuestionActive);
        assert_eq!(snapshot.players[0].score, -200);
        assert!(snapshot.incorrect_attempts.contains("Ann"));
        assert!(!snapshot.buzzer_active);
        assert_eq!(snapshot.question.as_ref().map(|q| q.id), Some(question));
        let answers = host.fakes.broadcaster.payloads("answer");
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0]["correct"], false);

        host.complete_audio().await;
        assert!(host.game.latest().buzzer_active);
        assert_eq!(
            host.arbiter().register_buzz("Ann").await,
            Err(BuzzRejection::AlreadyAttempted)
        );
        assert_eq!(host.arbiter().register_buzz("Bob").await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn all_players_incorrect_dismisses_without_reactivating() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        let question = question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;

        host.arbiter().register_buzz("Ann").await.unwrap();
        {
            let mut state = host.game.lock().await;
            let decision = host.arbiter().resolve_incorrect_locked(&mut state, "Ann");
            assert_eq!(decision, Reactivation::Armed);
        }
        host.arbiter().activate().await;
        host.arbiter().register_buzz("Bob").await.unwrap();
        {
            let mut state = host.game.lock().await;
            let decision = host.arbiter().resolve_incorrect_locked(&mut state, "Bob");
            assert_eq!(decision, Reactivation::Dismissed);
        }
        let opened = host.fakes.broadcaster.payloads("buzzer_status");

        host.arbiter()
            .on_narration_completed(NarrationCompleted {
                id: "incorrect_1_1".parse().unwrap(),
                kind: AudioKind::Incorrect,
                question: Some(question),
                should_reactivate_buzzer: true,
            })
            .await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert!(snapshot.question.is_none());
        assert!(!snapshot.buzzer_active);
        assert_eq!(host.fakes.broadcaster.payloads("buzzer_status"), opened);
        assert_eq!(host.fakes.broadcaster.count("question_dismiss"), 1);
        assert!(
            host.fakes
                .broadcaster
                .host_lines()
                .iter()
                .any(|line| line.contains("Nile"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_timeout_reveals_answer_and_returns_control() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert!(snapshot.question.is_none());
        assert!(!snapshot.buzzer_active);
        let lines = host.fakes.broadcaster.host_lines();
        assert!(lines.iter().any(|line| line.contains("Time's up") && line.contains("Nile")));
        let prompts = host.fakes.broadcaster.payloads("select_question");
        assert_eq!(prompts.last().unwrap()["contestant"], "Ann");
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_cancels_the_buzz_timeout() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        question_on_screen(&host, "Rivers", 200).await;
        host.arbiter().activate().await;
        assert!(host.arbiter().deactivate().await);
        assert!(!host.arbiter().deactivate().await);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(host.game.latest().phase, GamePhase::QuestionActive);
        assert_eq!(host.fakes.broadcaster.count("question_dismiss"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn daily_double_narration_hands_the_buzz_to_the_controller() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        let question = question_on_screen(&host, "Science", 400).await;
        host.game.lock().await.reveal_daily_double(1000);

        host.arbiter()
            .on_narration_completed(NarrationCompleted {
                id: "question_1_1".parse().unwrap(),
                kind: AudioKind::Question,
                question: Some(question),
                should_reactivate_buzzer: false,
            })
            .await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingAnswer);
        assert_eq!(snapshot.buzzed_player.as_deref(), Some("Ann"));
        assert!(!snapshot.buzzer_active);
    }
}
