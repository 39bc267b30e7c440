mod app;
/// Board, question and player records.
pub mod game;
/// Event fan-out to connected clients.
pub mod hub;
/// Gameplay phases and transitions.
pub mod state_machine;
/// Supervised timers.
pub mod timeout;

use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    ops::{Deref, DerefMut},
    sync::Arc,
};

use indexmap::IndexMap;
use tokio::{
    sync::{Mutex, MutexGuard, watch},
    time::Instant,
};

use crate::{
    error::ServiceError,
    state::{
        game::{Board, FinalRound, FinalStage, PlayerRecord, PreferenceMessage, Question},
        state_machine::{GameEvent, GamePhase, GameStateMachine, InvalidTransition},
        timeout::TimeoutSlots,
    },
};

pub use self::{
    app::{AppState, SharedState},
    hub::{ClientId, EventHub},
};

/// Preference messages kept for board generation.
pub const MAX_PREFERENCES: usize = 20;

/// Shared handle on the single authoritative game state.
pub type SharedGame = Arc<GameCell>;

/// Immutable copy of the game state published after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct GameStateSnapshot {
    /// Gameplay phase.
    pub phase: GamePhase,
    /// Incremented on every phase transition.
    pub version: u64,
    /// Clue on screen.
    pub question: Option<Question>,
    /// Player holding the buzz.
    pub buzzed_player: Option<String>,
    /// Players who already missed this clue.
    pub incorrect_attempts: BTreeSet<String>,
    /// Player who picks next.
    pub player_with_control: Option<String>,
    /// Whether the buzzer is open.
    pub buzzer_active: bool,
    /// Incremented on every accepted buzz.
    pub buzz_cycle: u64,
    /// Roster in registration order.
    pub players: Vec<PlayerRecord>,
    /// Board preferences collected so far.
    pub preference_count: usize,
    /// When board generation may start.
    pub countdown_deadline: Option<Instant>,
    /// Final round stage, once it started.
    pub final_stage: Option<FinalStage>,
}

impl GameStateSnapshot {
    /// Whether `other` shows a different question on screen.
    pub fn question_changed(&self, other: &Self) -> bool {
        self.question.as_ref().map(|q| q.id) != other.question.as_ref().map(|q| q.id)
    }
}

/// Game data guarded by [`GameCell`]. Methods keep the cross-field invariants:
/// a held buzz implies a closed buzzer, and clearing the question resets every
/// per-question field and timer.
#[derive(Debug, Default)]
pub struct GameState {
    machine: GameStateMachine,
    players: IndexMap<String, PlayerRecord>,
    board: Option<Board>,
    board_name: Option<String>,
    current_question: Option<Question>,
    buzzed_player: Option<String>,
    incorrect_attempts: HashSet<String>,
    player_with_control: Option<String>,
    buzzer_active: bool,
    buzz_cycle: u64,
    preferences: VecDeque<PreferenceMessage>,
    countdown_deadline: Option<Instant>,
    final_round: Option<FinalRound>,
    timeouts: TimeoutSlots,
}

impl GameState {
    /// Fresh lobby state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> GamePhase {
        self.machine.phase()
    }

    /// Apply a phase transition.
    pub fn apply(&mut self, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
        self.machine.apply(event)
    }

    /// Apply `event` only when valid from the current phase.
    pub fn try_apply(&mut self, event: GameEvent) -> Option<GamePhase> {
        self.machine.apply(event).ok()
    }

    // players

    /// Registered players in registration order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    /// Number of registered players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Whether `name` is registered (exact match).
    pub fn has_player(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Register a player, returning the roster size.
    pub fn add_player(&mut self, name: &str) -> Result<usize, ServiceError> {
        if self.players.contains_key(name) {
            return Err(ServiceError::InvalidInput(format!(
                "player `{name}` is already registered"
            )));
        }
        self.players
            .insert(name.to_string(), PlayerRecord::new(name));
        Ok(self.players.len())
    }

    /// Current score of `name`.
    pub fn score(&self, name: &str) -> Option<i64> {
        self.players.get(name).map(|player| player.score)
    }

    /// Add `delta` to a player's score, returning the new score.
    pub fn adjust_score(&mut self, name: &str, delta: i64) -> Option<i64> {
        let player = self.players.get_mut(name)?;
        player.score += delta;
        Some(player.score)
    }

    /// Player with the highest score; ties go to the earliest registration.
    pub fn highest_scorer(&self) -> Option<String> {
        self.players
            .values()
            .fold(None::<&PlayerRecord>, |best, player| match best {
                Some(best) if best.score >= player.score => Some(best),
                _ => Some(player),
            })
            .map(|player| player.name.clone())
    }

    /// First registered player.
    pub fn first_player(&self) -> Option<String> {
        self.players.keys().next().cloned()
    }

    // board

    /// Installed board, if any.
    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    /// Name the installed board is stored under.
    pub fn board_name(&self) -> Option<&str> {
        self.board_name.as_deref()
    }

    /// Install a board for play.
    pub fn install_board(&mut self, name: impl Into<String>, board: Board) {
        self.board_name = Some(name.into());
        self.board = Some(board);
    }

    /// Whether the installed board has no unused clue left.
    pub fn board_exhausted(&self) -> bool {
        self.board.as_ref().is_none_or(Board::exhausted)
    }

    /// Select an unused clue and make it the current question.
    ///
    /// Fails with [`ServiceError::Fatal`] when no board is installed.
    pub fn select_question(
        &mut self,
        category: &str,
        value: i64,
    ) -> Result<Option<Question>, ServiceError> {
        let board = self
            .board
            .as_mut()
            .ok_or_else(|| ServiceError::Fatal("no board is loaded".into()))?;
        let Some((category_index, question_index)) = board.find_unused(category, value) else {
            return Ok(None);
        };
        let question = board.take(category_index, question_index);
        if let Some(question) = &question {
            self.set_question(question.clone());
        }
        Ok(question)
    }

    // question

    /// Clue currently on screen.
    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    /// Make `question` current, resetting every per-question field.
    pub fn set_question(&mut self, question: Question) {
        self.reset_question_fields();
        self.current_question = Some(question);
    }

    /// Reveal a daily double with its wagered value.
    pub fn reveal_daily_double(&mut self, wager: i64) -> Option<&Question> {
        let question = self.current_question.as_mut()?;
        question.value = wager;
        question.revealed = true;
        Some(question)
    }

    /// Remove the current question, clearing the buzz, incorrect attempts, buzzer and timers.
    pub fn clear_question(&mut self) -> Option<Question> {
        self.reset_question_fields();
        self.current_question.take()
    }

    fn reset_question_fields(&mut self) {
        self.buzzed_player = None;
        self.incorrect_attempts.clear();
        self.buzzer_active = false;
        self.timeouts.cancel_question_timers();
    }

    // buzzer

    /// Whether the buzzer is open.
    pub fn buzzer_active(&self) -> bool {
        self.buzzer_active
    }

    /// Open or close the buzzer. Opening is refused while a player holds the buzz
    /// or no revealed question is on screen; returns the resulting state.
    pub fn set_buzzer_active(&mut self, active: bool) -> bool {
        if active {
            let revealed = self.current_question.as_ref().is_some_and(|q| q.revealed);
            if self.buzzed_player.is_some() || !revealed {
                return self.buzzer_active;
            }
        }
        self.buzzer_active = active;
        self.buzzer_active
    }

    /// Player holding the buzz.
    pub fn buzzed_player(&self) -> Option<&str> {
        self.buzzed_player.as_deref()
    }

    /// Give the buzz to `player`, closing the buzzer. Returns the new buzz cycle.
    pub fn take_buzz(&mut self, player: &str) -> u64 {
        self.buzzer_active = false;
        self.buzzed_player = Some(player.to_string());
        self.buzz_cycle += 1;
        self.buzz_cycle
    }

    /// Release the buzz without touching incorrect attempts.
    pub fn clear_buzz(&mut self) -> Option<String> {
        self.buzzed_player.take()
    }

    /// Counter bumped on every accepted buzz.
    pub fn buzz_cycle(&self) -> u64 {
        self.buzz_cycle
    }

    /// Remember that `player` answered the current question wrong.
    pub fn record_incorrect(&mut self, player: &str) {
        self.incorrect_attempts.insert(player.to_string());
    }

    /// Whether `player` already answered the current question wrong.
    pub fn has_attempted(&self, player: &str) -> bool {
        self.incorrect_attempts.contains(player)
    }

    /// Whether every registered player answered the current question wrong.
    pub fn all_players_attempted(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .keys()
                .all(|name| self.incorrect_attempts.contains(name))
    }

    // control

    /// Player allowed to pick the next clue.
    pub fn player_with_control(&self) -> Option<&str> {
        self.player_with_control.as_deref()
    }

    /// Hand control to `player`.
    pub fn set_control(&mut self, player: &str) {
        self.player_with_control = Some(player.to_string());
    }

    /// Current controller, or the highest scorer when nobody has control.
    pub fn controller_or_leader(&self) -> Option<String> {
        self.player_with_control
            .clone()
            .or_else(|| self.highest_scorer())
    }

    // lobby

    /// Keep a preference message, dropping the oldest beyond [`MAX_PREFERENCES`].
    pub fn push_preference(&mut self, preference: PreferenceMessage) {
        if self.preferences.len() == MAX_PREFERENCES {
            self.preferences.pop_front();
        }
        self.preferences.push_back(preference);
    }

    /// Collected preferences, oldest first.
    pub fn preferences(&self) -> impl Iterator<Item = &PreferenceMessage> {
        self.preferences.iter()
    }

    /// Deadline of the preference countdown.
    pub fn countdown_deadline(&self) -> Option<Instant> {
        self.countdown_deadline
    }

    /// Start or clear the preference countdown.
    pub fn set_countdown(&mut self, deadline: Option<Instant>) {
        self.countdown_deadline = deadline;
    }

    // final round

    /// Final round in progress.
    pub fn final_round(&self) -> Option<&FinalRound> {
        self.final_round.as_ref()
    }

    /// Mutable access to the final round.
    pub fn final_round_mut(&mut self) -> Option<&mut FinalRound> {
        self.final_round.as_mut()
    }

    /// Begin the final round.
    pub fn start_final_round(&mut self, round: FinalRound) {
        self.final_round = Some(round);
    }

    /// Timer slots.
    pub fn timeouts(&mut self) -> &mut TimeoutSlots {
        &mut self.timeouts
    }

    /// Capture an immutable view.
    pub fn snapshot(&self) -> GameStateSnapshot {
        GameStateSnapshot {
            phase: self.machine.phase(),
            version: self.machine.version(),
            question: self.current_question.clone(),
            buzzed_player: self.buzzed_player.clone(),
            incorrect_attempts: self.incorrect_attempts.iter().cloned().collect(),
            player_with_control: self.player_with_control.clone(),
            buzzer_active: self.buzzer_active,
            buzz_cycle: self.buzz_cycle,
            players: self.players.values().cloned().collect(),
            preference_count: self.preferences.len(),
            countdown_deadline: self.countdown_deadline,
            final_stage: self.final_round.as_ref().map(|round| round.stage),
        }
    }
}

/// Owner of the [`GameState`]: an async mutex serialising mutations plus a watch
/// channel republishing the snapshot whenever a lock is released.
pub struct GameCell {
    state: Mutex<GameState>,
    publisher: watch::Sender<GameStateSnapshot>,
}

impl GameCell {
    /// Wrap a fresh lobby state.
    pub fn new() -> SharedGame {
        Self::with_state(GameState::new())
    }

    /// Wrap an existing state.
    pub fn with_state(state: GameState) -> SharedGame {
        let (publisher, _receiver) = watch::channel(state.snapshot());
        Arc::new(Self {
            state: Mutex::new(state),
            publisher,
        })
    }

    /// Acquire exclusive access. The snapshot is republished when the guard drops.
    pub async fn lock(&self) -> GameGuard<'_> {
        GameGuard {
            guard: self.state.lock().await,
            publisher: &self.publisher,
        }
    }

    /// Receive snapshots as they change.
    pub fn subscribe(&self) -> watch::Receiver<GameStateSnapshot> {
        self.publisher.subscribe()
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> GameStateSnapshot {
        self.publisher.borrow().clone()
    }
}

/// Lock guard publishing a new snapshot on drop if anything changed.
pub struct GameGuard<'a> {
    guard: MutexGuard<'a, GameState>,
    publisher: &'a watch::Sender<GameStateSnapshot>,
}

impl Deref for GameGuard<'_> {
    type Target = GameState;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for GameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for GameGuard<'_> {
    fn drop(&mut self) {
        let next = self.guard.snapshot();
        self.publisher.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
