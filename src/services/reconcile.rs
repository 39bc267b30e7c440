//! Snapshot diffing loop that fires one-shot side effects on state transitions.

use std::sync::Arc;

use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    collaborators::Broadcaster,
    config::AppConfig,
    services::{
        events::{broadcast_host_chat, broadcast_phase_changed},
        final_round::FinalRoundService,
        lobby::Lobby,
        narration::{AudioKind, AudioSequencer, NarrationBinding},
        phrases,
    },
    state::{
        GameStateSnapshot, SharedGame,
        game::{PlayerRecord, QuestionId},
        state_machine::GamePhase,
    },
};

/// What has already been done, so each effect fires once.
#[derive(Debug, Default)]
struct Markers {
    narrated_question: Option<QuestionId>,
    announced_cycle: u64,
    welcomed: bool,
    winner_announced: bool,
}

/// Watches snapshots and turns transitions into narration, announcements and phase work.
pub struct ReconciliationLoop {
    broadcaster: Arc<dyn Broadcaster>,
    narrator: Arc<AudioSequencer>,
    lobby: Arc<Lobby>,
    final_round: Arc<FinalRoundService>,
    config: Arc<AppConfig>,
    snapshots: watch::Receiver<GameStateSnapshot>,
    baseline: GameStateSnapshot,
    markers: Markers,
}

impl ReconciliationLoop {
    /// Subscribe to the game cell now; transitions after this call are diffed against
    /// the snapshot taken here, even if [`ReconciliationLoop::run`] is polled later.
    pub fn new(
        game: SharedGame,
        broadcaster: Arc<dyn Broadcaster>,
        narrator: Arc<AudioSequencer>,
        lobby: Arc<Lobby>,
        final_round: Arc<FinalRoundService>,
        config: Arc<AppConfig>,
    ) -> Self {
        let mut snapshots = game.subscribe();
        let baseline = snapshots.borrow_and_update().clone();
        Self {
            broadcaster,
            narrator,
            lobby,
            final_round,
            config,
            snapshots,
            baseline,
            markers: Markers::default(),
        }
    }

    /// Run until the game cell goes away. Wakes on every snapshot and on each tick.
    pub async fn run(mut self) {
        let mut previous = self.baseline.clone();
        let mut ticker = interval(self.config.timings.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("reconciliation loop started");

        loop {
            tokio::select! {
                changed = self.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }
            let current = self.snapshots.borrow_and_update().clone();
            self.reconcile(&previous, &current);
            previous = current;
        }
        info!("reconciliation loop stopped");
    }

    fn say(&self, line: &str) {
        broadcast_host_chat(self.broadcaster.as_ref(), &self.config.host_name, line);
        self.narrator
            .enqueue(line, AudioKind::Generic, NarrationBinding::default());
    }

    /// Fire the effects of moving from `previous` to `current`.
    pub fn reconcile(&mut self, previous: &GameStateSnapshot, current: &GameStateSnapshot) {
        if previous.phase != current.phase {
            self.on_phase_entered(current);
        }
        self.narrate_question(current);
        self.announce_buzz(current);

        if current.phase == GamePhase::CollectingPreferences
            && current
                .countdown_deadline
                .is_some_and(|deadline| deadline <= Instant::now())
        {
            let lobby = self.lobby.clone();
            tokio::spawn(async move {
                if let Err(err) = lobby.generate_board().await {
                    warn!(error = %err, "board generation failed");
                }
            });
        }
    }

    fn on_phase_entered(&mut self, current: &GameStateSnapshot) {
        info!(phase = ?current.phase, version = current.version, "phase changed");
        broadcast_phase_changed(self.broadcaster.as_ref(), current.phase, current.version);

        match current.phase {
            GamePhase::CollectingPreferences if !self.markers.welcomed => {
                self.markers.welcomed = true;
                let lobby = self.lobby.clone();
                tokio::spawn(async move { lobby.welcome().await });
            }
            GamePhase::Final => {
                let final_round = self.final_round.clone();
                tokio::spawn(async move { final_round.start().await });
            }
            GamePhase::GameOver if !self.markers.winner_announced => {
                self.markers.winner_announced = true;
                match leader(current) {
                    Some((name, score)) => self.say(&phrases::winner(name, score)),
                    None => self.say("That's the end of the game. Thanks for playing!"),
                }
            }
            _ => {}
        }
    }

    fn narrate_question(&mut self, current: &GameStateSnapshot) {
        let Some(question) = &current.question else {
            self.markers.narrated_question = None;
            return;
        };
        if !question.revealed || self.markers.narrated_question == Some(question.id) {
            return;
        }
        self.markers.narrated_question = Some(question.id);
        let queued = self.narrator.enqueue(
            &question.narration(),
            AudioKind::Question,
            NarrationBinding::question(question.id),
        );
        debug!(question = %question.id, audio_id = ?queued.map(|id| id.to_string()), "clue narration queued");
    }

    fn announce_buzz(&mut self, current: &GameStateSnapshot) {
        if current.buzz_cycle == self.markers.announced_cycle {
            return;
        }
        self.markers.announced_cycle = current.buzz_cycle;
        let daily_double = current.question.as_ref().is_some_and(|q| q.daily_double);
        if let Some(player) = current.buzzed_player.as_deref() {
            if !daily_double {
                self.say(&phrases::buzz_acknowledged(player));
            }
        }
    }
}

/// Highest score in the snapshot; ties go to the earliest registration.
fn leader(snapshot: &GameStateSnapshot) -> Option<(&str, i64)> {
    snapshot
        .players
        .iter()
        .fold(None, |best: Option<&PlayerRecord>, player| match best {
            Some(best) if best.score >= player.score => Some(best),
            _ => Some(player),
        })
        .map(|player| (player.name.as_str(), player.score))
}
