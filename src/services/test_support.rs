//! Host fixtures shared by the service tests.

use std::{collections::HashSet, sync::Arc, time::Duration};

use crate::{
    collaborators::testing::{Fakes, sample_board},
    config::AppConfig,
    services::{buzzer::BuzzerArbiter, chat::ChatRouter, host::HostFacade},
    state::{GameStateSnapshot, SharedGame, state_machine::GameEvent},
};

/// Let spawned tasks run. Under a paused clock this also advances time a little.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// A host wired to in-memory fakes.
pub struct TestHost {
    pub facade: Arc<HostFacade>,
    pub fakes: Fakes,
    pub game: SharedGame,
}

impl TestHost {
    /// Fresh game in the lobby; nothing is running yet.
    pub fn in_lobby(fakes: Fakes, config: AppConfig) -> Self {
        let facade = HostFacade::new(Arc::new(config), fakes.collaborators());
        let game = facade.game().clone();
        Self { facade, fakes, game }
    }

    /// Game with `players` registered, the sample board installed and the first player
    /// picking. Nothing is running yet.
    pub async fn at_selection(players: &[&str]) -> Self {
        let host = Self::in_lobby(Fakes::new(), AppConfig::default());
        {
            let mut state = host.game.lock().await;
            for player in players {
                state.add_player(player).unwrap();
            }
            state.apply(GameEvent::QuotaReached).unwrap();
            state.apply(GameEvent::CountdownElapsed).unwrap();
            state.install_board("default", sample_board());
            state.apply(GameEvent::BoardReady).unwrap();
            state.set_control(players[0]);
        }
        host
    }

    pub fn start(&self) {
        self.facade.start();
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        self.facade.snapshot()
    }

    pub fn arbiter(&self) -> &Arc<BuzzerArbiter> {
        self.facade.arbiter()
    }

    pub fn chat(&self) -> &ChatRouter {
        self.facade.chat()
    }

    /// Report every narration clip the displays were asked to play, repeating until
    /// the queue stops producing new clips.
    pub async fn complete_audio(&self) {
        let mut reported = HashSet::new();
        for _ in 0..10 {
            settle().await;
            let fresh: Vec<String> = self
                .fakes
                .broadcaster
                .payloads("play_audio")
                .iter()
                .filter_map(|payload| payload["audioId"].as_str().map(str::to_string))
                .filter(|id| !reported.contains(id))
                .collect();
            if fresh.is_empty() {
                break;
            }
            for id in fresh {
                self.facade.audio_completed(&id);
                reported.insert(id);
            }
        }
        settle().await;
    }
}
