//! Player registration, preference collection and board bootstrap.

use std::{io, sync::Arc};

use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};
use validator::Validate;

use crate::{
    collaborators::{BoardGenerator, BoardStore, Broadcaster},
    config::AppConfig,
    dto::{epoch_millis, ws::RegisterPlayerRequest},
    error::{CollaboratorError, ServiceError},
    services::{
        events::{
            broadcast_error, broadcast_game_ready, broadcast_host_chat, broadcast_player_list,
            broadcast_reveal_category, broadcast_select_question,
        },
        chat::is_host,
        narration::{AudioKind, AudioSequencer, NarrationBinding},
        phrases,
    },
    state::{
        SharedGame,
        game::{Board, PreferenceMessage},
        state_machine::{GameEvent, GamePhase},
    },
};

/// Registration preferences must be longer than this many characters to count.
const MIN_PREFERENCE_CHARS: usize = 3;

/// Everything that happens before the first clue is picked.
pub struct Lobby {
    game: SharedGame,
    broadcaster: Arc<dyn Broadcaster>,
    generator: Arc<dyn BoardGenerator>,
    store: Arc<dyn BoardStore>,
    narrator: Arc<AudioSequencer>,
    config: Arc<AppConfig>,
}

impl Lobby {
    /// Build the lobby over `game`, using `generator` for fresh boards and `store`
    /// for saved and fallback ones.
    pub fn new(
        game: SharedGame,
        broadcaster: Arc<dyn Broadcaster>,
        generator: Arc<dyn BoardGenerator>,
        store: Arc<dyn BoardStore>,
        narrator: Arc<AudioSequencer>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            game,
            broadcaster,
            generator,
            store,
            narrator,
            config,
        }
    }

    fn bc(&self) -> &dyn Broadcaster {
        self.broadcaster.as_ref()
    }

    fn announce(&self, line: &str) {
        broadcast_host_chat(self.bc(), &self.config.host_name, line);
        self.narrator
            .enqueue(line, AudioKind::Generic, NarrationBinding::default());
    }

    /// Register a player. Returns the roster size.
    ///
    /// Reaching the player quota while in the lobby starts the preference countdown.
    pub async fn register_player(&self, request: &RegisterPlayerRequest) -> Result<usize, ServiceError> {
        request
            .validate()
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;
        let name = request.name.trim();
        if is_host(&self.config.host_name, name) {
            return Err(ServiceError::InvalidInput(format!(
                "{name} is the host's name"
            )));
        }

        let mut state = self.game.lock().await;
        if !state.phase().accepts_registration() {
            return Err(ServiceError::InvalidState(
                "registration is closed for this game".into(),
            ));
        }
        let count = state.add_player(name)?;
        if let Some(preference) = request
            .preferences
            .as_deref()
            .map(str::trim)
            .filter(|text| text.chars().count() > MIN_PREFERENCE_CHARS)
        {
            state.push_preference(PreferenceMessage {
                username: name.to_string(),
                message: preference.to_string(),
            });
        }
        broadcast_player_list(self.bc(), state.players());
        info!(player = name, count, quota = self.config.player_quota, "player registered");

        if count == self.config.player_quota && state.phase() == GamePhase::Lobby {
            state.apply(GameEvent::QuotaReached)?;
            state.set_countdown(Some(
                Instant::now() + self.config.timings.preference_countdown,
            ));
            broadcast_game_ready(self.bc());
            info!("player quota reached; collecting preferences");
        }
        Ok(count)
    }

    /// Greet the players once the quota is reached.
    pub async fn welcome(&self) {
        let names: Vec<String> = {
            let state = self.game.lock().await;
            state.players().map(|player| player.name.clone()).collect()
        };
        self.announce(&phrases::welcome(&self.config.host_name, &names));
    }

    /// Build the board once the preference countdown has elapsed.
    ///
    /// The generator gets the collected preferences; when it fails the fallback board
    /// is loaded. When both fail the countdown restarts.
    pub async fn generate_board(&self) -> Result<(), ServiceError> {
        let (preferences, contestants) = {
            let mut state = self.game.lock().await;
            if state.phase() != GamePhase::CollectingPreferences {
                return Ok(());
            }
            if state
                .countdown_deadline()
                .is_none_or(|deadline| deadline > Instant::now())
            {
                return Ok(());
            }
            state.apply(GameEvent::CountdownElapsed)?;
            state.set_countdown(None);
            let preferences: Vec<PreferenceMessage> = state.preferences().cloned().collect();
            let contestants = state.players().cloned().collect::<Vec<_>>();
            (preferences, contestants)
        };
        info!(preferences = preferences.len(), "generating board");

        let (name, mut board) = match self.generator.generate(&preferences).await {
            Ok(board) => {
                let name = format!("game_{}", epoch_millis());
                let mut stored = board.clone();
                stored.contestants = contestants.clone();
                if let Err(err) = self.store.save(&name, stored).await {
                    warn!(board = name, error = %err, "could not save generated board");
                }
                (name, board)
            }
            Err(err) => {
                warn!(error = %err, fallback = %self.config.fallback_board, "board generation failed; loading fallback");
                match self.store.load(&self.config.fallback_board).await {
                    Ok(board) => (self.config.fallback_board.clone(), board),
                    Err(load_err) => {
                        error!(error = %load_err, "fallback board unavailable");
                        self.restart_countdown().await;
                        return Err(ServiceError::Fatal(format!(
                            "no board available: {load_err}"
                        )));
                    }
                }
            }
        };
        board.contestants = contestants;

        self.reveal_categories(&board).await;

        let mut state = self.game.lock().await;
        if state.phase() != GamePhase::GeneratingBoard {
            warn!(phase = ?state.phase(), "phase moved on while the board was built");
            return Ok(());
        }
        let Some(first) = state.first_player() else {
            return Err(ServiceError::InvalidState("no players to start with".into()));
        };
        info!(board = name, controller = first, "board ready");
        state.install_board(name, board);
        state.set_control(&first);
        state.apply(GameEvent::BoardReady)?;
        broadcast_select_question(self.bc(), &first);
        self.announce(&format!("The board is ready! {}", phrases::your_pick(&first)));
        Ok(())
    }

    /// Names of the boards an operator can load.
    pub async fn available_boards(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.list().await?)
    }

    /// Play the stored board `name` instead of the current or generated one.
    ///
    /// While preferences are collected this skips generation and the first player
    /// picks. Between clues the board is swapped and control stays where it is.
    pub async fn load_board(&self, name: &str) -> Result<(), ServiceError> {
        let mut board = self.store.load(name).await.map_err(|err| match err {
            CollaboratorError::Io(source) if source.kind() == io::ErrorKind::NotFound => {
                ServiceError::NotFound(format!("no board named {name}"))
            }
            CollaboratorError::Io(source) if source.kind() == io::ErrorKind::InvalidInput => {
                ServiceError::InvalidInput(source.to_string())
            }
            other => other.into(),
        })?;

        let mut state = self.game.lock().await;
        let controller = match state.phase() {
            GamePhase::CollectingPreferences => {
                let first = state
                    .first_player()
                    .ok_or_else(|| ServiceError::InvalidState("no players to start with".into()))?;
                state.apply(GameEvent::CountdownElapsed)?;
                state.set_countdown(None);
                state.set_control(&first);
                state.apply(GameEvent::BoardReady)?;
                first
            }
            GamePhase::AwaitingSelection => state
                .controller_or_leader()
                .ok_or_else(|| ServiceError::InvalidState("no players to pick a clue".into()))?,
            phase => {
                return Err(ServiceError::InvalidState(format!(
                    "a board cannot be loaded in the {phase:?} phase"
                )));
            }
        };
        board.contestants = state.players().cloned().collect();
        for (index, category) in board.categories.iter().enumerate() {
            broadcast_reveal_category(self.bc(), index, &category.name);
        }
        info!(board = name, controller, "stored board loaded");
        state.install_board(name, board);
        broadcast_select_question(self.bc(), &controller);
        drop(state);

        self.announce(&format!("New board! {}", phrases::your_pick(&controller)));
        Ok(())
    }

    async fn restart_countdown(&self) {
        let mut state = self.game.lock().await;
        if state.try_apply(GameEvent::BoardFailed).is_some() {
            state.set_countdown(Some(
                Instant::now() + self.config.timings.preference_countdown,
            ));
        }
        broadcast_error(
            self.bc(),
            "I couldn't prepare a board. Trying again in a moment.",
        );
    }

    async fn reveal_categories(&self, board: &Board) {
        for (index, category) in board.categories.iter().enumerate() {
            if index > 0 {
                sleep(self.config.timings.category_reveal).await;
            }
            broadcast_reveal_category(self.bc(), index, &category.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        collaborators::testing::{FakeGenerator, Fakes, sample_board},
        services::test_support::TestHost,
    };

    fn request(name: &str, preferences: Option<&str>) -> RegisterPlayerRequest {
        RegisterPlayerRequest {
            name: name.into(),
            preferences: preferences.map(str::to_string),
        }
    }

    async fn fill_lobby(host: &TestHost) {
        for (name, preference) in [("Ann", "rivers"), ("Bob", "ok"), ("Cy", "space travel")] {
            host.facade
                .register_player(&request(name, Some(preference)))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn quota_is_reached_on_third_registration_only() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        let lobby = host.facade.lobby();

        assert_eq!(lobby.register_player(&request("Ann", None)).await.unwrap(), 1);
        assert_eq!(lobby.register_player(&request("Bob", None)).await.unwrap(), 2);
        assert_eq!(host.game.latest().phase, GamePhase::Lobby);
        assert_eq!(host.fakes.broadcaster.count("game_ready"), 0);

        assert_eq!(lobby.register_player(&request("Cy", None)).await.unwrap(), 3);
        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::CollectingPreferences);
        assert!(snapshot.countdown_deadline.is_some());
        assert_eq!(host.fakes.broadcaster.count("game_ready"), 1);

        assert_eq!(lobby.register_player(&request("Dee", None)).await.unwrap(), 4);
        assert_eq!(host.fakes.broadcaster.count("game_ready"), 1);
        assert_eq!(host.fakes.broadcaster.count("player_list"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_registrations_are_rejected() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        let lobby = host.facade.lobby();
        lobby.register_player(&request("Ann", None)).await.unwrap();

        assert!(matches!(
            lobby.register_player(&request("Ann", None)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            lobby.register_player(&request("   ", None)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            lobby.register_player(&request(" alex ", None)).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(lobby.register_player(&request("Alexis", None)).await.unwrap(), 2);
        assert_eq!(host.game.latest().players.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn registration_closes_once_the_board_is_up() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        assert!(matches!(
            host.facade.lobby().register_player(&request("Cy", None)).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn board_waits_for_the_countdown() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        fill_lobby(&host).await;

        host.facade.lobby().generate_board().await.unwrap();
        assert_eq!(host.game.latest().phase, GamePhase::CollectingPreferences);
    }

    #[tokio::test(start_paused = true)]
    async fn generated_board_gets_revealed_and_first_player_picks() {
        let fakes = Fakes::with_generator(FakeGenerator::returning(sample_board()));
        let host = TestHost::in_lobby(fakes, AppConfig::default());
        fill_lobby(&host).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        host.facade.lobby().generate_board().await.unwrap();

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert_eq!(snapshot.player_with_control.as_deref(), Some("Ann"));
        let requests = host.fakes.generator.requests();
        let topics: Vec<&str> = requests[0].iter().map(|p| p.message.as_str()).collect();
        assert_eq!(topics, vec!["rivers", "space travel"]);
        let reveals = host.fakes.broadcaster.payloads("reveal_category");
        assert_eq!(reveals.len(), 2);
        assert_eq!(reveals[1]["index"], 1);
        assert_eq!(reveals[1]["category"], "Science");
        assert_eq!(host.fakes.broadcaster.payloads("select_question")[0]["contestant"], "Ann");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generation_falls_back_to_stored_board() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        fill_lobby(&host).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        host.facade.lobby().generate_board().await.unwrap();

        let state = host.game.lock().await;
        assert_eq!(state.phase(), GamePhase::AwaitingSelection);
        assert_eq!(state.board_name(), Some("default"));
        assert_eq!(state.board().unwrap().contestants.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_board_skips_generation() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        fill_lobby(&host).await;
        let lobby = host.facade.lobby();

        assert_eq!(lobby.available_boards().await.unwrap(), vec!["default"]);
        lobby.load_board("default").await.unwrap();

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert!(snapshot.countdown_deadline.is_none());
        assert_eq!(snapshot.player_with_control.as_deref(), Some("Ann"));
        assert_eq!(host.fakes.broadcaster.count("reveal_category"), 2);
        assert!(host.fakes.generator.requests().is_empty());

        // the countdown that was pending no longer builds a board
        tokio::time::sleep(Duration::from_secs(10)).await;
        lobby.generate_board().await.unwrap();
        assert_eq!(host.game.lock().await.board_name(), Some("default"));
    }

    #[tokio::test(start_paused = true)]
    async fn board_swap_keeps_control_between_clues() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        host.game.lock().await.set_control("Bob");
        host.fakes.store.save("second", sample_board()).await.unwrap();

        host.facade.lobby().load_board("second").await.unwrap();

        let state = host.game.lock().await;
        assert_eq!(state.board_name(), Some("second"));
        assert_eq!(state.board().unwrap().contestants.len(), 2);
        assert_eq!(state.player_with_control(), Some("Bob"));
        assert_eq!(host.fakes.broadcaster.payloads("select_question").last().unwrap()["contestant"], "Bob");
    }

    #[tokio::test(start_paused = true)]
    async fn loading_is_refused_mid_clue_or_for_unknown_boards() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        let lobby = host.facade.lobby();
        assert!(matches!(
            lobby.load_board("missing").await,
            Err(ServiceError::NotFound(_))
        ));

        host.chat().handle("Ann", "Rivers for 200").await.unwrap();
        assert!(matches!(
            lobby.load_board("default").await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(host.game.latest().phase, GamePhase::QuestionActive);
    }

    #[tokio::test(start_paused = true)]
    async fn no_board_at_all_restarts_the_countdown() {
        let config = AppConfig {
            fallback_board: "missing".into(),
            ..AppConfig::default()
        };
        let host = TestHost::in_lobby(Fakes::new(), config);
        fill_lobby(&host).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        let result = host.facade.lobby().generate_board().await;

        assert!(matches!(result, Err(ServiceError::Fatal(_))));
        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::CollectingPreferences);
        assert!(snapshot.countdown_deadline.is_some());
        assert_eq!(host.fakes.broadcaster.count("error"), 1);
    }
}
