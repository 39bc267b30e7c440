//! Entry point for every external event: wires the host components and runs their loops.

use std::sync::{Arc, Mutex};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    collaborators::Collaborators,
    config::AppConfig,
    dto::{board::NarrationStatus, ws::RegisterPlayerRequest},
    error::ServiceError,
    services::{
        buzzer::{BuzzRejection, BuzzerArbiter},
        chat::{ChatIntent, ChatRouter},
        final_round::FinalRoundService,
        lobby::Lobby,
        narration::{AudioSequencer, NarrationCompleted},
        reconcile::ReconciliationLoop,
    },
    state::{GameCell, GameStateSnapshot, SharedGame},
};

/// Owns one hosted game.
pub struct HostFacade {
    game: SharedGame,
    config: Arc<AppConfig>,
    collaborators: Collaborators,
    narrator: Arc<AudioSequencer>,
    arbiter: Arc<BuzzerArbiter>,
    chat: ChatRouter,
    lobby: Arc<Lobby>,
    final_round: Arc<FinalRoundService>,
    completions: Mutex<Option<mpsc::UnboundedReceiver<NarrationCompleted>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HostFacade {
    /// Build a host for a fresh game in the lobby. Nothing runs until [`HostFacade::start`].
    pub fn new(config: Arc<AppConfig>, collaborators: Collaborators) -> Arc<Self> {
        let game = GameCell::new();
        let broadcaster = collaborators.broadcaster.clone();
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let narrator = AudioSequencer::new(
            collaborators.speech.clone(),
            broadcaster.clone(),
            config.voice.clone(),
            config.timings.clone(),
            completed_tx,
        );
        let arbiter = BuzzerArbiter::new(
            game.clone(),
            broadcaster.clone(),
            narrator.clone(),
            config.clone(),
        );
        let final_round = FinalRoundService::new(
            game.clone(),
            broadcaster.clone(),
            collaborators.judge.clone(),
            narrator.clone(),
            config.clone(),
        );
        let lobby = Arc::new(Lobby::new(
            game.clone(),
            broadcaster.clone(),
            collaborators.generator.clone(),
            collaborators.store.clone(),
            narrator.clone(),
            config.clone(),
        ));
        let chat = ChatRouter::new(
            game.clone(),
            broadcaster,
            collaborators.judge.clone(),
            collaborators.resolver.clone(),
            narrator.clone(),
            arbiter.clone(),
            final_round.clone(),
            config.clone(),
        );

        Arc::new(Self {
            game,
            config,
            collaborators,
            narrator,
            arbiter,
            chat,
            lobby,
            final_round,
            completions: Mutex::new(Some(completed_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the narration consumer, the narration event consumer and the reconciliation loop.
    /// A host starts once; later calls are ignored.
    pub fn start(&self) {
        let Ok(mut tasks) = self.tasks.lock() else {
            warn!("host task list poisoned; not starting");
            return;
        };
        let Some(mut completions) = self.completions.lock().ok().and_then(|mut slot| slot.take())
        else {
            warn!("host already started");
            return;
        };

        tasks.push(tokio::spawn(self.narrator.clone().run()));

        let arbiter = self.arbiter.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = completions.recv().await {
                arbiter.on_narration_completed(event).await;
            }
        }));

        tasks.push(tokio::spawn(self.reconciler().run()));
        info!(
            host = %self.config.host_name,
            quota = self.config.player_quota,
            "host started"
        );
    }

    /// Abort the background tasks.
    pub fn stop(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    /// Whether every background task is alive.
    pub fn is_running(&self) -> bool {
        self.tasks
            .lock()
            .map(|tasks| !tasks.is_empty() && tasks.iter().all(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    /// Register a player from the lobby.
    pub async fn register_player(&self, request: &RegisterPlayerRequest) -> Result<usize, ServiceError> {
        self.lobby.register_player(request).await
    }

    /// A player pressed the buzzer.
    pub async fn handle_buzz(&self, player: &str) -> Result<u64, BuzzRejection> {
        self.arbiter.register_buzz(player).await
    }

    /// A chat line arrived.
    pub async fn handle_chat(&self, username: &str, message: &str) -> Result<ChatIntent, ServiceError> {
        self.chat.handle(username, message).await
    }

    /// A display finished playing a narration clip.
    pub fn audio_completed(&self, audio_id: &str) -> bool {
        self.narrator.on_completion(audio_id)
    }

    /// Latest published game state.
    pub fn snapshot(&self) -> GameStateSnapshot {
        self.game.latest()
    }

    /// The game cell.
    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    /// Names of the stored boards.
    pub async fn available_boards(&self) -> Result<Vec<String>, ServiceError> {
        self.lobby.available_boards().await
    }

    /// Switch to the stored board `name`.
    pub async fn load_board(&self, name: &str) -> Result<(), ServiceError> {
        self.lobby.load_board(name).await
    }

    /// What the narration queue is doing right now.
    pub fn narration_status(&self) -> NarrationStatus {
        let (question, incorrect) = self.narrator.current_ids();
        NarrationStatus {
            busy: self.narrator.is_busy(),
            in_flight: self.narrator.in_flight().map(|id| id.to_string()),
            question_audio_id: question.map(|id| id.to_string()),
            incorrect_audio_id: incorrect.map(|id| id.to_string()),
        }
    }

    pub(crate) fn arbiter(&self) -> &Arc<BuzzerArbiter> {
        &self.arbiter
    }

    pub(crate) fn chat(&self) -> &ChatRouter {
        &self.chat
    }

    pub(crate) fn lobby(&self) -> &Arc<Lobby> {
        &self.lobby
    }

    pub(crate) fn final_round(&self) -> &Arc<FinalRoundService> {
        &self.final_round
    }

    pub(crate) fn narrator(&self) -> &Arc<AudioSequencer> {
        &self.narrator
    }

    /// A reconciliation loop over this host's components, starting from clean markers.
    pub(crate) fn reconciler(&self) -> ReconciliationLoop {
        ReconciliationLoop::new(
            self.game.clone(),
            self.collaborators.broadcaster.clone(),
            self.narrator.clone(),
            self.lobby.clone(),
            self.final_round.clone(),
            self.config.clone(),
        )
    }
}

impl Drop for HostFacade {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        collaborators::testing::Fakes,
        services::test_support::{TestHost, settle},
        state::{game::FinalStage, state_machine::GamePhase},
    };

    #[tokio::test(start_paused = true)]
    async fn start_runs_once_and_stop_aborts() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        assert!(!host.facade.is_running());

        host.start();
        host.start();
        settle().await;
        assert!(host.facade.is_running());

        host.facade.stop();
        settle().await;
        assert!(!host.facade.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_audio_ids_are_ignored() {
        let host = TestHost::in_lobby(Fakes::new(), AppConfig::default());
        host.start();
        assert!(!host.facade.audio_completed("not-an-id"));
        assert!(!host.facade.audio_completed("question_1_999"));
    }

    #[tokio::test(start_paused = true)]
    async fn narration_status_tracks_the_clue_clip() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        host.start();
        assert!(!host.facade.narration_status().busy);

        host.facade.handle_chat("Ann", "Rivers for $200").await.unwrap();
        settle().await;
        let status = host.facade.narration_status();
        assert!(status.busy);
        assert!(status.question_audio_id.unwrap().starts_with("question_"));
        assert!(status.in_flight.is_some());

        host.complete_audio().await;
        let status = host.facade.narration_status();
        assert!(!status.busy);
        assert!(status.question_audio_id.is_none());
        assert!(status.in_flight.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn correct_answer_scenario() {
        let host = TestHost::at_selection(&["Ann", "Bob", "Cy"]).await;
        host.start();

        host.facade.handle_chat("Ann", "Rivers for $200").await.unwrap();
        host.complete_audio().await;
        assert!(host.snapshot().buzzer_active);

        assert_eq!(host.facade.handle_buzz("Cy").await, Ok(1));
        assert_eq!(host.facade.handle_buzz("Bob").await, Err(BuzzRejection::Inactive));
        host.facade.handle_chat("Cy", "nile").await.unwrap();

        let snapshot = host.snapshot();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert_eq!(snapshot.players[2].score, 200);
        assert_eq!(snapshot.player_with_control.as_deref(), Some("Cy"));
        let topics = host.fakes.broadcaster.topics();
        let position = |topic: &str| topics.iter().position(|t| t == topic).unwrap();
        assert!(position("question_display") < position("buzzer"));
        assert!(position("buzzer") < position("answer"));
        assert!(position("answer") < position("question_dismiss"));
    }

    #[tokio::test(start_paused = true)]
    async fn incorrect_then_reactivation_scenario() {
        let host = TestHost::at_selection(&["Ann", "Bob", "Cy"]).await;
        host.start();
        host.facade.handle_chat("Ann", "Rivers for $200").await.unwrap();
        host.complete_audio().await;

        host.facade.handle_buzz("Bob").await.unwrap();
        host.facade.handle_chat("Bob", "the Thames").await.unwrap();
        assert!(!host.snapshot().buzzer_active);

        host.complete_audio().await;
        let snapshot = host.snapshot();
        assert!(snapshot.buzzer_active);
        assert_eq!(snapshot.phase, GamePhase::QuestionActive);
        assert_eq!(snapshot.players[1].score, -200);
        assert_eq!(host.facade.handle_buzz("Bob").await, Err(BuzzRejection::AlreadyAttempted));
        assert_eq!(host.facade.handle_buzz("Cy").await, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_timeout_scenario() {
        let host = TestHost::at_selection(&["Ann", "Bob", "Cy"]).await;
        host.start();
        host.facade.handle_chat("Ann", "Rivers for $200").await.unwrap();
        host.complete_audio().await;
        assert!(host.snapshot().buzzer_active);

        tokio::time::sleep(Duration::from_secs(6)).await;

        let snapshot = host.snapshot();
        assert_eq!(snapshot.phase, GamePhase::AwaitingSelection);
        assert!(!snapshot.buzzer_active);
        assert!(snapshot.question.is_none());
        assert!(snapshot.players.iter().all(|player| player.score == 0));
        assert_eq!(snapshot.player_with_control.as_deref(), Some("Ann"));
    }

    #[tokio::test(start_paused = true)]
    async fn last_clue_leads_into_the_final_round() {
        let host = TestHost::at_selection(&["Ann", "Bob"]).await;
        {
            let mut state = host.game.lock().await;
            for (category, value) in [("Rivers", 400), ("Science", 200), ("Science", 400)] {
                state.select_question(category, value).unwrap();
            }
            state.clear_question();
        }
        host.start();

        host.facade.handle_chat("Ann", "Rivers for $200").await.unwrap();
        host.complete_audio().await;
        host.facade.handle_buzz("Ann").await.unwrap();
        host.facade.handle_chat("Ann", "Nile").await.unwrap();
        settle().await;

        let snapshot = host.snapshot();
        assert_eq!(snapshot.phase, GamePhase::Final);
        assert_eq!(snapshot.final_stage, Some(FinalStage::Wagering));
        assert_eq!(host.fakes.broadcaster.count("select_question"), 0);
    }
}
