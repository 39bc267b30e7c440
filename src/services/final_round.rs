//! Final round: wagers, one clue, judged answers, game over.

use std::sync::{Arc, Weak};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    collaborators::{AnswerJudge, Broadcaster},
    config::AppConfig,
    dto::sse::FinalResultEntry,
    error::ServiceError,
    services::{
        events::{
            broadcast_final_results, broadcast_final_round, broadcast_host_chat,
            broadcast_player_list,
        },
        narration::{AudioKind, AudioSequencer, NarrationBinding},
    },
    state::{
        GameState, SharedGame,
        game::{FinalRound, FinalStage},
        state_machine::{GameEvent, GamePhase},
        timeout::{TimeoutKind, TimerToken},
    },
};

/// Runs the final round once the board is spent.
pub struct FinalRoundService {
    game: SharedGame,
    broadcaster: Arc<dyn Broadcaster>,
    judge: Arc<dyn AnswerJudge>,
    narrator: Arc<AudioSequencer>,
    config: Arc<AppConfig>,
    this: Weak<Self>,
}

impl FinalRoundService {
    /// Build the service; nothing happens until [`FinalRoundService::start`].
    pub fn new(
        game: SharedGame,
        broadcaster: Arc<dyn Broadcaster>,
        judge: Arc<dyn AnswerJudge>,
        narrator: Arc<AudioSequencer>,
        config: Arc<AppConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            game,
            broadcaster,
            judge,
            narrator,
            config,
            this: this.clone(),
        })
    }

    fn bc(&self) -> &dyn Broadcaster {
        self.broadcaster.as_ref()
    }

    fn announce(&self, line: &str) {
        broadcast_host_chat(self.bc(), &self.config.host_name, line);
        self.narrator
            .enqueue(line, AudioKind::Generic, NarrationBinding::default());
    }

    /// Open wagering. Without a final clue the game ends right away.
    pub async fn start(&self) {
        let mut state = self.game.lock().await;
        if state.phase() != GamePhase::Final || state.final_round().is_some() {
            return;
        }
        let Some(clue) = state.board().and_then(|board| board.final_clue.clone()) else {
            info!("board has no final clue; ending the game");
            if let Err(err) = state.apply(GameEvent::GameFinished) {
                warn!(error = %err, "could not end the game");
            }
            return;
        };

        let category = clue.category.clone();
        state.start_final_round(FinalRound::new(clue));
        let window = self.config.timings.final_wager;
        broadcast_final_round(self.bc(), FinalStage::Wagering, &category, None, window.as_secs());
        self.announce(&format!(
            "It's time for the final round! The category is {category}. Tell me your wager, anything up to your current score."
        ));

        let this = self.this.clone();
        state
            .timeouts()
            .arm(TimeoutKind::FinalWager, window, move |token| async move {
                match this.upgrade() {
                    Some(service) => service.on_wager_timeout(token).await,
                    None => Ok(()),
                }
            });
        info!(category, "final round started");
    }

    /// Record a wager, clamped to `0..=max(score, 0)`.
    pub async fn submit_wager(&self, player: &str, amount: i64) {
        let mut state = self.game.lock().await;
        let score = state.score(player).unwrap_or(0);
        let players = state.player_count();
        let Some(round) = state.final_round_mut() else {
            return;
        };
        if round.stage != FinalStage::Wagering {
            debug!(player, "wager outside the wagering stage");
            return;
        }
        let wager = amount.clamp(0, score.max(0));
        round.wagers.insert(player.to_string(), wager);
        let everyone = round.wagers.len() >= players;
        info!(player, requested = amount, wager, "final wager recorded");

        if everyone {
            self.close_wagers_locked(&mut state);
        }
    }

    fn close_wagers_locked(&self, state: &mut GameState) {
        state.timeouts().cancel(TimeoutKind::FinalWager);
        let names: Vec<String> = state.players().map(|player| player.name.clone()).collect();
        let Some(round) = state.final_round_mut() else {
            return;
        };
        if round.stage != FinalStage::Wagering {
            return;
        }
        for name in names {
            round.wagers.entry(name).or_insert(0);
        }
        round.stage = FinalStage::Answering;
        let clue = round.clue.clone();

        let window = self.config.timings.final_answer;
        broadcast_final_round(
            self.bc(),
            FinalStage::Answering,
            &clue.category,
            Some(&clue.clue),
            window.as_secs(),
        );
        self.announce(&format!("Here is the final clue: {}", clue.clue));

        let this = self.this.clone();
        state
            .timeouts()
            .arm(TimeoutKind::FinalAnswer, window, move |token| async move {
                match this.upgrade() {
                    Some(service) => service.on_answer_timeout(token).await,
                    None => Ok(()),
                }
            });
    }

    /// Record a player's first final answer; judges everything once all are in.
    pub async fn submit_answer(&self, player: &str, answer: &str) {
        let everyone = {
            let mut state = self.game.lock().await;
            let players = state.player_count();
            let Some(round) = state.final_round_mut() else {
                return;
            };
            if round.stage != FinalStage::Answering || round.answers.contains_key(player) {
                debug!(player, "final answer ignored");
                return;
            }
            round
                .answers
                .insert(player.to_string(), answer.trim().to_string());
            info!(player, "final answer recorded");
            round.answers.len() >= players
        };

        if everyone {
            self.resolve().await;
        }
    }

    /// Judge the final answers, settle wagers and end the game.
    pub async fn resolve(&self) {
        let (expected, entries) = {
            let mut state = self.game.lock().await;
            state.timeouts().cancel(TimeoutKind::FinalAnswer);
            let names: Vec<String> = state.players().map(|player| player.name.clone()).collect();
            let Some(round) = state.final_round_mut() else {
                return;
            };
            if round.stage != FinalStage::Answering {
                return;
            }
            round.stage = FinalStage::Resolved;
            let entries: Vec<(String, i64, Option<String>)> = names
                .into_iter()
                .map(|name| {
                    let wager = round.wagers.get(&name).copied().unwrap_or(0);
                    let answer = round.answers.get(&name).cloned();
                    (name, wager, answer)
                })
                .collect();
            (round.clue.answer.clone(), entries)
        };

        let verdicts = join_all(entries.iter().map(|(name, _, answer)| {
            let pending = answer
                .as_deref()
                .map(|answer| self.judge.evaluate(&expected, answer));
            async move {
                match pending {
                    Some(pending) => match pending.await {
                        Ok(judgement) => judgement.correct,
                        Err(err) => {
                            warn!(player = %name, error = %err, "final answer could not be judged");
                            false
                        }
                    },
                    None => false,
                }
            }
        }))
        .await;

        let mut state = self.game.lock().await;
        let results: Vec<FinalResultEntry> = entries
            .into_iter()
            .zip(verdicts)
            .map(|((name, wager, answer), correct)| {
                let delta = if correct { wager } else { -wager };
                let score = state.adjust_score(&name, delta).unwrap_or_default();
                FinalResultEntry {
                    name,
                    wager,
                    answer,
                    correct,
                    score,
                }
            })
            .collect();
        let winner = state.highest_scorer();
        info!(winner = ?winner, "final round resolved");

        broadcast_final_results(self.bc(), results, winner);
        broadcast_player_list(self.bc(), state.players());
        if let Err(err) = state.apply(GameEvent::GameFinished) {
            warn!(error = %err, "could not end the game");
        }
    }

    async fn on_wager_timeout(&self, token: TimerToken) -> Result<(), ServiceError> {
        let mut state = self.game.lock().await;
        if !state.timeouts().release(token) {
            return Ok(());
        }
        info!("final wagers closed by timeout");
        self.close_wagers_locked(&mut state);
        Ok(())
    }

    async fn on_answer_timeout(&self, token: TimerToken) -> Result<(), ServiceError> {
        {
            let mut state = self.game.lock().await;
            if !state.timeouts().release(token) {
                return Ok(());
            }
        }
        info!("final answers closed by timeout");
        self.resolve().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::test_support::TestHost;

    async fn host_in_final(scores: &[(&str, i64)]) -> TestHost {
        let names: Vec<&str> = scores.iter().map(|(name, _)| *name).collect();
        let host = TestHost::at_selection(&names).await;
        {
            let mut state = host.game.lock().await;
            for (name, score) in scores {
                state.adjust_score(name, *score);
            }
            state.apply(GameEvent::BoardExhausted).unwrap();
        }
        host
    }

    #[tokio::test(start_paused = true)]
    async fn wagers_then_answers_settle_scores() {
        let host = host_in_final(&[("Ann", 1000), ("Bob", 200)]).await;
        let service = host.facade.final_round();

        service.start().await;
        assert_eq!(host.game.latest().final_stage, Some(FinalStage::Wagering));
        let opening = host.fakes.broadcaster.payloads("final_round");
        assert_eq!(opening[0]["stage"], "wagering");
        assert!(opening[0].get("clue").is_none());

        service.submit_wager("Ann", 5000).await;
        assert_eq!(host.game.latest().final_stage, Some(FinalStage::Wagering));
        service.submit_wager("Bob", 150).await;
        assert_eq!(host.game.latest().final_stage, Some(FinalStage::Answering));
        let reveal = host.fakes.broadcaster.payloads("final_round");
        assert_eq!(reveal[1]["clue"], "The largest hot desert on Earth");

        service.submit_answer("Ann", "What is the Sahara?").await;
        service.submit_answer("Ann", "Gobi").await;
        service.submit_answer("Bob", "Gobi").await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::GameOver);
        assert_eq!(snapshot.players[0].score, 2000);
        assert_eq!(snapshot.players[1].score, 50);
        let results = host.fakes.broadcaster.payloads("final_results");
        assert_eq!(results[0]["winner"], "Ann");
        assert_eq!(results[0]["results"][0]["wager"], 1000);
        assert_eq!(results[0]["results"][0]["correct"], true);
        assert_eq!(results[0]["results"][1]["correct"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_fill_in_missing_wagers_and_answers() {
        let host = host_in_final(&[("Ann", 400), ("Bob", 300)]).await;
        let service = host.facade.final_round();
        service.start().await;
        service.submit_wager("Ann", 400).await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(host.game.latest().final_stage, Some(FinalStage::Answering));

        service.submit_answer("Ann", "Sahara").await;
        tokio::time::sleep(Duration::from_secs(31)).await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::GameOver);
        assert_eq!(snapshot.players[0].score, 800);
        assert_eq!(snapshot.players[1].score, 300);
        let results = host.fakes.broadcaster.payloads("final_results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["results"][1]["wager"], 0);
        assert!(results[0]["results"][1]["answer"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn negative_scores_can_only_wager_zero() {
        let host = host_in_final(&[("Ann", -200)]).await;
        let service = host.facade.final_round();
        service.start().await;
        service.submit_wager("Ann", 500).await;

        service.submit_answer("Ann", "Sahara").await;
        assert_eq!(host.game.latest().players[0].score, -200);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_final_clue_ends_the_game() {
        let host = host_in_final(&[("Ann", 0), ("Bob", 0)]).await;
        {
            let mut state = host.game.lock().await;
            let mut board = state.board().cloned().unwrap();
            board.final_clue = None;
            state.install_board("no-final", board);
        }

        host.facade.final_round().start().await;

        let snapshot = host.game.latest();
        assert_eq!(snapshot.phase, GamePhase::GameOver);
        assert_eq!(snapshot.final_stage, None);
        assert_eq!(host.fakes.broadcaster.count("final_round"), 0);
    }
}
