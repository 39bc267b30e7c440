//! Contracts for everything the host talks to but does not implement: the
//! broadcast transport, answer judging, clue resolution, speech synthesis,
//! board generation and board persistence.

/// Board documents on disk.
pub mod board_store;
/// HTTP clients for the remote collaborators.
#[cfg(feature = "http-collaborators")]
pub mod http;
/// Offline fallbacks.
pub mod local;
/// In-memory fakes for tests.
#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::AppConfig,
    dto::sse::ServerEvent,
    error::CollaboratorError,
    state::{
        ClientId,
        game::{AvailableCategory, Board, PreferenceMessage},
    },
};

/// Result alias for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Fan-out and unicast delivery of server events.
pub trait Broadcaster: Send + Sync {
    /// Deliver `event` to every connected client.
    fn broadcast(&self, event: ServerEvent);
    /// Deliver `event` to one client; false when the client is gone.
    fn send_to(&self, client: ClientId, event: ServerEvent) -> bool;
}

/// Verdict on a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    /// Whether the answer is accepted.
    pub correct: bool,
    /// Reasoning from the judge; may be empty.
    #[serde(default)]
    pub explanation: String,
}

/// Decides whether a submitted answer matches the expected one.
pub trait AnswerJudge: Send + Sync {
    /// Judge `submitted` against `expected`.
    fn evaluate(&self, expected: &str, submitted: &str)
    -> BoxFuture<'static, CollaboratorResult<Judgement>>;
}

/// Outcome of interpreting a clue selection message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClueResolution {
    /// The message names an available category and value.
    Valid {
        /// Category as named on the board.
        category: String,
        /// Dollar value of the clue.
        value: i64,
    },
    /// The message could not be mapped to an available clue.
    Invalid {
        /// Why the message was rejected.
        error: String,
    },
}

/// Maps a free-form selection message to a category and value.
pub trait ClueResolver: Send + Sync {
    /// Resolve `message` against the clues still on the board.
    fn resolve(
        &self,
        message: &str,
        available: &[AvailableCategory],
    ) -> BoxFuture<'static, CollaboratorResult<ClueResolution>>;
}

/// Turns narration text into a playable resource URL.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` with `voice` and return where to fetch the audio.
    fn synthesize(&self, text: &str, voice: &str) -> BoxFuture<'static, CollaboratorResult<String>>;
}

/// Builds a fresh board from player preferences.
pub trait BoardGenerator: Send + Sync {
    /// Generate a board themed on `preferences`.
    fn generate(
        &self,
        preferences: &[PreferenceMessage],
    ) -> BoxFuture<'static, CollaboratorResult<Board>>;
}

/// JSON document store for boards.
pub trait BoardStore: Send + Sync {
    /// Board stored under `name`.
    fn load(&self, name: &str) -> BoxFuture<'static, CollaboratorResult<Board>>;
    /// Store `board` under `name`, replacing any previous one.
    fn save(&self, name: &str, board: Board) -> BoxFuture<'static, CollaboratorResult<()>>;
    /// Names of every stored board, sorted.
    fn list(&self) -> BoxFuture<'static, CollaboratorResult<Vec<String>>>;
}

/// Handles on every collaborator, injected into the host components.
#[derive(Clone)]
pub struct Collaborators {
    /// Event delivery to displays and players.
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Answer judging.
    pub judge: Arc<dyn AnswerJudge>,
    /// Clue selection parsing.
    pub resolver: Arc<dyn ClueResolver>,
    /// Narration audio.
    pub speech: Arc<dyn SpeechSynthesizer>,
    /// Board generation from preferences.
    pub generator: Arc<dyn BoardGenerator>,
    /// Board documents.
    pub store: Arc<dyn BoardStore>,
}

impl Collaborators {
    /// Wire collaborators from configuration. Endpoints that are not configured
    /// fall back to the local implementations.
    pub fn from_config(config: &AppConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        let endpoints = &config.collaborators;
        let store: Arc<dyn BoardStore> =
            Arc::new(board_store::FileBoardStore::new(config.board_dir.clone()));

        let mut collaborators = Self {
            broadcaster,
            judge: Arc::new(local::ExactMatchJudge),
            resolver: Arc::new(local::KeywordClueResolver),
            speech: Arc::new(local::NoSpeech),
            generator: Arc::new(local::NoGenerator),
            store,
        };

        #[cfg(feature = "http-collaborators")]
        {
            use http::{HttpBoardGenerator, HttpClueResolver, HttpJudge, HttpSpeech};

            if let Some(url) = &endpoints.judge_url {
                collaborators.judge = Arc::new(HttpJudge::new(url));
            }
            if let Some(url) = &endpoints.resolver_url {
                collaborators.resolver = Arc::new(HttpClueResolver::new(url));
            }
            if let Some(url) = &endpoints.speech_url {
                collaborators.speech = Arc::new(HttpSpeech::new(url));
            }
            if let Some(url) = &endpoints.generator_url {
                collaborators.generator = Arc::new(HttpBoardGenerator::new(url));
            }
        }

        #[cfg(not(feature = "http-collaborators"))]
        if endpoints.judge_url.is_some()
            || endpoints.resolver_url.is_some()
            || endpoints.speech_url.is_some()
            || endpoints.generator_url.is_some()
        {
            tracing::warn!("collaborator URLs configured but HTTP collaborators are disabled; using local fallbacks");
        }

        info!(
            judge = endpoints.judge_url.as_deref().unwrap_or("local"),
            resolver = endpoints.resolver_url.as_deref().unwrap_or("local"),
            speech = endpoints.speech_url.as_deref().unwrap_or("none"),
            generator = endpoints.generator_url.as_deref().unwrap_or("none"),
            "collaborators configured"
        );

        collaborators
    }
}
