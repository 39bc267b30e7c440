//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::{self, BoxFuture};
use serde_json::Value;

use crate::{
    collaborators::{
        AnswerJudge, BoardGenerator, BoardStore, Broadcaster, ClueResolution, ClueResolver,
        CollaboratorResult, Collaborators, Judgement, SpeechSynthesizer,
        local::{ExactMatchJudge, KeywordClueResolver},
    },
    dto::sse::ServerEvent,
    error::CollaboratorError,
    state::{
        ClientId,
        game::{AvailableCategory, Board, BoardCategory, BoardQuestion, FinalClue, PreferenceMessage},
    },
};

/// Records every event instead of delivering it.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<ServerEvent>>,
    unicast: Mutex<Vec<(ClientId, ServerEvent)>>,
}

impl RecordingBroadcaster {
    /// Topics in emission order.
    pub fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| event.event.clone())
            .collect()
    }

    /// Payloads emitted under `topic`.
    pub fn payloads(&self, topic: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event.as_deref() == Some(topic))
            .map(|event| serde_json::from_str(&event.data).unwrap())
            .collect()
    }

    /// Number of events emitted under `topic`.
    pub fn count(&self, topic: &str) -> usize {
        self.payloads(topic).len()
    }

    /// Host chat lines, in order.
    pub fn host_lines(&self) -> Vec<String> {
        self.payloads("chat_message")
            .into_iter()
            .filter(|payload| payload["isHost"] == Value::Bool(true))
            .filter_map(|payload| payload["message"].as_str().map(str::to_string))
            .collect()
    }

    /// Events sent to a single client.
    pub fn unicast(&self) -> Vec<(ClientId, ServerEvent)> {
        self.unicast.lock().unwrap().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
        self.unicast.lock().unwrap().clear();
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, event: ServerEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn send_to(&self, client: ClientId, event: ServerEvent) -> bool {
        self.unicast.lock().unwrap().push((client, event));
        true
    }
}

/// Judge that can be told to fail or to take its time.
#[derive(Default)]
pub struct ScriptedJudge {
    failing: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedJudge {
    /// Make every following evaluation fail.
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    /// Make every following evaluation take `delay`.
    pub fn slow(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

impl AnswerJudge for ScriptedJudge {
    fn evaluate(
        &self,
        expected: &str,
        submitted: &str,
    ) -> BoxFuture<'static, CollaboratorResult<Judgement>> {
        let result = if *self.failing.lock().unwrap() {
            Err(CollaboratorError::Transport {
                service: "answer judge",
                message: "connection reset".into(),
            })
        } else {
            Ok(ExactMatchJudge::judge(expected, submitted))
        };
        match *self.delay.lock().unwrap() {
            Some(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                result
            }),
            None => Box::pin(future::ready(result)),
        }
    }
}

/// Resolver delegating to the keyword resolver unless told to fail.
#[derive(Default)]
pub struct ScriptedResolver {
    failing: Mutex<bool>,
}

impl ScriptedResolver {
    /// Make every following resolution fail.
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

impl ClueResolver for ScriptedResolver {
    fn resolve(
        &self,
        message: &str,
        available: &[AvailableCategory],
    ) -> BoxFuture<'static, CollaboratorResult<ClueResolution>> {
        let result = if *self.failing.lock().unwrap() {
            Err(CollaboratorError::ProtocolParse {
                service: "clue resolver",
                message: "expected value".into(),
            })
        } else {
            Ok(KeywordClueResolver::interpret(message, available))
        };
        Box::pin(future::ready(result))
    }
}

/// Speech synthesizer returning `mem://<n>` URLs and recording requested texts.
#[derive(Default)]
pub struct FakeSpeech {
    texts: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl FakeSpeech {
    /// Texts synthesized so far.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    /// Make every following synthesis fail.
    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

impl SpeechSynthesizer for FakeSpeech {
    fn synthesize(&self, text: &str, _voice: &str) -> BoxFuture<'static, CollaboratorResult<String>> {
        if *self.failing.lock().unwrap() {
            return Box::pin(future::ready(Err(CollaboratorError::Status {
                service: "speech synthesizer",
                status: 500,
            })));
        }
        let mut texts = self.texts.lock().unwrap();
        texts.push(text.to_string());
        let url = format!("mem://{}", texts.len());
        Box::pin(future::ready(Ok(url)))
    }
}

/// Generator returning a fixed board, or failing when none is set.
#[derive(Default)]
pub struct FakeGenerator {
    board: Mutex<Option<Board>>,
    requests: Mutex<Vec<Vec<PreferenceMessage>>>,
}

impl FakeGenerator {
    /// Generator that always returns `board`.
    pub fn returning(board: Board) -> Self {
        Self {
            board: Mutex::new(Some(board)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Preferences received by each call.
    pub fn requests(&self) -> Vec<Vec<PreferenceMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl BoardGenerator for FakeGenerator {
    fn generate(
        &self,
        preferences: &[PreferenceMessage],
    ) -> BoxFuture<'static, CollaboratorResult<Board>> {
        self.requests.lock().unwrap().push(preferences.to_vec());
        let result = self
            .board
            .lock()
            .unwrap()
            .clone()
            .ok_or(CollaboratorError::Unavailable("board generator"));
        Box::pin(future::ready(result))
    }
}

/// Board store kept in a map.
#[derive(Default)]
pub struct MemoryBoardStore {
    boards: Mutex<HashMap<String, Board>>,
}

impl MemoryBoardStore {
    /// Store pre-seeded with `board` under `name`.
    pub fn with(name: &str, board: Board) -> Self {
        let store = Self::default();
        store
            .boards
            .lock()
            .unwrap()
            .insert(name.to_string(), board);
        store
    }

    /// Board saved under `name`.
    pub fn get(&self, name: &str) -> Option<Board> {
        self.boards.lock().unwrap().get(name).cloned()
    }
}

impl BoardStore for MemoryBoardStore {
    fn load(&self, name: &str) -> BoxFuture<'static, CollaboratorResult<Board>> {
        let result = self.get(name).ok_or_else(|| {
            CollaboratorError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no board named {name}"),
            ))
        });
        Box::pin(future::ready(result))
    }

    fn save(&self, name: &str, board: Board) -> BoxFuture<'static, CollaboratorResult<()>> {
        self.boards
            .lock()
            .unwrap()
            .insert(name.to_string(), board);
        Box::pin(future::ready(Ok(())))
    }

    fn list(&self) -> BoxFuture<'static, CollaboratorResult<Vec<String>>> {
        let mut names: Vec<String> = self.boards.lock().unwrap().keys().cloned().collect();
        names.sort();
        Box::pin(future::ready(Ok(names)))
    }
}

/// Handles on the fakes, kept so tests can inspect and steer them.
pub struct Fakes {
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub judge: Arc<ScriptedJudge>,
    pub resolver: Arc<ScriptedResolver>,
    pub speech: Arc<FakeSpeech>,
    pub generator: Arc<FakeGenerator>,
    pub store: Arc<MemoryBoardStore>,
}

impl Fakes {
    /// Fakes whose generator fails and whose store holds `sample_board()` as `default`.
    pub fn new() -> Self {
        Self::with_generator(FakeGenerator::default())
    }

    /// Fakes with a custom generator.
    pub fn with_generator(generator: FakeGenerator) -> Self {
        Self {
            broadcaster: Arc::new(RecordingBroadcaster::default()),
            judge: Arc::new(ScriptedJudge::default()),
            resolver: Arc::new(ScriptedResolver::default()),
            speech: Arc::new(FakeSpeech::default()),
            generator: Arc::new(generator),
            store: Arc::new(MemoryBoardStore::with("default", sample_board())),
        }
    }

    /// Bundle for injection.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            broadcaster: self.broadcaster.clone(),
            judge: self.judge.clone(),
            resolver: self.resolver.clone(),
            speech: self.speech.clone(),
            generator: self.generator.clone(),
            store: self.store.clone(),
        }
    }
}

fn question(clue: &str, answer: &str, value: i64, daily_double: bool) -> BoardQuestion {
    BoardQuestion {
        clue: clue.into(),
        answer: answer.into(),
        value,
        daily_double,
        used: false,
    }
}

/// Two categories of two clues; `Science` $400 is a daily double.
pub fn sample_board() -> Board {
    Board {
        contestants: Vec::new(),
        categories: vec![
            BoardCategory {
                name: "Rivers".into(),
                questions: vec![
                    question("This river flows through Cairo", "Nile", 200, false),
                    question("The longest river in South America", "Amazon", 400, false),
                ],
            },
            BoardCategory {
                name: "Science".into(),
                questions: vec![
                    question("H2O is better known as this", "Water", 200, false),
                    question("The planet closest to the sun", "Mercury", 400, true),
                ],
            },
        ],
        final_clue: Some(FinalClue {
            category: "Deserts".into(),
            clue: "The largest hot desert on Earth".into(),
            answer: "Sahara".into(),
        }),
    }
}
