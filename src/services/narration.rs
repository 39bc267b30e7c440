//! Narration sequencing: one clip in flight at a time, completion-driven.

use std::{
    collections::{HashMap, HashSet, VecDeque, hash_map::DefaultHasher},
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, oneshot},
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    collaborators::{Broadcaster, SpeechSynthesizer},
    config::Timings,
    dto::epoch_millis,
    services::events::{broadcast_audio_complete, broadcast_play_audio},
    state::game::QuestionId,
};

/// Recently issued resource names remembered for deduplication.
const MAX_RECENT_RESOURCES: usize = 20;
/// Completion ids remembered to discard duplicate reports.
const MAX_PROCESSED_IDS: usize = 100;

/// What a narration clip is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioKind {
    /// Reading a clue.
    Question,
    /// Announcing a wrong answer or a missed answer window.
    Incorrect,
    /// Anything else the host says.
    Generic,
}

impl AudioKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Incorrect => "incorrect",
            Self::Generic => "generic",
        }
    }
}

impl FromStr for AudioKind {
    type Err = AudioIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(Self::Question),
            "incorrect" => Ok(Self::Incorrect),
            "generic" => Ok(Self::Generic),
            _ => Err(AudioIdParseError),
        }
    }
}

/// Error returned for audio ids not issued by this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("malformed audio id")]
pub struct AudioIdParseError;

/// Identifier of a narration clip: `{kind}_{issued_ms}_{sequence}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioId {
    kind: AudioKind,
    issued_ms: i64,
    sequence: u64,
}

impl AudioId {
    /// Kind the id is tagged with.
    pub fn kind(&self) -> AudioKind {
        self.kind
    }
}

impl fmt::Display for AudioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind.as_str(), self.issued_ms, self.sequence)
    }
}

impl FromStr for AudioId {
    type Err = AudioIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_');
        let kind = parts.next().ok_or(AudioIdParseError)?.parse()?;
        let issued_ms = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or(AudioIdParseError)?;
        let sequence = parts
            .next()
            .and_then(|part| part.parse().ok())
            .ok_or(AudioIdParseError)?;
        Ok(Self {
            kind,
            issued_ms,
            sequence,
        })
    }
}

/// Context a clip is tied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrationBinding {
    /// Question the clip belongs to.
    pub question: Option<QuestionId>,
    /// Whether the buzzer should reopen once the clip has played.
    pub reactivate_buzzer: bool,
}

impl NarrationBinding {
    /// Clip about `question` that does not reopen the buzzer.
    pub fn question(question: QuestionId) -> Self {
        Self {
            question: Some(question),
            reactivate_buzzer: false,
        }
    }
}

/// A queued narration clip.
#[derive(Debug, Clone)]
pub struct AudioTask {
    /// Id announced to displays.
    pub id: AudioId,
    /// Text to synthesize.
    pub text: String,
    /// What the clip is about.
    pub kind: AudioKind,
    /// Dedup key, `{kind}_{hash}`.
    pub resource_name: String,
    /// Question and buzzer context.
    pub binding: NarrationBinding,
}

/// Emitted once per clip when it finished, failed or timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrationCompleted {
    /// Clip that finished.
    pub id: AudioId,
    /// What the clip was about.
    pub kind: AudioKind,
    /// Question the clip was bound to.
    pub question: Option<QuestionId>,
    /// Whether the buzzer should reopen now.
    pub should_reactivate_buzzer: bool,
}

#[derive(Default)]
struct SequencerState {
    recent: VecDeque<(String, Instant)>,
    processed: VecDeque<AudioId>,
    processed_set: HashSet<AudioId>,
    pending: HashMap<AudioId, AudioTask>,
    waiting: Option<(AudioId, oneshot::Sender<()>)>,
    in_flight: Option<AudioId>,
    current_question: Option<AudioId>,
    current_incorrect: Option<AudioId>,
}

impl SequencerState {
    fn is_duplicate(&mut self, resource: &str, now: Instant, window: std::time::Duration) -> bool {
        self.recent
            .retain(|(_, issued)| now.saturating_duration_since(*issued) < window);
        if self.recent.iter().any(|(name, _)| name == resource) {
            return true;
        }
        if self.recent.len() == MAX_RECENT_RESOURCES {
            self.recent.pop_front();
        }
        self.recent.push_back((resource.to_string(), now));
        false
    }

    fn mark_processed(&mut self, id: AudioId) -> bool {
        if !self.processed_set.insert(id) {
            return false;
        }
        self.processed.push_back(id);
        if self.processed.len() > MAX_PROCESSED_IDS {
            if let Some(oldest) = self.processed.pop_front() {
                self.processed_set.remove(&oldest);
            }
        }
        true
    }
}

/// FIFO narration queue drained by a single consumer task.
pub struct AudioSequencer {
    speech: Arc<dyn SpeechSynthesizer>,
    broadcaster: Arc<dyn Broadcaster>,
    voice: String,
    timings: Timings,
    queue_tx: mpsc::UnboundedSender<AudioTask>,
    queue_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<AudioTask>>>,
    completed_tx: mpsc::UnboundedSender<NarrationCompleted>,
    sequence: AtomicU64,
    state: Mutex<SequencerState>,
}

impl AudioSequencer {
    /// Build a sequencer reporting completions on `completed_tx`.
    pub fn new(
        speech: Arc<dyn SpeechSynthesizer>,
        broadcaster: Arc<dyn Broadcaster>,
        voice: impl Into<String>,
        timings: Timings,
        completed_tx: mpsc::UnboundedSender<NarrationCompleted>,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            speech,
            broadcaster,
            voice: voice.into(),
            timings,
            queue_tx,
            queue_rx: AsyncMutex::new(Some(queue_rx)),
            completed_tx,
            sequence: AtomicU64::new(0),
            state: Mutex::new(SequencerState::default()),
        })
    }

    /// Queue `text` for narration. Returns `None` when the same text of the same
    /// kind was queued within the dedup window.
    pub fn enqueue(&self, text: &str, kind: AudioKind, binding: NarrationBinding) -> Option<AudioId> {
        let resource_name = resource_name(kind, text);
        let id = AudioId {
            kind,
            issued_ms: epoch_millis(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
        };

        let task = AudioTask {
            id,
            text: text.to_string(),
            kind,
            resource_name,
            binding,
        };

        {
            let Ok(mut state) = self.state.lock() else {
                warn!("narration state poisoned; dropping clip");
                return None;
            };
            let window = self.timings.narration_dedup_window;
            if state.is_duplicate(&task.resource_name, Instant::now(), window) {
                debug!(resource = %task.resource_name, "duplicate narration suppressed");
                return None;
            }
            match kind {
                AudioKind::Question => state.current_question = Some(id),
                AudioKind::Incorrect => state.current_incorrect = Some(id),
                AudioKind::Generic => {}
            }
            state.pending.insert(id, task.clone());
        }

        if self.queue_tx.send(task).is_err() {
            warn!(audio_id = %id, "narration queue closed");
            return None;
        }
        debug!(audio_id = %id, "narration queued");
        Some(id)
    }

    /// Drain the queue until the sender side is dropped. Only the first caller gets the queue.
    pub async fn run(self: Arc<Self>) {
        let Some(mut queue) = self.queue_rx.lock().await.take() else {
            warn!("narration consumer already running");
            return;
        };
        info!("narration consumer started");

        while let Some(task) = queue.recv().await {
            self.play(task).await;
        }
    }

    async fn play(&self, task: AudioTask) {
        let id = task.id;
        if self.is_processed(id) {
            return;
        }
        self.with_state(|state| state.in_flight = Some(id));

        match self.speech.synthesize(&task.text, &self.voice).await {
            Ok(url) => {
                let (tx, rx) = oneshot::channel();
                self.with_state(|state| state.waiting = Some((id, tx)));
                broadcast_play_audio(self.broadcaster.as_ref(), &url, &id.to_string());

                if timeout(self.timings.narration_wait, rx).await.is_err() {
                    warn!(audio_id = %id, "no completion reported; moving on");
                    self.complete(id);
                }
            }
            Err(err) => {
                warn!(audio_id = %id, error = %err, "speech synthesis failed; skipping playback");
                self.complete(id);
            }
        }

        self.with_state(|state| {
            state.in_flight = None;
            state.waiting = None;
        });
    }

    /// Handle a completion report from a display. Returns false for unknown or repeated ids.
    pub fn on_completion(&self, raw_id: &str) -> bool {
        match raw_id.parse::<AudioId>() {
            Ok(id) => self.complete(id),
            Err(err) => {
                debug!(audio_id = raw_id, error = %err, "ignoring completion");
                false
            }
        }
    }

    fn complete(&self, id: AudioId) -> bool {
        let task = {
            let Ok(mut state) = self.state.lock() else {
                return false;
            };
            let Some(task) = state.pending.remove(&id) else {
                debug!(audio_id = %id, "completion for unknown or finished clip");
                return false;
            };
            state.mark_processed(id);
            if state.current_question == Some(id) {
                state.current_question = None;
            }
            if state.current_incorrect == Some(id) {
                state.current_incorrect = None;
            }
            if state.waiting.as_ref().is_some_and(|(waiting, _)| *waiting == id) {
                if let Some((_, tx)) = state.waiting.take() {
                    let _ = tx.send(());
                }
            }
            task
        };

        broadcast_audio_complete(self.broadcaster.as_ref(), &id.to_string());
        let event = NarrationCompleted {
            id,
            kind: task.kind,
            question: task.binding.question,
            should_reactivate_buzzer: task.binding.reactivate_buzzer,
        };
        if self.completed_tx.send(event).is_err() {
            warn!(audio_id = %id, "narration listener gone");
        }
        info!(audio_id = %id, kind = task.kind.as_str(), "narration completed");
        true
    }

    /// Whether any clip is queued or playing.
    pub fn is_busy(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.pending.is_empty())
            .unwrap_or(false)
    }

    /// Ids of the clue and wrong-answer clips still pending.
    pub fn current_ids(&self) -> (Option<AudioId>, Option<AudioId>) {
        self.state
            .lock()
            .map(|state| (state.current_question, state.current_incorrect))
            .unwrap_or((None, None))
    }

    /// Clip currently being synthesized or played.
    pub fn in_flight(&self) -> Option<AudioId> {
        self.state.lock().ok().and_then(|state| state.in_flight)
    }

    fn is_processed(&self, id: AudioId) -> bool {
        self.state
            .lock()
            .map(|state| state.processed_set.contains(&id))
            .unwrap_or(false)
    }

    fn with_state(&self, f: impl FnOnce(&mut SequencerState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }
}

fn resource_name(kind: AudioKind, text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.trim().to_lowercase().hash(&mut hasher);
    format!("{}_{:016x}", kind.as_str(), hasher.finish())
}
