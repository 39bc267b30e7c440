use std::{collections::HashMap, future::Future, time::Duration};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Timers supervised by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    /// Buzzer open with nobody buzzing.
    Buzz,
    /// Player buzzed in and has not answered.
    Answer,
    /// Daily double found and no wager named yet.
    DailyDoubleWager,
    /// Final round wagers outstanding.
    FinalWager,
    /// Final round answers outstanding.
    FinalAnswer,
}

impl TimeoutKind {
    /// Short label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Buzz => "buzz",
            Self::Answer => "answer",
            Self::DailyDoubleWager => "daily_double_wager",
            Self::FinalWager => "final_wager",
            Self::FinalAnswer => "final_answer",
        }
    }
}

/// Identity of one armed timer. A firing timer presents its token to prove it is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    /// Which slot the timer occupies.
    pub kind: TimeoutKind,
    id: u64,
}

/// A scheduled callback that can be cancelled.
#[derive(Debug)]
pub struct TimeoutHandle {
    token: TimerToken,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl TimeoutHandle {
    fn spawn<F>(token: TimerToken, duration: Duration, body: F) -> Self
    where
        F: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let deadline = Instant::now() + duration;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Err(err) = body.await {
                warn!(kind = token.kind.label(), error = %err, "timeout callback failed");
            }
        });
        Self {
            token,
            deadline,
            task,
        }
    }

    /// Abort the timer. Calling this on a finished or already cancelled timer does nothing.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Time left before the timer fires.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// At most one live timer per [`TimeoutKind`].
#[derive(Debug, Default)]
pub struct TimeoutSlots {
    slots: HashMap<TimeoutKind, TimeoutHandle>,
    next_id: u64,
}

impl TimeoutSlots {
    /// Arm a timer in `kind`'s slot, cancelling whatever occupied it.
    ///
    /// `build` receives the token of the new timer so the callback can call
    /// [`TimeoutSlots::release`] when it fires.
    pub fn arm<F, Fut>(&mut self, kind: TimeoutKind, duration: Duration, build: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> Fut,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        self.cancel(kind);
        self.next_id += 1;
        let token = TimerToken {
            kind,
            id: self.next_id,
        };
        let handle = TimeoutHandle::spawn(token, duration, build(token));
        self.slots.insert(kind, handle);
        debug!(kind = kind.label(), ?duration, "timer armed");
        token
    }

    /// Cancel the timer in `kind`'s slot, if any.
    pub fn cancel(&mut self, kind: TimeoutKind) {
        if let Some(handle) = self.slots.remove(&kind) {
            handle.cancel();
            debug!(kind = kind.label(), "timer cancelled");
        }
    }

    /// Cancel every timer tied to the clue on screen.
    pub fn cancel_question_timers(&mut self) {
        self.cancel(TimeoutKind::Buzz);
        self.cancel(TimeoutKind::Answer);
        self.cancel(TimeoutKind::DailyDoubleWager);
    }

    /// Called by a firing timer. Returns false when the timer was cancelled or replaced
    /// in the meantime, in which case the firing is stale and must do nothing.
    ///
    /// The slot is emptied without aborting, so the firing task may go on to cancel
    /// other timers without cancelling itself.
    pub fn release(&mut self, token: TimerToken) -> bool {
        match self.slots.get(&token.kind) {
            Some(handle) if handle.token == token => {
                self.slots.remove(&token.kind);
                true
            }
            _ => false,
        }
    }

    /// Whether a timer of `kind` is currently armed.
    pub fn is_armed(&self, kind: TimeoutKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Time left on the timer of `kind`.
    pub fn remaining(&self, kind: TimeoutKind) -> Option<Duration> {
        self.slots.get(&kind).map(TimeoutHandle::remaining)
    }
}

impl Drop for TimeoutSlots {
    fn drop(&mut self) {
        for handle in self.slots.values() {
            handle.cancel();
        }
    }
}
