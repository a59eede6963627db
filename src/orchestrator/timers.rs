//! Per-execution timers.
//!
//! Every timer an execution uses lives in one [`ExecutionTimers`] value owned by that
//! execution, so dropping or clearing it cancels them all.

use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Optional hard ceiling on the whole execution.
    MaxExecution,
    /// Info-query safety net.
    Emergency,
    /// Info-query unconditional end.
    InfoQueryDeadline,
    /// Info-query settle delay after a completion phrase.
    CompletionSettle,
    /// Info-query silence after enough content.
    InfoQueryQuiet,
    /// Standard-mode sliding window.
    Inactivity,
}

impl TimerKind {
    /// Poll order. When several timers are due at once the earlier entry wins.
    pub const ALL: [Self; 6] = [
        Self::MaxExecution,
        Self::Emergency,
        Self::InfoQueryDeadline,
        Self::CompletionSettle,
        Self::InfoQueryQuiet,
        Self::Inactivity,
    ];

    const fn index(self) -> usize {
        match self {
            Self::MaxExecution => 0,
            Self::Emergency => 1,
            Self::InfoQueryDeadline => 2,
            Self::CompletionSettle => 3,
            Self::InfoQueryQuiet => 4,
            Self::Inactivity => 5,
        }
    }
}

#[derive(Default)]
pub struct ExecutionTimers {
    slots: [Option<Pin<Box<Sleep>>>; 6],
}

impl ExecutionTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `after` from now, replacing any earlier deadline.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        let deadline = Instant::now() + after;
        match &mut self.slots[kind.index()] {
            Some(sleep) => sleep.as_mut().reset(deadline),
            slot @ None => *slot = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    pub fn clear(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    pub fn clear_all(&mut self) {
        self.slots = Default::default();
    }

    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Wait for the next armed timer to fire and disarm it. Pends forever if none is armed.
    pub async fn next_expired(&mut self) -> TimerKind {
        poll_fn(|cx| {
            for kind in TimerKind::ALL {
                let slot = &mut self.slots[kind.index()];
                if let Some(sleep) = slot
                    && sleep.as_mut().poll(cx).is_ready()
                {
                    *slot = None;
                    return Poll::Ready(kind);
                }
            }
            Poll::Pending
        })
        .await
    }
}
