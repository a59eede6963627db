//! The task side of an execution: what the orchestrator can do to a task, and what a task
//! reports back.

use crate::types::{TaskId, TokenUsage, ToolUsage};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Whether a message is plain output or a request for input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Say,
    Ask,
}

/// Lifecycle events a running task reports on its event channel.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskEvent {
    Started,
    /// A chunk of output. `text` is a delta; `partial` marks a chunk of a message still in
    /// progress.
    Message {
        text: String,
        kind: MessageKind,
        partial: bool,
    },
    /// The task is blocked on a human answer.
    WaitingForInput,
    /// The answer the task was waiting for arrived.
    AskResponded,
    ModeSwitched(String),
    Paused,
    Unpaused,
    Spawned(TaskId),
    TokenUsageUpdated(TokenUsage),
    ToolFailed {
        tool: String,
        error: String,
    },
    Completed {
        token_usage: Option<TokenUsage>,
        tool_usage: Option<ToolUsage>,
        result: Option<String>,
    },
    Aborted,
}

impl TaskEvent {
    #[must_use]
    pub fn say(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            kind: MessageKind::Say,
            partial: false,
        }
    }

    #[must_use]
    pub fn ask(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            kind: MessageKind::Ask,
            partial: false,
        }
    }

    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            kind: MessageKind::Say,
            partial: true,
        }
    }

    #[must_use]
    pub const fn completed(token_usage: Option<TokenUsage>) -> Self {
        Self::Completed {
            token_usage,
            tool_usage: None,
            result: None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Message { .. } => "message",
            Self::WaitingForInput => "waiting_for_input",
            Self::AskResponded => "ask_responded",
            Self::ModeSwitched(_) => "mode_switched",
            Self::Paused => "paused",
            Self::Unpaused => "unpaused",
            Self::Spawned(_) => "spawned",
            Self::TokenUsageUpdated(_) => "token_usage_updated",
            Self::ToolFailed { .. } => "tool_failed",
            Self::Completed { .. } => "completed",
            Self::Aborted => "aborted",
        }
    }
}

/// Sending half handed to the task.
pub type TaskEventSender = mpsc::Sender<TaskEvent>;

/// Receiving half handed to the orchestrator.
pub type TaskEvents = mpsc::Receiver<TaskEvent>;

/// Create the bounded channel a task reports on.
#[must_use]
pub fn event_channel(capacity: usize) -> (TaskEventSender, TaskEvents) {
    mpsc::channel(capacity.max(1))
}

/// Control surface of a running task.
#[async_trait]
pub trait ManagedTask: Send + Sync {
    fn task_id(&self) -> &TaskId;

    /// Stop the task. Called when an execution ends by timeout or cancellation.
    async fn abort(&self) -> Result<()>;

    /// Release the task's resources. Called once on every exit path.
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
