//! Wire events for a job's output stream.
//!
//! Every event a client receives is a [`StreamEvent`]: an envelope carrying the job id
//! and a timestamp, with the kind-specific [`EventPayload`] flattened next to them so that
//! `type`, `jobId`, `timestamp` and the payload fields all appear at the same level.
//!
//! # Event Flow
//!
//! A typical stream looks like:
//! 1. `start` - the task began
//! 2. `progress` / `log` / `tool_use` / `question` / `token_usage` - any number
//! 3. `completion` with `isComplete: false` - zero or more intermediate checkpoints
//! 4. `completion` with `isComplete: true`, or `error` - exactly one terminal event
//! 5. `stream_end` - always last

use crate::types::{ContentType, JobId, TokenUsage};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;

/// Severity attached to `log` events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Kind-specific event fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    /// The task started.
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Incremental task output or a progress update.
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<ContentType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_complete: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },

    /// The task is using a tool.
    ToolUse {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A completion. `is_complete` distinguishes final (true) from intermediate (false).
    Completion {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        is_complete: bool,
    },

    /// An error. Emitted for question failures and as the terminal event of a failed task.
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Diagnostic output from the task.
    Log {
        message: String,
        level: LogLevel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<ContentType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_complete: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },

    /// A blocking question awaiting an answer addressed by `question_id`.
    Question {
        question_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        choices: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggestions: Option<Vec<String>>,
    },

    Warning {
        message: String,
    },

    Information {
        message: String,
    },

    /// Token usage telemetry with a human-readable summary.
    TokenUsage {
        message: String,
        token_usage: TokenUsage,
    },

    /// The stream is over. Always the last event.
    StreamEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl EventPayload {
    #[must_use]
    pub fn start(task: Option<String>) -> Self {
        Self::Start {
            task,
            message: Some("Task started".to_string()),
        }
    }

    #[must_use]
    pub fn progress(message: impl Into<String>, progress: Option<u8>) -> Self {
        Self::Progress {
            message: message.into(),
            progress,
            content_type: None,
            is_complete: None,
            tool_name: None,
        }
    }

    #[must_use]
    pub fn tool_use(tool_name: impl Into<String>, message: Option<String>) -> Self {
        Self::ToolUse {
            tool_name: tool_name.into(),
            message,
        }
    }

    #[must_use]
    pub fn completion(
        message: impl Into<String>,
        result: Option<String>,
        task: Option<String>,
        is_complete: bool,
    ) -> Self {
        Self::Completion {
            message: message.into(),
            result,
            task,
            is_complete,
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            message: None,
        }
    }

    #[must_use]
    pub fn log(message: impl Into<String>, level: LogLevel) -> Self {
        Self::Log {
            message: message.into(),
            level,
            content_type: None,
            is_complete: None,
            tool_name: None,
        }
    }

    #[must_use]
    pub fn question(
        question_id: impl Into<String>,
        message: impl Into<String>,
        choices: Option<Vec<String>>,
    ) -> Self {
        Self::Question {
            question_id: question_id.into(),
            message: message.into(),
            suggestions: choices.clone(),
            choices,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn information(message: impl Into<String>) -> Self {
        Self::Information {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn token_usage(message: impl Into<String>, token_usage: TokenUsage) -> Self {
        Self::TokenUsage {
            message: message.into(),
            token_usage,
        }
    }

    #[must_use]
    pub const fn stream_end() -> Self {
        Self::StreamEnd { message: None }
    }

    /// The wire `type` of this payload.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::ToolUse { .. } => "tool_use",
            Self::Completion { .. } => "completion",
            Self::Error { .. } => "error",
            Self::Log { .. } => "log",
            Self::Question { .. } => "question",
            Self::Warning { .. } => "warning",
            Self::Information { .. } => "information",
            Self::TokenUsage { .. } => "token_usage",
            Self::StreamEnd { .. } => "stream_end",
        }
    }
}

/// Envelope wrapping every [`EventPayload`] with its job id and emission time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub job_id: JobId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl StreamEvent {
    /// Wrap a payload, stamping it with the clock's next timestamp.
    #[must_use]
    pub fn wrap(job_id: &JobId, payload: EventPayload, clock: &EventClock) -> Self {
        Self {
            job_id: job_id.clone(),
            timestamp: clock.now(),
            payload,
        }
    }

    #[must_use]
    pub const fn is_stream_end(&self) -> bool {
        matches!(self.payload, EventPayload::StreamEnd { .. })
    }
}

/// Per-stream clock whose readings never go backwards, even if the wall clock does.
#[derive(Debug)]
pub struct EventClock {
    last: Mutex<OffsetDateTime>,
}

impl EventClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        }
    }

    /// Current UTC time, clamped to be no earlier than the previous reading.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc().max(*last);
        *last = now;
        now
    }
}

impl Default for EventClock {
    fn default() -> Self {
        Self::new()
    }
}
