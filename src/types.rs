//! Core types shared across the crate.
//!
//! - [`JobId`] / [`TaskId`]: identifiers for a wire stream and the task behind it
//! - [`ContentType`]: semantic classification of a span of task output
//! - [`TokenUsage`]: token and cost statistics reported by a task
//! - [`ToolUsage`]: per-tool attempt/failure counters
//! - [`ExecutionResult`]: the single terminal outcome of one task execution

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identifier of one externally visible job (one wire stream).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a task execution inside the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic classification of a span of task output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Plain assistant output.
    Content,
    /// Reasoning inside `<thinking>` tags.
    Thinking,
    /// Text inside a tool invocation block.
    ToolCall,
    /// Result markup (`<result>`, `<error>`, ...).
    ToolResult,
    /// Structural markup (`<path>`, `<args>`, ...).
    System,
}

impl ContentType {
    pub const ALL: [Self; 5] = [
        Self::Content,
        Self::Thinking,
        Self::ToolCall,
        Self::ToolResult,
        Self::System,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Thinking => "thinking",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage statistics as they appear on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cache_reads: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cache_writes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<u64>,
}

impl TokenUsage {
    #[must_use]
    pub const fn new(total_tokens_in: u64, total_tokens_out: u64) -> Self {
        Self {
            total_tokens_in,
            total_tokens_out,
            total_cache_reads: None,
            total_cache_writes: None,
            total_cost: None,
            context_tokens: None,
        }
    }

    #[must_use]
    pub const fn with_cost(mut self, cost: f64) -> Self {
        self.total_cost = Some(cost);
        self
    }

    #[must_use]
    pub const fn total_tokens(&self) -> u64 {
        self.total_tokens_in.saturating_add(self.total_tokens_out)
    }
}

/// Attempt/failure counters for a single tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsageStats {
    pub attempts: u32,
    pub failures: u32,
}

/// Tool usage keyed by tool name.
pub type ToolUsage = BTreeMap<String, ToolUsageStats>;

/// Why an execution ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionReason {
    /// The task reported completion.
    Completed,
    /// The task's completion future failed.
    TaskError,
    /// The task aborted itself.
    Aborted,
    /// A tool failure ended the task.
    ToolFailed,
    /// No activity within the sliding inactivity window.
    Timeout,
    /// Info query: a completion phrase was detected and the settle delay elapsed.
    InfoQueryComplete,
    /// Info query: enough content and then a quiet period.
    InfoQueryQuiet,
    /// Info query: the bounded wait elapsed.
    InfoQueryTimeout,
    /// The emergency ceiling fired.
    EmergencyTimeout,
    /// The optional hard execution ceiling fired.
    MaxExecutionTime,
    /// `cancel_execution` was called.
    Cancelled,
}

impl ExecutionReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TaskError => "task_error",
            Self::Aborted => "aborted",
            Self::ToolFailed => "tool_failed",
            Self::Timeout => "timeout",
            Self::InfoQueryComplete => "info_query_complete",
            Self::InfoQueryQuiet => "info_query_quiet",
            Self::InfoQueryTimeout => "info_query_timeout",
            Self::EmergencyTimeout => "emergency_timeout",
            Self::MaxExecutionTime => "max_execution_time",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the task must be aborted when the execution ends for this reason.
    #[must_use]
    pub const fn requires_abort(self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::InfoQueryComplete
                | Self::InfoQueryQuiet
                | Self::InfoQueryTimeout
                | Self::EmergencyTimeout
                | Self::MaxExecutionTime
                | Self::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a single `execute_task` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub reason: ExecutionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_usage: Option<ToolUsage>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    #[must_use]
    pub const fn success(reason: ExecutionReason, duration_ms: u64) -> Self {
        Self {
            success: true,
            reason,
            result: None,
            error: None,
            token_usage: None,
            tool_usage: None,
            duration_ms,
        }
    }

    #[must_use]
    pub fn failure(reason: ExecutionReason, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            reason,
            result: None,
            error: Some(error.into()),
            token_usage: None,
            tool_usage: None,
            duration_ms,
        }
    }

    #[must_use]
    pub fn with_result(mut self, result: Option<String>) -> Self {
        self.result = result;
        self
    }

    #[must_use]
    pub fn with_token_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    #[must_use]
    pub fn with_tool_usage(mut self, usage: Option<ToolUsage>) -> Self {
        self.tool_usage = usage;
        self
    }
}

/// Convert u128 milliseconds to u64, capping at `u64::MAX`
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn millis_to_u64(millis: u128) -> u64 {
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}
