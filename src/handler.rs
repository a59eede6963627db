//! Execution callbacks.
//!
//! The orchestrator reports everything that happens during an execution to an
//! [`ExecutionHandler`]:
//!
//! - [`ExecutionHandler::on_task_started`] - exactly once, first
//! - [`ExecutionHandler::on_task_message`] and friends - forwarded task events
//! - [`ExecutionHandler::on_waiting_for_input`] / [`ExecutionHandler::on_input_received`] -
//!   the inactivity timer paused or resumed
//! - [`ExecutionHandler::on_task_completed`] or [`ExecutionHandler::on_task_failed`] -
//!   exactly once, last
//!
//! # Built-in Implementations
//!
//! - [`StreamTaskHandler`] - Presents the execution on a [`StreamAdapter`]
//! - [`LoggingHandler`] - Logs every callback

use crate::orchestrator::MessageKind;
use crate::presenter::TaskPresenter;
use crate::stream_adapter::{CompletionKind, StreamAdapter};
use crate::types::{ExecutionResult, TaskId, TokenUsage};
use async_trait::async_trait;
use std::sync::Arc;

/// Callbacks for one execution. Every method defaults to a no-op.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    async fn on_task_started(&self, _task_id: &TaskId) {}

    async fn on_task_message(
        &self,
        _task_id: &TaskId,
        _text: &str,
        _kind: MessageKind,
        _partial: bool,
    ) {
    }

    async fn on_mode_switched(&self, _task_id: &TaskId, _mode: &str) {}

    async fn on_token_usage(&self, _task_id: &TaskId, _usage: &TokenUsage) {}

    async fn on_tool_failed(&self, _task_id: &TaskId, _tool: &str, _error: &str) {}

    /// The inactivity timer was paused because the task is waiting on a human.
    async fn on_waiting_for_input(&self, _task_id: &TaskId) {}

    /// The task's answer arrived and the inactivity timer restarted.
    async fn on_input_received(&self, _task_id: &TaskId) {}

    async fn on_task_completed(&self, _task_id: &TaskId, _result: &ExecutionResult) {}

    async fn on_task_failed(&self, _task_id: &TaskId, _result: &ExecutionResult) {}
}

/// Handler that turns an execution into wire events on a [`StreamAdapter`].
pub struct StreamTaskHandler {
    adapter: Arc<StreamAdapter>,
}

impl StreamTaskHandler {
    #[must_use]
    pub const fn new(adapter: Arc<StreamAdapter>) -> Self {
        Self { adapter }
    }

    #[must_use]
    pub const fn adapter(&self) -> &Arc<StreamAdapter> {
        &self.adapter
    }
}

#[async_trait]
impl ExecutionHandler for StreamTaskHandler {
    async fn on_task_started(&self, task_id: &TaskId) {
        self.adapter.emit_start(Some(task_id.as_str())).await;
    }

    async fn on_task_message(
        &self,
        _task_id: &TaskId,
        text: &str,
        _kind: MessageKind,
        _partial: bool,
    ) {
        self.adapter.show_progress(text, None).await;
    }

    async fn on_mode_switched(&self, _task_id: &TaskId, mode: &str) {
        self.adapter
            .show_information(&format!("Switched to {mode} mode"))
            .await;
    }

    async fn on_token_usage(&self, _task_id: &TaskId, usage: &TokenUsage) {
        self.adapter.emit_token_usage(usage).await;
    }

    async fn on_tool_failed(&self, _task_id: &TaskId, tool: &str, error: &str) {
        self.adapter
            .show_warning(&format!("Tool {tool} failed: {error}"))
            .await;
    }

    async fn on_task_completed(&self, task_id: &TaskId, result: &ExecutionResult) {
        if let Some(usage) = &result.token_usage {
            self.adapter.emit_token_usage(usage).await;
        }
        self.adapter
            .emit_completion(
                "Task completed",
                result.result.clone(),
                Some(task_id),
                CompletionKind::Final,
            )
            .await;
    }

    async fn on_task_failed(&self, _task_id: &TaskId, result: &ExecutionResult) {
        let error = result
            .error
            .clone()
            .unwrap_or_else(|| format!("Task failed: {}", result.reason));
        self.adapter.emit_error(&error).await;
    }
}

/// Handler that only logs (useful for headless runs and debugging)
pub struct LoggingHandler;

#[async_trait]
impl ExecutionHandler for LoggingHandler {
    async fn on_task_started(&self, task_id: &TaskId) {
        tracing::info!(task_id = %task_id, "Task started");
    }

    async fn on_task_message(&self, task_id: &TaskId, text: &str, kind: MessageKind, partial: bool) {
        tracing::debug!(task_id = %task_id, ?kind, partial, len = text.len(), "Task message");
    }

    async fn on_mode_switched(&self, task_id: &TaskId, mode: &str) {
        tracing::debug!(task_id = %task_id, mode, "Mode switched");
    }

    async fn on_token_usage(&self, task_id: &TaskId, usage: &TokenUsage) {
        tracing::debug!(
            task_id = %task_id,
            tokens_in = usage.total_tokens_in,
            tokens_out = usage.total_tokens_out,
            "Token usage"
        );
    }

    async fn on_tool_failed(&self, task_id: &TaskId, tool: &str, error: &str) {
        tracing::warn!(task_id = %task_id, tool, error, "Tool failed");
    }

    async fn on_waiting_for_input(&self, task_id: &TaskId) {
        tracing::debug!(task_id = %task_id, "Waiting for input");
    }

    async fn on_input_received(&self, task_id: &TaskId) {
        tracing::debug!(task_id = %task_id, "Input received");
    }

    async fn on_task_completed(&self, task_id: &TaskId, result: &ExecutionResult) {
        tracing::info!(
            task_id = %task_id,
            reason = %result.reason,
            duration_ms = result.duration_ms,
            "Task completed"
        );
    }

    async fn on_task_failed(&self, task_id: &TaskId, result: &ExecutionResult) {
        tracing::error!(
            task_id = %task_id,
            reason = %result.reason,
            error = result.error.as_deref().unwrap_or_default(),
            duration_ms = result.duration_ms,
            "Task failed"
        );
    }
}
