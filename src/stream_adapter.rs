//! Turns task output into ordered wire events for one job.
//!
//! [`StreamAdapter`] is the [`TaskPresenter`] a task talks to. It classifies streamed output
//! through a [`MessageBuffer`], forwards questions through a [`QuestionBroker`], and owns
//! the stream lifecycle:
//!
//! ```text
//! Open --(final completion | error)--> Ending --(delay, stream_end)--> Closed
//!   \------------------------(close)---------------------------------/
//! ```
//!
//! Writes while `Open` or `Ending` are delivered; writes after `Closed` are dropped. Only the
//! first terminal event is sent. It schedules `stream_end`, so a stream carries at most one
//! of each, and later terminals are dropped.

mod config;
#[cfg(test)]
pub(crate) mod test_utils;
#[cfg(test)]
mod tests;
mod usage;

pub use config::{AdapterConfig, DisplayMode};
pub use usage::{coerce_token_usage, summarize};

use crate::events::{EventClock, EventPayload, LogLevel, StreamEvent};
use crate::message_buffer::{BufferState, MessageBuffer, ProcessedMessage};
use crate::presenter::{TaskPresenter, parse_confirmation};
use crate::questions::{QuestionBroker, QuestionError};
use crate::transport::EventSink;
use crate::types::{ContentType, JobId, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Whether a completion ends the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// A checkpoint. The stream stays open.
    Intermediate,
    /// The task is done. `stream_end` follows after the configured delay.
    Final,
}

/// Lifecycle of a job's stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// A terminal event was sent and `stream_end` is pending. Further terminals are dropped.
    Ending,
    Closed,
}

#[derive(Clone, Copy)]
enum Output {
    Progress(Option<u8>),
    Log(LogLevel),
}

impl Output {
    fn raw(self, message: &str) -> EventPayload {
        match self {
            Self::Progress(progress) => EventPayload::progress(message, progress),
            Self::Log(level) => EventPayload::log(message, level),
        }
    }

    fn classified(self, fragment: ProcessedMessage) -> EventPayload {
        let ProcessedMessage {
            content,
            content_type,
            is_complete,
            tool_name,
        } = fragment;
        match self {
            Self::Progress(progress) => EventPayload::Progress {
                message: content,
                progress,
                content_type: Some(content_type),
                is_complete: Some(is_complete),
                tool_name,
            },
            Self::Log(level) => EventPayload::Log {
                message: content,
                level,
                content_type: Some(content_type),
                is_complete: Some(is_complete),
                tool_name,
            },
        }
    }
}

struct AdapterState {
    stream: StreamState,
    buffer: MessageBuffer,
    enabled: BTreeSet<ContentType>,
}

/// Event adapter for a single job. Share it behind an `Arc`.
pub struct StreamAdapter {
    job_id: JobId,
    config: AdapterConfig,
    sink: Arc<dyn EventSink>,
    broker: Arc<dyn QuestionBroker>,
    clock: EventClock,
    // Held across each send so events leave in emit order.
    state: Mutex<AdapterState>,
    closed: AtomicBool,
}

impl StreamAdapter {
    #[must_use]
    pub fn new(
        job_id: JobId,
        sink: Arc<dyn EventSink>,
        broker: Arc<dyn QuestionBroker>,
        config: AdapterConfig,
    ) -> Self {
        let enabled = config.enabled_content_types.clone();
        Self {
            job_id,
            config,
            sink,
            broker,
            clock: EventClock::new(),
            state: Mutex::new(AdapterState {
                stream: StreamState::Open,
                buffer: MessageBuffer::new(),
                enabled,
            }),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn stream_state(&self) -> StreamState {
        self.state.lock().await.stream
    }

    /// Snapshot of the classifier state.
    pub async fn buffer_state(&self) -> BufferState {
        self.state.lock().await.buffer.state().clone()
    }

    /// Show or hide a content type in buffered mode.
    pub async fn set_content_type_enabled(&self, kind: ContentType, enabled: bool) {
        let mut state = self.state.lock().await;
        if enabled {
            state.enabled.insert(kind);
        } else {
            state.enabled.remove(&kind);
        }
    }

    /// Clear the classifier between tasks that share this adapter.
    pub async fn reset_buffer(&self) {
        self.state.lock().await.buffer.reset();
    }

    pub async fn emit_start(&self, task: Option<&str>) -> bool {
        self.emit(EventPayload::start(task.map(str::to_string))).await
    }

    /// Emit a completion. A [`CompletionKind::Final`] completion ends the stream.
    pub async fn emit_completion(
        &self,
        message: &str,
        result: Option<String>,
        task_id: Option<&TaskId>,
        kind: CompletionKind,
    ) -> bool {
        let task = task_id.map(ToString::to_string);
        match kind {
            CompletionKind::Intermediate => {
                self.emit(EventPayload::completion(message, result, task, false))
                    .await
            }
            CompletionKind::Final => {
                self.emit_terminal(EventPayload::completion(message, result, task, true))
                    .await
            }
        }
    }

    /// Emit a terminal error and end the stream.
    pub async fn emit_error(&self, error: &str) -> bool {
        self.emit_terminal(EventPayload::error(error)).await
    }

    /// Emit a `token_usage` event from any serializable usage report. Malformed fields are
    /// coerced, never rejected.
    pub async fn emit_token_usage<T>(&self, usage: &T) -> bool
    where
        T: Serialize + ?Sized + Sync,
    {
        let value = match serde_json::to_value(usage) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to read token usage for job {}: {e}", self.job_id);
                return false;
            }
        };
        let usage = coerce_token_usage(&value);
        let summary = summarize(&usage);
        self.emit(EventPayload::token_usage(summary, usage)).await
    }

    /// Close the stream without `stream_end`. Pending questions are cancelled first.
    /// Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            if state.stream == StreamState::Closed {
                return;
            }
            state.stream = StreamState::Closed;
            self.closed.store(true, Ordering::Release);
        }
        self.release("stream closed").await;
    }

    async fn emit(&self, payload: EventPayload) -> bool {
        let state = self.state.lock().await;
        self.deliver(&state, payload).await
    }

    async fn deliver(&self, state: &AdapterState, payload: EventPayload) -> bool {
        if state.stream == StreamState::Closed {
            log::debug!(
                "Dropping {} event for closed job {}",
                payload.kind(),
                self.job_id
            );
            return false;
        }

        let kind = payload.kind();
        let event = StreamEvent::wrap(&self.job_id, payload, &self.clock);
        match self.sink.send(event).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to deliver {kind} event for job {}: {e:#}", self.job_id);
                false
            }
        }
    }

    async fn emit_output(&self, message: &str, output: Output) -> bool {
        let mut state = self.state.lock().await;
        match self.config.display_mode {
            DisplayMode::Verbose => self.deliver(&state, output.raw(message)).await,
            DisplayMode::Buffered => {
                let fragments = state.buffer.process_message(message);
                self.deliver_fragments(&state, fragments, output).await
            }
        }
    }

    async fn deliver_fragments(
        &self,
        state: &AdapterState,
        fragments: Vec<ProcessedMessage>,
        output: Output,
    ) -> bool {
        let mut delivered = true;
        for fragment in fragments {
            if fragment.content.is_empty() || !state.enabled.contains(&fragment.content_type) {
                continue;
            }
            delivered &= self.deliver(state, output.classified(fragment)).await;
        }
        delivered
    }

    async fn emit_terminal(&self, payload: EventPayload) -> bool {
        let delivered = {
            let mut state = self.state.lock().await;
            if state.stream != StreamState::Open {
                log::debug!(
                    "Dropping terminal {} event for ended job {}",
                    payload.kind(),
                    self.job_id
                );
                return false;
            }

            let tail = state.buffer.flush();
            self.deliver_fragments(&state, tail, Output::Progress(None))
                .await;

            let delivered = self.deliver(&state, payload).await;
            state.stream = StreamState::Ending;
            delivered
        };

        tokio::time::sleep(self.config.stream_end_delay()).await;
        self.end_stream().await;
        delivered
    }

    async fn end_stream(&self) {
        {
            let mut state = self.state.lock().await;
            if state.stream == StreamState::Closed {
                return;
            }
            self.deliver(&state, EventPayload::stream_end()).await;
            state.stream = StreamState::Closed;
            self.closed.store(true, Ordering::Release);
        }
        self.release("stream ended").await;
    }

    async fn release(&self, reason: &str) {
        let cancelled = self.broker.cancel_job_questions(&self.job_id, reason).await;
        if cancelled > 0 {
            log::debug!(
                "Cancelled {cancelled} question(s) while closing job {}",
                self.job_id
            );
        }
        self.sink.close().await;
    }

    async fn ask(
        &self,
        prompt: &str,
        suggestions: Option<Vec<String>>,
    ) -> Result<String, QuestionError> {
        if self.is_closed() {
            return Err(QuestionError::Closed);
        }

        let (question_id, mut answer) = self
            .broker
            .create_question(&self.job_id, prompt, suggestions.clone())
            .await?;

        if !self
            .emit(EventPayload::question(&question_id, prompt, suggestions))
            .await
        {
            self.broker
                .cancel_question(&question_id, "question could not be delivered")
                .await;
            return Err(QuestionError::Closed);
        }

        let Some(limit) = self.config.question_timeout() else {
            return answer.await;
        };
        match tokio::time::timeout(limit, &mut answer).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // Settle it in the broker too, so a late answer is rejected.
                if self
                    .broker
                    .cancel_question(&question_id, "question timed out")
                    .await
                {
                    Err(QuestionError::TimedOut)
                } else {
                    // Settled concurrently; take whatever won.
                    answer.await
                }
            }
        }
    }

    async fn fallback<T: Send>(&self, error: &QuestionError, default: T) -> T {
        log::warn!("Question for job {} failed: {error}", self.job_id);
        self.emit(EventPayload::error(format!("Question failed: {error}")))
            .await;
        default
    }
}

#[async_trait]
impl TaskPresenter for StreamAdapter {
    async fn show_information(&self, message: &str) {
        self.emit(EventPayload::information(message)).await;
    }

    async fn show_warning(&self, message: &str) {
        self.emit(EventPayload::warning(message)).await;
    }

    async fn show_error(&self, message: &str) {
        self.emit(EventPayload::error(message)).await;
    }

    async fn show_success(&self, message: &str) {
        self.emit(EventPayload::information(message)).await;
    }

    async fn show_progress(&self, message: &str, progress: Option<u8>) {
        self.emit_output(message, Output::Progress(progress)).await;
    }

    async fn show_tool_use(&self, tool_name: &str, message: Option<&str>) {
        self.emit(EventPayload::tool_use(tool_name, message.map(str::to_string)))
            .await;
    }

    async fn clear_progress(&self) {
        self.emit(EventPayload::progress("", None)).await;
    }

    async fn log(&self, message: &str, level: LogLevel) {
        self.emit_output(message, Output::Log(level)).await;
    }

    async fn ask_question(&self, prompt: &str, choices: &[String]) -> String {
        let suggestions = (!choices.is_empty()).then(|| choices.to_vec());
        match self.ask(prompt, suggestions).await {
            Ok(answer) => answer,
            Err(e) => {
                let default = choices.first().cloned().unwrap_or_default();
                self.fallback(&e, default).await
            }
        }
    }

    async fn ask_confirmation(&self, prompt: &str, default: bool) -> bool {
        let choices = vec!["yes".to_string(), "no".to_string()];
        match self.ask(prompt, Some(choices)).await {
            Ok(answer) => parse_confirmation(&answer),
            Err(e) => self.fallback(&e, default).await,
        }
    }

    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> String {
        match self.ask(prompt, None).await {
            Ok(answer) => answer,
            Err(e) => {
                self.fallback(&e, default.unwrap_or_default().to_string())
                    .await
            }
        }
    }
}
