//! Timeout-governed execution of a single task.
//!
//! [`ExecutionOrchestrator::execute_task`] drives a task's event channel to exactly one
//! [`ExecutionResult`]. Every event is forwarded to an [`ExecutionHandler`] for presentation;
//! separately, a per-execution timer set decides when a task that stopped making progress
//! is given up on.
//!
//! # Modes
//!
//! - **Standard**: a sliding inactivity window restarts on every activity event. While the
//!   task waits on a human (an explicit `WaitingForInput`, an `Ask` message, or a message the
//!   [`QuestionDetector`] flags) the window is paused, and it restarts at full length only
//!   on `AskResponded`. Expiry is a failure.
//! - **Info query**: output is accumulated. The execution succeeds early when the
//!   [`CompletionDetector`] matches (after a settle delay), or after a quiet period once
//!   enough content exists, or unconditionally at the info-query deadline. An emergency
//!   ceiling is armed as well and is a failure if it fires.
//!
//! # Example
//!
//! ```no_run
//! use agent_stream::handler::LoggingHandler;
//! use agent_stream::orchestrator::{
//!     ExecutionOptions, ExecutionOrchestrator, ManagedTask, OrchestratorConfig, TaskEvent,
//!     event_channel,
//! };
//! use agent_stream::TaskId;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Job(TaskId);
//!
//! #[async_trait]
//! impl ManagedTask for Job {
//!     fn task_id(&self) -> &TaskId {
//!         &self.0
//!     }
//!
//!     async fn abort(&self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = ExecutionOrchestrator::new(OrchestratorConfig::default());
//! let (tx, events) = event_channel(64);
//! tx.send(TaskEvent::completed(None)).await?;
//!
//! let result = orchestrator
//!     .execute_task(
//!         Arc::new(Job(TaskId::new())),
//!         events,
//!         std::future::pending(),
//!         Arc::new(LoggingHandler),
//!         ExecutionOptions::default(),
//!     )
//!     .await?;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```

mod detectors;
mod options;
mod state;
mod task;
#[cfg(test)]
mod test_utils;
mod timers;

pub use detectors::{
    CompletionDetector, KeywordQuestionDetector, PhraseCompletionDetector, QuestionDetector,
};
pub use options::{ExecutionOptions, OrchestratorConfig};
pub use task::{ManagedTask, MessageKind, TaskEvent, TaskEventSender, TaskEvents, event_channel};
pub use timers::{ExecutionTimers, TimerKind};

use crate::handler::ExecutionHandler;
use crate::types::{ExecutionReason, ExecutionResult, TaskId, millis_to_u64};
use anyhow::{Context, Result};
use state::{ExecutionState, Outcome};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tokio::time::Instant;

struct ActiveExecution {
    execution_id: u64,
    cancel: Option<oneshot::Sender<String>>,
}

type ActiveMap = Arc<Mutex<HashMap<TaskId, ActiveExecution>>>;

/// Removes the execution's entry on every exit path, unless a newer execution for the same
/// task id has replaced it.
struct ActiveGuard {
    active: ActiveMap,
    task_id: TaskId,
    execution_id: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active
            .get(&self.task_id)
            .is_some_and(|entry| entry.execution_id == self.execution_id)
        {
            active.remove(&self.task_id);
        }
    }
}

pub struct ExecutionOrchestrator {
    config: OrchestratorConfig,
    question_detector: Arc<dyn QuestionDetector>,
    completion_detector: Arc<dyn CompletionDetector>,
    active: ActiveMap,
    next_execution_id: AtomicU64,
}

impl ExecutionOrchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            question_detector: Arc::new(KeywordQuestionDetector::new()),
            completion_detector: Arc::new(PhraseCompletionDetector::new()),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_execution_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn with_question_detector(mut self, detector: impl QuestionDetector + 'static) -> Self {
        self.question_detector = Arc::new(detector);
        self
    }

    #[must_use]
    pub fn with_completion_detector(
        mut self,
        detector: impl CompletionDetector + 'static,
    ) -> Self {
        self.completion_detector = Arc::new(detector);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Task ids with a running execution.
    #[must_use]
    pub fn active_executions(&self) -> Vec<TaskId> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<TaskId> = active.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(task_id)
    }

    /// Cancel a running execution. Returns `false` if there is none to cancel.
    pub fn cancel_execution(&self, task_id: &TaskId, reason: &str) -> bool {
        let cancel = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(task_id)
            .and_then(|entry| entry.cancel.take());

        match cancel {
            Some(tx) => {
                tracing::info!(task_id = %task_id, reason, "Cancelling execution");
                tx.send(reason.to_string()).is_ok()
            }
            None => false,
        }
    }

    /// Run a task to its terminal outcome.
    ///
    /// `events` is the task's event channel and `completion` its main future; an `Err` from
    /// `completion` is a task failure. The handler sees `on_task_started` once, then every
    /// forwarded event, then exactly one of `on_task_completed` / `on_task_failed`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the active-execution registry is unusable. Task failures,
    /// timeouts and cancellation are reported through the returned [`ExecutionResult`].
    pub async fn execute_task<F>(
        &self,
        task: Arc<dyn ManagedTask>,
        events: TaskEvents,
        completion: F,
        handler: Arc<dyn ExecutionHandler>,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult>
    where
        F: Future<Output = Result<()>> + Send,
    {
        let task_id = task.task_id().clone();
        let execution_id = self.next_execution_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut active = self.active.lock().ok().context("lock poisoned")?;
            let replaced = active.insert(
                task_id.clone(),
                ActiveExecution {
                    execution_id,
                    cancel: Some(cancel_tx),
                },
            );
            if replaced.is_some() {
                tracing::warn!(task_id = %task_id, "Replacing an active execution with the same task id");
            }
        }
        let _guard = ActiveGuard {
            active: Arc::clone(&self.active),
            task_id: task_id.clone(),
            execution_id,
        };

        let started = Instant::now();
        tracing::info!(
            task_id = %task_id,
            execution_id,
            info_query = options.is_info_query,
            "Starting task execution"
        );
        handler.on_task_started(&task_id).await;

        let mut state = ExecutionState::start(&self.config, &options);
        let outcome = self
            .drive(
                &task_id,
                events,
                completion,
                cancel_rx,
                handler.as_ref(),
                &mut state,
            )
            .await;
        state.timers.clear_all();

        if outcome.reason().requires_abort()
            && let Err(e) = task.abort().await
        {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to abort task");
        }

        let duration_ms = millis_to_u64(started.elapsed().as_millis());
        let result = outcome.into_result(&state, duration_ms);

        if result.success {
            handler.on_task_completed(&task_id, &result).await;
        } else {
            handler.on_task_failed(&task_id, &result).await;
        }

        if let Err(e) = task.dispose().await {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to dispose task");
        }

        tracing::info!(
            task_id = %task_id,
            success = result.success,
            reason = %result.reason,
            duration_ms,
            pauses = state.pauses,
            resumes = state.resumes,
            "Task execution finished"
        );
        Ok(result)
    }

    async fn drive<F>(
        &self,
        task_id: &TaskId,
        mut events: TaskEvents,
        completion: F,
        mut cancel_rx: oneshot::Receiver<String>,
        handler: &dyn ExecutionHandler,
        state: &mut ExecutionState,
    ) -> Outcome
    where
        F: Future<Output = Result<()>> + Send,
    {
        tokio::pin!(completion);
        let mut events_open = true;
        let mut cancel_open = true;

        loop {
            tokio::select! {
                biased;

                cancelled = &mut cancel_rx, if cancel_open => match cancelled {
                    Ok(reason) => {
                        return Outcome::failure(
                            ExecutionReason::Cancelled,
                            format!("Execution cancelled: {reason}"),
                        );
                    }
                    // Replaced by a newer execution with the same id.
                    Err(_) => cancel_open = false,
                },

                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        if let Some(outcome) = self.dispatch(task_id, event, handler, state).await {
                            return outcome;
                        }
                    }
                    None => {
                        tracing::debug!(task_id = %task_id, "Task event channel closed");
                        events_open = false;
                    }
                },

                finished = &mut completion => {
                    if let Err(e) = finished {
                        return Outcome::failure(ExecutionReason::TaskError, format!("{e:#}"));
                    }
                    while let Ok(event) = events.try_recv() {
                        if let Some(outcome) = self.dispatch(task_id, event, handler, state).await {
                            return outcome;
                        }
                    }
                    return Outcome::completed(state, None, None, None);
                },

                expired = state.timers.next_expired() => return self.expire(expired, state),
            }
        }
    }

    async fn dispatch(
        &self,
        task_id: &TaskId,
        event: TaskEvent,
        handler: &dyn ExecutionHandler,
        state: &mut ExecutionState,
    ) -> Option<Outcome> {
        tracing::trace!(task_id = %task_id, event = event.name(), "Task event");

        match event {
            TaskEvent::Started | TaskEvent::Paused | TaskEvent::Unpaused => state.touch(),
            TaskEvent::Message {
                text,
                kind,
                partial,
            } => {
                handler.on_task_message(task_id, &text, kind, partial).await;
                if state.is_info_query {
                    self.observe_info_query(&text, state);
                } else if kind == MessageKind::Ask
                    || (state.detect_questions
                        && !partial
                        && self.question_detector.is_question(&text))
                {
                    Self::enter_wait(task_id, handler, state).await;
                } else {
                    state.touch();
                }
            }
            TaskEvent::WaitingForInput => Self::enter_wait(task_id, handler, state).await,
            TaskEvent::AskResponded => {
                if state.resume() {
                    tracing::debug!(task_id = %task_id, "Input received, inactivity timer restarted");
                    handler.on_input_received(task_id).await;
                }
            }
            TaskEvent::ModeSwitched(mode) => {
                handler.on_mode_switched(task_id, &mode).await;
                state.touch();
            }
            TaskEvent::Spawned(child) => {
                tracing::debug!(task_id = %task_id, child = %child, "Subtask spawned");
                state.touch();
            }
            TaskEvent::TokenUsageUpdated(usage) => {
                handler.on_token_usage(task_id, &usage).await;
                state.token_usage = Some(usage);
                state.touch();
            }
            TaskEvent::ToolFailed { tool, error } => {
                handler.on_tool_failed(task_id, &tool, &error).await;
                state.record_tool_failure(&tool);
                return Some(Outcome::failure(
                    ExecutionReason::ToolFailed,
                    format!("Tool {tool} failed: {error}"),
                ));
            }
            TaskEvent::Completed {
                token_usage,
                tool_usage,
                result,
            } => {
                return Some(Outcome::completed(state, token_usage, tool_usage, result));
            }
            TaskEvent::Aborted => {
                return Some(Outcome::failure(ExecutionReason::Aborted, "Task aborted"));
            }
        }
        None
    }

    async fn enter_wait(task_id: &TaskId, handler: &dyn ExecutionHandler, state: &mut ExecutionState) {
        if state.pause() {
            tracing::debug!(task_id = %task_id, "Waiting for input, inactivity timer paused");
            handler.on_waiting_for_input(task_id).await;
        }
    }

    fn observe_info_query(&self, text: &str, state: &mut ExecutionState) {
        state.accumulate(text);
        if !state.completion_detected && self.completion_detector.is_complete(&state.response) {
            state.completion_detected = true;
            state
                .timers
                .arm(TimerKind::CompletionSettle, self.config.completion_settle());
        }
    }

    fn expire(&self, timer: TimerKind, state: &ExecutionState) -> Outcome {
        match timer {
            TimerKind::Inactivity => Outcome::failure(
                ExecutionReason::Timeout,
                format!("No activity for {:?}", state.inactivity()),
            ),
            TimerKind::InfoQueryDeadline => {
                Outcome::info_query(ExecutionReason::InfoQueryTimeout, state)
            }
            TimerKind::InfoQueryQuiet => Outcome::info_query(ExecutionReason::InfoQueryQuiet, state),
            TimerKind::CompletionSettle => {
                Outcome::info_query(ExecutionReason::InfoQueryComplete, state)
            }
            TimerKind::Emergency => Outcome::failure(
                ExecutionReason::EmergencyTimeout,
                format!(
                    "Emergency timeout after {:?}",
                    self.config.emergency_timeout()
                ),
            ),
            TimerKind::MaxExecution => Outcome::failure(
                ExecutionReason::MaxExecutionTime,
                "Maximum execution time exceeded",
            ),
        }
    }
}

impl Default for ExecutionOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}
