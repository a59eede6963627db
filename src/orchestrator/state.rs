use super::options::{ExecutionOptions, OrchestratorConfig};
use super::timers::{ExecutionTimers, TimerKind};
use crate::types::{ExecutionReason, ExecutionResult, TokenUsage, ToolUsage};
use std::time::Duration;

/// Mutable bookkeeping for one `execute_task` call.
pub(super) struct ExecutionState {
    pub is_info_query: bool,
    pub detect_questions: bool,
    pub waiting_for_input: bool,
    pub pauses: u32,
    pub resumes: u32,
    /// Accumulated message text (info query only).
    pub response: String,
    pub completion_detected: bool,
    pub token_usage: Option<TokenUsage>,
    pub tool_usage: ToolUsage,
    pub timers: ExecutionTimers,
    inactivity: Duration,
    quiet: Duration,
    min_content: usize,
}

impl ExecutionState {
    /// Build the state and arm the timers this mode starts with.
    pub fn start(config: &OrchestratorConfig, options: &ExecutionOptions) -> Self {
        let mut timers = ExecutionTimers::new();
        let inactivity = options.inactivity_timeout(config);

        if options.is_info_query {
            timers.arm(TimerKind::InfoQueryDeadline, config.info_query_timeout());
            timers.arm(TimerKind::Emergency, config.emergency_timeout());
        } else {
            timers.arm(TimerKind::Inactivity, inactivity);
        }
        if let Some(limit) = options.max_execution_time() {
            timers.arm(TimerKind::MaxExecution, limit);
        }

        Self {
            is_info_query: options.is_info_query,
            detect_questions: options.detect_questions,
            waiting_for_input: false,
            pauses: 0,
            resumes: 0,
            response: String::new(),
            completion_detected: false,
            token_usage: None,
            tool_usage: ToolUsage::new(),
            timers,
            inactivity,
            quiet: config.info_query_quiet(),
            min_content: config.info_query_min_content,
        }
    }

    pub const fn inactivity(&self) -> Duration {
        self.inactivity
    }

    /// Restart the sliding window unless it is paused on a human.
    pub fn touch(&mut self) {
        if !self.is_info_query && !self.waiting_for_input {
            self.timers.arm(TimerKind::Inactivity, self.inactivity);
        }
    }

    /// Enter the wait state. Returns true on the transition.
    pub fn pause(&mut self) -> bool {
        if self.is_info_query || self.waiting_for_input {
            return false;
        }
        self.waiting_for_input = true;
        self.pauses += 1;
        self.timers.clear(TimerKind::Inactivity);
        true
    }

    /// Leave the wait state with a full window. Returns true on the transition.
    pub fn resume(&mut self) -> bool {
        let was_waiting = self.waiting_for_input;
        if was_waiting {
            self.waiting_for_input = false;
            self.resumes += 1;
        }
        self.touch();
        was_waiting
    }

    /// Add info-query output and re-arm the quiet period once there is enough of it.
    pub fn accumulate(&mut self, text: &str) {
        self.response.push_str(text);
        if self.response.chars().count() >= self.min_content {
            self.timers.arm(TimerKind::InfoQueryQuiet, self.quiet);
        }
    }

    pub fn record_tool_failure(&mut self, tool: &str) {
        let stats = self.tool_usage.entry(tool.to_string()).or_default();
        stats.attempts += 1;
        stats.failures += 1;
    }

    fn accumulated_result(&self) -> Option<String> {
        (!self.response.is_empty()).then(|| self.response.clone())
    }
}

/// How an execution ended, before usage and timing are attached.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Outcome {
    reason: ExecutionReason,
    error: Option<String>,
    result: Option<String>,
    token_usage: Option<TokenUsage>,
    tool_usage: Option<ToolUsage>,
}

impl Outcome {
    pub fn success(reason: ExecutionReason, result: Option<String>) -> Self {
        Self {
            reason,
            error: None,
            result,
            token_usage: None,
            tool_usage: None,
        }
    }

    pub fn failure(reason: ExecutionReason, error: impl Into<String>) -> Self {
        Self {
            reason,
            error: Some(error.into()),
            result: None,
            token_usage: None,
            tool_usage: None,
        }
    }

    /// Success carrying whatever an info query has accumulated.
    pub fn info_query(reason: ExecutionReason, state: &ExecutionState) -> Self {
        Self::success(reason, state.accumulated_result())
    }

    pub fn completed(
        state: &ExecutionState,
        token_usage: Option<TokenUsage>,
        tool_usage: Option<ToolUsage>,
        result: Option<String>,
    ) -> Self {
        let result = result.or_else(|| {
            state
                .is_info_query
                .then(|| state.accumulated_result())
                .flatten()
        });
        Self {
            token_usage,
            tool_usage,
            ..Self::success(ExecutionReason::Completed, result)
        }
    }

    pub const fn reason(&self) -> ExecutionReason {
        self.reason
    }

    /// Attach usage (reported, else last seen) and timing.
    pub fn into_result(self, state: &ExecutionState, duration_ms: u64) -> ExecutionResult {
        let token_usage = self.token_usage.or_else(|| state.token_usage.clone());
        let tool_usage = self
            .tool_usage
            .or_else(|| (!state.tool_usage.is_empty()).then(|| state.tool_usage.clone()));
        let base = match self.error {
            Some(error) => ExecutionResult::failure(self.reason, error, duration_ms),
            None => ExecutionResult::success(self.reason, duration_ms),
        };
        base.with_result(self.result)
            .with_token_usage(token_usage)
            .with_tool_usage(tool_usage)
    }
}
