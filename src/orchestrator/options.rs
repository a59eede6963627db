use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout policy shared by every execution of one orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Sliding inactivity window in standard mode.
    pub inactivity_timeout_ms: u64,
    /// Unconditional end of an info query.
    pub info_query_timeout_ms: u64,
    /// Silence after which an info query with enough content is done.
    pub info_query_quiet_ms: u64,
    /// Characters an info query must accumulate before the quiet period applies.
    pub info_query_min_content: usize,
    /// Delay between detecting a completion phrase and finishing.
    pub completion_settle_ms: u64,
    /// Ceiling armed for every info query. Firing is a failure.
    pub emergency_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 10 * 60 * 1000,
            info_query_timeout_ms: 30_000,
            info_query_quiet_ms: 3_000,
            info_query_min_content: 50,
            completion_settle_ms: 2_000,
            emergency_timeout_ms: 60_000,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub const fn with_inactivity_timeout_ms(mut self, ms: u64) -> Self {
        self.inactivity_timeout_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_info_query_timeout_ms(mut self, ms: u64) -> Self {
        self.info_query_timeout_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_info_query_quiet_ms(mut self, ms: u64) -> Self {
        self.info_query_quiet_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_info_query_min_content(mut self, chars: usize) -> Self {
        self.info_query_min_content = chars;
        self
    }

    #[must_use]
    pub const fn with_completion_settle_ms(mut self, ms: u64) -> Self {
        self.completion_settle_ms = ms;
        self
    }

    #[must_use]
    pub const fn with_emergency_timeout_ms(mut self, ms: u64) -> Self {
        self.emergency_timeout_ms = ms;
        self
    }

    #[must_use]
    pub const fn info_query_timeout(&self) -> Duration {
        Duration::from_millis(self.info_query_timeout_ms)
    }

    #[must_use]
    pub const fn info_query_quiet(&self) -> Duration {
        Duration::from_millis(self.info_query_quiet_ms)
    }

    #[must_use]
    pub const fn completion_settle(&self) -> Duration {
        Duration::from_millis(self.completion_settle_ms)
    }

    #[must_use]
    pub const fn emergency_timeout(&self) -> Duration {
        Duration::from_millis(self.emergency_timeout_ms)
    }
}

/// Per-call options for `execute_task`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Bounded, completion-seeking mode instead of the sliding timeout.
    pub is_info_query: bool,
    /// Treat question-shaped messages as a wait state.
    pub detect_questions: bool,
    /// Overrides the configured inactivity window for this call.
    pub inactivity_timeout_ms: Option<u64>,
    /// Hard ceiling on the whole execution. Off by default.
    pub max_execution_time_ms: Option<u64>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            is_info_query: false,
            detect_questions: true,
            inactivity_timeout_ms: None,
            max_execution_time_ms: None,
        }
    }
}

impl ExecutionOptions {
    #[must_use]
    pub fn info_query() -> Self {
        Self {
            is_info_query: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_detect_questions(mut self, enabled: bool) -> Self {
        self.detect_questions = enabled;
        self
    }

    #[must_use]
    pub const fn with_inactivity_timeout_ms(mut self, ms: u64) -> Self {
        self.inactivity_timeout_ms = Some(ms);
        self
    }

    #[must_use]
    pub const fn with_max_execution_time_ms(mut self, ms: u64) -> Self {
        self.max_execution_time_ms = Some(ms);
        self
    }

    /// The inactivity window for this call.
    #[must_use]
    pub fn inactivity_timeout(&self, config: &OrchestratorConfig) -> Duration {
        Duration::from_millis(
            self.inactivity_timeout_ms
                .unwrap_or(config.inactivity_timeout_ms),
        )
    }

    #[must_use]
    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_time_ms.map(Duration::from_millis)
    }
}
