use crate::types::ContentType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// How streamed output is turned into events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// Each message becomes one event, unclassified.
    Verbose,
    /// Messages go through the tag classifier and are filtered by content type.
    #[default]
    Buffered,
}

/// Configuration for a [`StreamAdapter`](super::StreamAdapter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub display_mode: DisplayMode,
    /// Content types forwarded in buffered mode.
    pub enabled_content_types: BTreeSet<ContentType>,
    /// Pause between a terminal event and `stream_end`, letting the consumer flush.
    pub stream_end_delay_ms: u64,
    /// Upper bound on a single question wait, on top of the broker's own timeout.
    pub question_timeout_ms: Option<u64>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Buffered,
            enabled_content_types: BTreeSet::from([
                ContentType::Content,
                ContentType::ToolCall,
                ContentType::ToolResult,
            ]),
            stream_end_delay_ms: 100,
            question_timeout_ms: None,
        }
    }
}

impl AdapterConfig {
    /// Default settings with verbose output.
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            display_mode: DisplayMode::Verbose,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    #[must_use]
    pub fn with_content_types(mut self, kinds: impl IntoIterator<Item = ContentType>) -> Self {
        self.enabled_content_types = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_stream_end_delay_ms(mut self, delay_ms: u64) -> Self {
        self.stream_end_delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub const fn with_question_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.question_timeout_ms = Some(timeout_ms);
        self
    }

    #[must_use]
    pub const fn stream_end_delay(&self) -> Duration {
        Duration::from_millis(self.stream_end_delay_ms)
    }

    #[must_use]
    pub fn question_timeout(&self) -> Option<Duration> {
        self.question_timeout_ms.map(Duration::from_millis)
    }
}
