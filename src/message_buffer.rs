//! Incremental, tag-aware classification of streamed task output.
//!
//! A task streams its output as arbitrary chunks. Structural markup (`<thinking>`,
//! `<read_file>`, `<path>`, ...) may be split anywhere, including in the middle of a tag
//! name. [`MessageBuffer`] accepts chunks in arrival order and returns the
//! [`ProcessedMessage`] fragments that are complete so far, retaining any cut-off tag for
//! the next call.
//!
//! # Classification
//!
//! - `<thinking>` toggles a reasoning section; text inside is [`ContentType::Thinking`].
//! - A tool tag (see [`vocabulary::TOOL_TAGS`]) toggles a tool section; text inside is
//!   [`ContentType::ToolCall`] tagged with the tool name.
//! - Parameter tags are emitted verbatim as [`ContentType::System`], result tags as
//!   [`ContentType::ToolResult`]; neither changes state.
//! - Unknown tags are emitted verbatim as [`ContentType::Content`].
//! - Plain text follows the current state: thinking, then tool call, then content.
//!
//! Malformed input never fails: unmatched close tags are ignored and stray `<` characters
//! are treated as text.
//!
//! # Example
//!
//! ```
//! use agent_stream::message_buffer::MessageBuffer;
//! use agent_stream::ContentType;
//!
//! let mut buffer = MessageBuffer::new();
//! assert!(buffer.process_message("<think").is_empty());
//!
//! let messages = buffer.process_message("ing>pondering</thinking>answer");
//! assert_eq!(messages[0].content, "pondering");
//! assert_eq!(messages[0].content_type, ContentType::Thinking);
//! assert_eq!(messages[1].content, "answer");
//! assert_eq!(messages[1].content_type, ContentType::Content);
//! ```

mod scanner;
pub mod vocabulary;

use crate::types::ContentType;
use scanner::{Scan, Tag, scan};
use serde::{Deserialize, Serialize};
use vocabulary::{TOOL_TAGS, TagClass};

/// A classified fragment of task output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedMessage {
    pub content: String,
    pub content_type: ContentType,
    /// False while the fragment belongs to a thinking or tool section that is still open.
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ProcessedMessage {
    fn markup(raw: &str, content_type: ContentType) -> Self {
        Self {
            content: raw.to_string(),
            content_type,
            is_complete: true,
            tool_name: None,
        }
    }
}

/// Classification state owned by one [`MessageBuffer`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferState {
    /// Unconsumed input, starting at a cut-off tag.
    pub buffer: String,
    pub in_thinking_section: bool,
    pub in_tool_section: bool,
    pub current_tool_name: Option<String>,
    /// Currently open thinking/tool tags, innermost last.
    pub tag_stack: Vec<String>,
    /// Text collected but not yet emitted.
    pub pending_content: String,
}

/// Stateful chunk classifier. One instance per job; never shared across jobs.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    state: BufferState,
}

impl MessageBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and return every fragment that is complete so far.
    pub fn process_message(&mut self, chunk: &str) -> Vec<ProcessedMessage> {
        self.state.buffer.push_str(chunk);
        let input = std::mem::take(&mut self.state.buffer);
        let mut messages = Vec::new();
        let mut pos = 0;

        loop {
            match scan(&input, pos) {
                Scan::End => break,
                Scan::Text { end } => {
                    self.state.pending_content.push_str(&input[pos..end]);
                    pos = end;
                }
                Scan::Stray => {
                    self.state.pending_content.push('<');
                    pos += 1;
                }
                Scan::Incomplete => {
                    self.flush_pending(&mut messages);
                    self.state.buffer = input[pos..].to_string();
                    return messages;
                }
                Scan::Tag(tag) => {
                    self.flush_pending(&mut messages);
                    self.apply_tag(tag, &mut messages);
                    pos = tag.end;
                }
            }
        }

        self.flush_pending(&mut messages);
        messages
    }

    /// Emit whatever is still retained (an unterminated `<...` tail) as text.
    pub fn flush(&mut self) -> Vec<ProcessedMessage> {
        let tail = std::mem::take(&mut self.state.buffer);
        self.state.pending_content.push_str(&tail);
        let mut messages = Vec::new();
        self.flush_pending(&mut messages);
        messages
    }

    /// Clear all state, e.g. between tasks that share an adapter.
    pub fn reset(&mut self) {
        self.state = BufferState::default();
    }

    #[must_use]
    pub const fn state(&self) -> &BufferState {
        &self.state
    }

    /// Input retained for the next call.
    #[must_use]
    pub fn buffered_content(&self) -> &str {
        &self.state.buffer
    }

    const fn current_content_type(&self) -> ContentType {
        if self.state.in_thinking_section {
            ContentType::Thinking
        } else if self.state.in_tool_section {
            ContentType::ToolCall
        } else {
            ContentType::Content
        }
    }

    fn flush_pending(&mut self, messages: &mut Vec<ProcessedMessage>) {
        if self.state.pending_content.is_empty() {
            return;
        }
        let content_type = self.current_content_type();
        let tool_name = if content_type == ContentType::ToolCall {
            self.state.current_tool_name.clone()
        } else {
            None
        };
        messages.push(ProcessedMessage {
            content: std::mem::take(&mut self.state.pending_content),
            content_type,
            is_complete: !(self.state.in_thinking_section || self.state.in_tool_section),
            tool_name,
        });
    }

    fn apply_tag(&mut self, tag: Tag<'_>, messages: &mut Vec<ProcessedMessage>) {
        match TagClass::of(tag.name) {
            TagClass::Thinking | TagClass::Tool if tag.self_closing => {}
            TagClass::Thinking | TagClass::Tool => {
                if tag.closing {
                    self.close_section(tag.name);
                } else {
                    self.state.tag_stack.push(tag.name.to_string());
                }
                self.sync_sections();
            }
            TagClass::System => messages.push(ProcessedMessage::markup(tag.raw, ContentType::System)),
            TagClass::Result => {
                messages.push(ProcessedMessage::markup(tag.raw, ContentType::ToolResult));
            }
            TagClass::Unknown => {
                messages.push(ProcessedMessage::markup(tag.raw, ContentType::Content));
            }
        }
    }

    /// Pop the innermost open tag with this name. A close tag with no match is ignored.
    fn close_section(&mut self, name: &str) {
        if let Some(idx) = self.state.tag_stack.iter().rposition(|open| open == name) {
            self.state.tag_stack.remove(idx);
        } else {
            log::debug!("Ignoring unmatched close tag </{name}>");
        }
    }

    /// Derive the section flags from the open-tag stack.
    fn sync_sections(&mut self) {
        self.state.in_thinking_section = self
            .state
            .tag_stack
            .iter()
            .any(|open| open == vocabulary::THINKING_TAG);
        self.state.current_tool_name = self
            .state
            .tag_stack
            .iter()
            .rev()
            .find(|open| TOOL_TAGS.contains(&open.as_str()))
            .cloned();
        self.state.in_tool_section = self.state.current_tool_name.is_some();
    }
}
