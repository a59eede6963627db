//! Tag vocabularies recognised by the classifier.

/// Tags that open and close a reasoning section.
pub const THINKING_TAG: &str = "thinking";

/// Tags naming a tool invocation. Text between the open and close tag is a tool call.
pub const TOOL_TAGS: &[&str] = &[
    "read_file",
    "write_to_file",
    "apply_diff",
    "search_files",
    "list_files",
    "list_code_definition_names",
    "execute_command",
    "browser_action",
    "insert_content",
    "search_and_replace",
    "ask_followup_question",
    "attempt_completion",
    "use_mcp_tool",
    "access_mcp_resource",
    "switch_mode",
    "new_task",
    "fetch_instructions",
];

/// Parameter markup inside tool calls. Emitted verbatim as `system`.
pub const SYSTEM_TAGS: &[&str] = &[
    "args",
    "path",
    "content",
    "line_count",
    "file",
    "files",
    "coordinate",
    "size",
    "text",
    "url",
    "action",
    "server_name",
    "tool_name",
    "arguments",
    "uri",
    "question",
    "follow_up",
    "suggest",
    "command",
    "cwd",
    "mode_slug",
    "reason",
    "mode",
    "message",
    "task",
];

/// Result markup. Emitted verbatim as `tool_result`.
pub const RESULT_TAGS: &[&str] = &["result", "error", "output", "response"];

/// Which vocabulary a tag name belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagClass {
    Thinking,
    Tool,
    System,
    Result,
    Unknown,
}

impl TagClass {
    #[must_use]
    pub fn of(name: &str) -> Self {
        if name == THINKING_TAG {
            Self::Thinking
        } else if TOOL_TAGS.contains(&name) {
            Self::Tool
        } else if SYSTEM_TAGS.contains(&name) {
            Self::System
        } else if RESULT_TAGS.contains(&name) {
            Self::Result
        } else {
            Self::Unknown
        }
    }
}
