//! Presentation contract a running task talks to.
//!
//! The task never writes wire events itself. It calls a [`TaskPresenter`], which decides how
//! to show output and how to ask the remote caller for input. The `ask_*` methods suspend
//! until an answer arrives and never fail: on timeout or cancellation they fall back to the
//! caller's default (for [`TaskPresenter::ask_question`], the first choice).

use crate::events::LogLevel;
use async_trait::async_trait;

#[async_trait]
pub trait TaskPresenter: Send + Sync {
    async fn show_information(&self, message: &str);

    async fn show_warning(&self, message: &str);

    async fn show_error(&self, message: &str);

    async fn show_success(&self, message: &str);

    /// Show streaming output. `progress` is an optional percentage.
    async fn show_progress(&self, message: &str, progress: Option<u8>);

    async fn show_tool_use(&self, tool_name: &str, message: Option<&str>);

    async fn clear_progress(&self);

    async fn log(&self, message: &str, level: LogLevel);

    /// Ask with a fixed set of choices.
    ///
    /// The first choice is the default: it is returned on timeout or cancellation, so list
    /// the safe option first. With no choices the fallback is an empty string.
    async fn ask_question(&self, prompt: &str, choices: &[String]) -> String;

    /// Ask a yes/no question. Falls back to `default`.
    async fn ask_confirmation(&self, prompt: &str, default: bool) -> bool;

    /// Ask for free text. Falls back to `default`, or an empty string.
    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> String;
}

/// Interpret a free-text answer to a confirmation question.
#[must_use]
pub fn parse_confirmation(answer: &str) -> bool {
    let answer = answer.trim();
    ["yes", "y", "true"]
        .iter()
        .any(|accepted| answer.eq_ignore_ascii_case(accepted))
}
