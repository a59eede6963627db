//! Text heuristics used by the orchestrator.
//!
//! Neither detector is a correctness guarantee. The explicit `WaitingForInput` event is the
//! reliable wait signal, and info queries always end at their bounded deadline.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Decides whether a message is the task asking the user something.
pub trait QuestionDetector: Send + Sync {
    fn is_question(&self, text: &str) -> bool;
}

/// Decides whether accumulated info-query output reads as a finished answer.
pub trait CompletionDetector: Send + Sync {
    fn is_complete(&self, accumulated: &str) -> bool;
}

const DEFAULT_QUESTION_PATTERN: &str = r"(?i)\b(would you like|do you want|should i|shall i|please (confirm|choose|select|provide|specify)|which (one|option)|choose (one|between|from)|select (one|an option))\b";

static QUESTION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(DEFAULT_QUESTION_PATTERN).ok());

/// Trailing `?` or a phrase from a small English keyword list.
#[derive(Clone, Debug)]
pub struct KeywordQuestionDetector {
    pattern: Option<Regex>,
}

impl KeywordQuestionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pattern: QUESTION_PATTERN.clone(),
        }
    }

    /// Use a custom keyword pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).context("Invalid question pattern")?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }
}

impl Default for KeywordQuestionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionDetector for KeywordQuestionDetector {
    fn is_question(&self, text: &str) -> bool {
        text.trim_end().ends_with('?')
            || self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(text))
    }
}

const DEFAULT_COMPLETION_PHRASES: &[&str] = &[
    "task completed",
    "task complete",
    "i have completed",
    "i've completed",
    "in summary",
    "to summarize",
    "hope this helps",
    "let me know if you",
];

/// Case-insensitive substring match against a list of closing phrases.
#[derive(Clone, Debug)]
pub struct PhraseCompletionDetector {
    phrases: Vec<String>,
}

impl PhraseCompletionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::with_phrases(DEFAULT_COMPLETION_PHRASES.iter().copied())
    }

    #[must_use]
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl Default for PhraseCompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionDetector for PhraseCompletionDetector {
    fn is_complete(&self, accumulated: &str) -> bool {
        let haystack = accumulated.to_lowercase();
        self.phrases.iter().any(|phrase| haystack.contains(phrase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_compiles() {
        assert!(QUESTION_PATTERN.is_some());
    }

    #[test]
    fn detects_questions() {
        let detector = KeywordQuestionDetector::new();
        assert!(detector.is_question("Which file should I edit?"));
        assert!(detector.is_question("Ready?  \n"));
        assert!(detector.is_question("Would you like me to continue"));
        assert!(detector.is_question("Please CONFIRM the deployment."));
        assert!(!detector.is_question("Reading src/lib.rs"));
        assert!(!detector.is_question("The ? operator propagates errors."));
    }

    #[test]
    fn custom_pattern() -> Result<()> {
        let detector = KeywordQuestionDetector::with_pattern(r"(?i)\bbitte\b")?;
        assert!(detector.is_question("Bitte wählen"));
        assert!(KeywordQuestionDetector::with_pattern("(unclosed").is_err());
        Ok(())
    }

    #[test]
    fn detects_completion_phrases() {
        let detector = PhraseCompletionDetector::new();
        assert!(detector.is_complete("...and that's it. In summary, the cache is warm."));
        assert!(!detector.is_complete("Still looking at the files"));

        let custom = PhraseCompletionDetector::with_phrases(["DONE", ""]);
        assert!(custom.is_complete("all done"));
        assert!(!custom.is_complete(""));
    }
}
