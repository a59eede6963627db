//! Blocking question/answer exchanges with a remote caller.
//!
//! A question is registered with a [`QuestionBroker`], announced to the client as a
//! `question` event, and answered later through [`QuestionBroker::submit_answer`] (usually
//! from an HTTP handler that received an [`AnswerRequest`]). The asker awaits a
//! [`QuestionFuture`] that resolves exactly once: with the answer, on timeout, or on
//! cancellation.

use crate::types::JobId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Default time a question stays open before it is rejected.
pub const DEFAULT_QUESTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Why a question did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    #[error("question timed out waiting for an answer")]
    TimedOut,
    #[error("question cancelled: {reason}")]
    Cancelled { reason: String },
    #[error("unknown or already answered question: {0}")]
    UnknownQuestion(String),
    #[error("question broker closed")]
    Closed,
}

pub type QuestionOutcome = Result<String, QuestionError>;

/// Resolves with the answer text, or the reason there is none.
#[derive(Debug)]
pub struct QuestionFuture {
    question_id: String,
    rx: oneshot::Receiver<QuestionOutcome>,
}

impl QuestionFuture {
    #[must_use]
    pub fn question_id(&self) -> &str {
        &self.question_id
    }
}

impl Future for QuestionFuture {
    type Output = QuestionOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QuestionError::Closed)))
    }
}

/// Body of an answer submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

/// Public view of a pending question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    pub question_id: String,
    pub job_id: JobId,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// Registry of pending questions keyed by question id.
#[async_trait]
pub trait QuestionBroker: Send + Sync {
    /// Register a question and return its id with the future that settles it.
    async fn create_question(
        &self,
        job_id: &JobId,
        prompt: &str,
        suggestions: Option<Vec<String>>,
    ) -> Result<(String, QuestionFuture), QuestionError>;

    /// Answer a pending question. Fails with [`QuestionError::UnknownQuestion`] if the id is
    /// unknown or was already settled.
    async fn submit_answer(&self, question_id: &str, answer: String) -> Result<(), QuestionError>;

    /// Reject one pending question. Returns `false` if it was unknown or already settled.
    async fn cancel_question(&self, question_id: &str, reason: &str) -> bool;

    /// Reject every pending question of a job. Returns how many were cancelled.
    async fn cancel_job_questions(&self, job_id: &JobId, reason: &str) -> usize;
}

struct PendingQuestion {
    info: QuestionInfo,
    tx: oneshot::Sender<QuestionOutcome>,
    expiry: Option<JoinHandle<()>>,
}

impl PendingQuestion {
    fn settle(self, outcome: QuestionOutcome) {
        if let Some(expiry) = self.expiry {
            expiry.abort();
        }
        if self.tx.send(outcome).is_err() {
            log::debug!(
                "Question {} settled after its asker went away",
                self.info.question_id
            );
        }
    }
}

type PendingTable = Arc<Mutex<HashMap<String, PendingQuestion>>>;

/// Process-local broker. Removing an entry from the table is the only way a question is
/// settled, so answer, timeout, and cancellation can race freely.
#[derive(Clone)]
pub struct InMemoryQuestionBroker {
    pending: PendingTable,
    timeout: Duration,
}

impl InMemoryQuestionBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout: DEFAULT_QUESTION_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    #[must_use]
    pub fn pending_for_job(&self, job_id: &JobId) -> Vec<QuestionInfo> {
        lock(&self.pending)
            .values()
            .filter(|q| &q.info.job_id == job_id)
            .map(|q| q.info.clone())
            .collect()
    }

    /// Reject every pending question, whatever its job.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<PendingQuestion> = lock(&self.pending).drain().map(|(_, q)| q).collect();
        let count = drained.len();
        for question in drained {
            question.settle(Err(QuestionError::Closed));
        }
        count
    }

    fn spawn_expiry(&self, question_id: String) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = lock(&pending).remove(&question_id);
            // Our own handle is dropped, not aborted.
            if let Some(PendingQuestion { tx, .. }) = expired {
                log::debug!("Question {question_id} timed out after {timeout:?}");
                if tx.send(Err(QuestionError::TimedOut)).is_err() {
                    log::debug!("Question {question_id} timed out after its asker went away");
                }
            }
        })
    }
}

impl Default for InMemoryQuestionBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(table: &PendingTable) -> MutexGuard<'_, HashMap<String, PendingQuestion>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl QuestionBroker for InMemoryQuestionBroker {
    async fn create_question(
        &self,
        job_id: &JobId,
        prompt: &str,
        suggestions: Option<Vec<String>>,
    ) -> Result<(String, QuestionFuture), QuestionError> {
        let question_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let info = QuestionInfo {
            question_id: question_id.clone(),
            job_id: job_id.clone(),
            prompt: prompt.to_string(),
            suggestions,
        };

        {
            let mut pending = lock(&self.pending);
            let expiry = self.spawn_expiry(question_id.clone());
            pending.insert(
                question_id.clone(),
                PendingQuestion {
                    info,
                    tx,
                    expiry: Some(expiry),
                },
            );
        }

        log::debug!("Registered question {question_id} for job {job_id}");
        let future = QuestionFuture {
            question_id: question_id.clone(),
            rx,
        };
        Ok((question_id, future))
    }

    async fn submit_answer(&self, question_id: &str, answer: String) -> Result<(), QuestionError> {
        let question = lock(&self.pending)
            .remove(question_id)
            .ok_or_else(|| QuestionError::UnknownQuestion(question_id.to_string()))?;
        log::debug!("Question {question_id} answered");
        question.settle(Ok(answer));
        Ok(())
    }

    async fn cancel_question(&self, question_id: &str, reason: &str) -> bool {
        let Some(question) = lock(&self.pending).remove(question_id) else {
            return false;
        };
        log::debug!("Question {question_id} cancelled: {reason}");
        question.settle(Err(QuestionError::Cancelled {
            reason: reason.to_string(),
        }));
        true
    }

    async fn cancel_job_questions(&self, job_id: &JobId, reason: &str) -> usize {
        let cancelled: Vec<PendingQuestion> = {
            let mut pending = lock(&self.pending);
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, q)| &q.info.job_id == job_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };

        let count = cancelled.len();
        for question in cancelled {
            question.settle(Err(QuestionError::Cancelled {
                reason: reason.to_string(),
            }));
        }
        if count > 0 {
            log::debug!("Cancelled {count} pending question(s) for job {job_id}: {reason}");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from_string(id)
    }

    #[tokio::test]
    async fn answer_resolves_future() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let (id, future) = broker.create_question(&job("a"), "Proceed?", None).await?;
        assert_eq!(future.question_id(), id);
        assert_eq!(broker.pending_count(), 1);

        broker.submit_answer(&id, "yes".to_string()).await?;
        assert_eq!(future.await, Ok("yes".to_string()));
        assert_eq!(broker.pending_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn second_answer_is_rejected() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let (id, future) = broker.create_question(&job("a"), "Name?", None).await?;

        broker.submit_answer(&id, "first".to_string()).await?;
        let second = broker.submit_answer(&id, "second".to_string()).await;
        assert_eq!(second, Err(QuestionError::UnknownQuestion(id)));
        assert_eq!(future.await, Ok("first".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_question_rejects_late_answer() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let (id, future) = broker.create_question(&job("a"), "Port?", None).await?;

        assert!(broker.cancel_question(&id, "gave up").await);
        assert!(!broker.cancel_question(&id, "again").await);
        assert_eq!(
            future.await,
            Err(QuestionError::Cancelled {
                reason: "gave up".to_string()
            })
        );
        assert_eq!(broker.pending_count(), 0);
        assert_eq!(
            broker.submit_answer(&id, "8080".to_string()).await,
            Err(QuestionError::UnknownQuestion(id))
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_question_is_rejected() {
        let broker = InMemoryQuestionBroker::new();
        let result = broker.submit_answer("nope", "x".to_string()).await;
        assert!(matches!(result, Err(QuestionError::UnknownQuestion(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_question_times_out() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new().with_timeout(Duration::from_secs(2));
        let (id, future) = broker.create_question(&job("a"), "Hello?", None).await?;

        assert_eq!(future.await, Err(QuestionError::TimedOut));
        assert_eq!(broker.pending_count(), 0);
        assert!(broker.submit_answer(&id, "late".to_string()).await.is_err());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn answered_question_does_not_time_out_later() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new().with_timeout(Duration::from_secs(1));
        let (id, future) = broker.create_question(&job("a"), "Q", None).await?;
        broker.submit_answer(&id, "ok".to_string()).await?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(future.await, Ok("ok".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn cancel_only_touches_one_job() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let (_, a1) = broker.create_question(&job("a"), "1", None).await?;
        let (_, a2) = broker.create_question(&job("a"), "2", None).await?;
        let (b_id, b) = broker.create_question(&job("b"), "3", None).await?;

        assert_eq!(broker.cancel_job_questions(&job("a"), "stream closed").await, 2);
        let cancelled = QuestionError::Cancelled {
            reason: "stream closed".to_string(),
        };
        assert_eq!(a1.await, Err(cancelled.clone()));
        assert_eq!(a2.await, Err(cancelled));

        assert_eq!(broker.pending_for_job(&job("b")).len(), 1);
        broker.submit_answer(&b_id, "fine".to_string()).await?;
        assert_eq!(b.await, Ok("fine".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn pending_for_job_exposes_prompt_and_suggestions() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let suggestions = Some(vec!["red".to_string(), "blue".to_string()]);
        broker
            .create_question(&job("a"), "Colour?", suggestions.clone())
            .await?;

        let pending = broker.pending_for_job(&job("a"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].prompt, "Colour?");
        assert_eq!(pending[0].suggestions, suggestions);
        assert!(broker.pending_for_job(&job("other")).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_closes_everything() -> anyhow::Result<()> {
        let broker = InMemoryQuestionBroker::new();
        let (_, future) = broker.create_question(&job("a"), "Q", None).await?;
        assert_eq!(broker.shutdown(), 1);
        assert_eq!(future.await, Err(QuestionError::Closed));
        Ok(())
    }

    #[test]
    fn answer_request_deserializes() {
        let body: AnswerRequest = serde_json::from_str(r#"{"answer":"42"}"#).unwrap();
        assert_eq!(body.answer, "42");
    }
}
