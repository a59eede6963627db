use super::*;
use crate::types::TokenUsage;
use anyhow::bail;
use async_trait::async_trait;
use std::sync::atomic::AtomicUsize;

// ===================
// Mock Task
// ===================

pub struct MockTask {
    id: TaskId,
    aborts: AtomicUsize,
    disposals: AtomicUsize,
    fail_dispose: bool,
}

impl MockTask {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::from_string(id),
            aborts: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
            fail_dispose: false,
        })
    }

    pub fn failing_dispose(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::from_string(id),
            aborts: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
            fail_dispose: true,
        })
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedTask for MockTask {
    fn task_id(&self) -> &TaskId {
        &self.id
    }

    async fn abort(&self) -> Result<()> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        if self.fail_dispose {
            bail!("dispose failed");
        }
        Ok(())
    }
}

// ===================
// Recording Handler
// ===================

/// Handler that records the name of every callback it receives.
#[derive(Default)]
pub struct RecordingHandler {
    calls: Mutex<Vec<String>>,
    usage: Mutex<Vec<TokenUsage>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn usage(&self) -> Vec<TokenUsage> {
        self.usage.lock().unwrap().clone()
    }

    /// Started first, exactly one terminal callback last.
    pub fn assert_lifecycle(&self, terminal: &str) {
        let calls = self.calls();
        assert_eq!(calls.first().map(String::as_str), Some("started"), "{calls:?}");
        assert_eq!(calls.last().map(String::as_str), Some(terminal), "{calls:?}");
        assert_eq!(self.count("started"), 1, "{calls:?}");
        assert_eq!(
            self.count("completed") + self.count("failed"),
            1,
            "{calls:?}"
        );
    }
}

#[async_trait]
impl ExecutionHandler for RecordingHandler {
    async fn on_task_started(&self, _task_id: &TaskId) {
        self.record("started");
    }

    async fn on_task_message(&self, _task_id: &TaskId, text: &str, _kind: MessageKind, _partial: bool) {
        self.record(format!("message:{text}"));
    }

    async fn on_mode_switched(&self, _task_id: &TaskId, mode: &str) {
        self.record(format!("mode:{mode}"));
    }

    async fn on_token_usage(&self, _task_id: &TaskId, usage: &TokenUsage) {
        self.usage.lock().unwrap().push(usage.clone());
        self.record("usage");
    }

    async fn on_tool_failed(&self, _task_id: &TaskId, tool: &str, _error: &str) {
        self.record(format!("tool_failed:{tool}"));
    }

    async fn on_waiting_for_input(&self, _task_id: &TaskId) {
        self.record("paused");
    }

    async fn on_input_received(&self, _task_id: &TaskId) {
        self.record("resumed");
    }

    async fn on_task_completed(&self, _task_id: &TaskId, _result: &ExecutionResult) {
        self.record("completed");
    }

    async fn on_task_failed(&self, _task_id: &TaskId, _result: &ExecutionResult) {
        self.record("failed");
    }
}

// ===================
// Completion Futures
// ===================

/// A completion future that resolves when the sender fires and never resolves if the
/// sender is dropped.
pub fn completion_channel() -> (
    oneshot::Sender<Result<()>>,
    impl Future<Output = Result<()>> + Send,
) {
    let (tx, rx) = oneshot::channel();
    let future = async move {
        match rx.await {
            Ok(result) => result,
            Err(_) => std::future::pending().await,
        }
    };
    (tx, future)
}

/// Wait until the orchestrator reports `task_id` as running.
pub async fn wait_until_active(orchestrator: &ExecutionOrchestrator, task_id: &TaskId) {
    while !orchestrator.is_active(task_id) {
        tokio::task::yield_now().await;
    }
}
