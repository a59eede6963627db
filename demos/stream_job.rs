//! Streams a simulated job to stdout as SSE frames.
//!
//! The job thinks, reports progress, asks for a confirmation that a second task answers
//! through the question broker, then completes with token usage.
//!
//! # Running
//!
//! ```bash
//! cargo run --example stream_job
//! ```
//!
//! To see debug logs from the library:
//! ```bash
//! RUST_LOG=agent_stream=debug cargo run --example stream_job
//! ```

use agent_stream::{
    AdapterConfig, ChannelSink, ExecutionOptions, ExecutionOrchestrator, InMemoryQuestionBroker,
    JobId, ManagedTask, OrchestratorConfig, QuestionBroker, StreamAdapter, StreamTaskHandler,
    TaskEvent, TaskId, TaskPresenter, TokenUsage, event_channel, sse_frames,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

struct SimulatedJob {
    id: TaskId,
}

#[async_trait]
impl ManagedTask for SimulatedJob {
    fn task_id(&self) -> &TaskId {
        &self.id
    }

    async fn abort(&self) -> anyhow::Result<()> {
        log::info!("Aborting {}", self.id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `log` records and, through tracing's `log` feature, orchestrator spans and events
    env_logger::init();

    let job_id = JobId::new();
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let (sink, rx) = ChannelSink::new(256);
    let adapter = Arc::new(StreamAdapter::new(
        job_id.clone(),
        Arc::new(sink),
        broker.clone(),
        AdapterConfig::default(),
    ));

    // Client side: print every frame until stream_end
    let printer = tokio::spawn(async move {
        let mut frames = sse_frames(rx);
        while let Some(frame) = frames.next().await {
            print!("{frame}");
        }
    });

    // Human side: answer the first question that shows up for this job
    let answerer = {
        let broker = broker.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            loop {
                if let Some(question) = broker.pending_for_job(&job_id).into_iter().next() {
                    if let Err(e) = broker.submit_answer(&question.question_id, "yes".into()).await {
                        eprintln!("Answer rejected: {e}");
                    }
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    };

    // The job itself reports through its event channel and asks through the presenter
    let (tx, events) = event_channel(64);
    let presenter = adapter.clone();
    let job = tokio::spawn(async move {
        tx.send(TaskEvent::Started).await?;
        tx.send(TaskEvent::partial("<thinking>Check the build first.</thinking>"))
            .await?;
        tx.send(TaskEvent::partial("Build finished. ")).await?;

        tx.send(TaskEvent::WaitingForInput).await?;
        let deploy = presenter
            .ask_confirmation("Deploy to production?", false)
            .await;
        tx.send(TaskEvent::AskResponded).await?;

        let summary = if deploy { "Deployed." } else { "Skipped deploy." };
        tx.send(TaskEvent::say(summary)).await?;
        tx.send(TaskEvent::TokenUsageUpdated(
            TokenUsage::new(1200, 340).with_cost(0.0123),
        ))
        .await?;
        tx.send(TaskEvent::completed(None)).await?;
        anyhow::Ok(())
    });

    let task_id = TaskId::new();
    let orchestrator = ExecutionOrchestrator::new(OrchestratorConfig::default());
    let result = orchestrator
        .execute_task(
            Arc::new(SimulatedJob { id: task_id }),
            events,
            async move { job.await? },
            Arc::new(StreamTaskHandler::new(adapter)),
            ExecutionOptions::default(),
        )
        .await?;

    printer.await?;
    answerer.abort();

    println!("---");
    println!(
        "success: {}, reason: {}, {}ms",
        result.success, result.reason, result.duration_ms
    );

    Ok(())
}
