//! Agent Stream - streaming presentation and timeout-governed execution for agent tasks.
//!
//! This crate provides the pieces a service needs to run long-lived agent tasks and show
//! them to a client as a live event stream:
//! - Incremental, tag-aware classification of streamed task output
//! - A per-job stream adapter that turns presentation calls into wire events
//! - Interactive questions answered out of band, with timeouts and cancellation
//! - An execution orchestrator with inactivity, info-query and hard time limits
//!
//! # Example
//!
//! ```no_run
//! use agent_stream::{
//!     AdapterConfig, ChannelSink, ExecutionOptions, ExecutionOrchestrator,
//!     InMemoryQuestionBroker, JobId, ManagedTask, OrchestratorConfig, StreamAdapter,
//!     StreamTaskHandler, TaskEvent, TaskId, event_channel, sse_frames,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Job(TaskId);
//!
//! #[async_trait]
//! impl ManagedTask for Job {
//!     fn task_id(&self) -> &TaskId {
//!         &self.0
//!     }
//!
//!     async fn abort(&self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let (sink, rx) = ChannelSink::new(256);
//! let adapter = Arc::new(StreamAdapter::new(
//!     JobId::new(),
//!     Arc::new(sink),
//!     Arc::new(InMemoryQuestionBroker::new()),
//!     AdapterConfig::default(),
//! ));
//! let mut frames = sse_frames(rx);
//!
//! let (tx, events) = event_channel(64);
//! tx.send(TaskEvent::say("Hello!")).await?;
//! tx.send(TaskEvent::completed(None)).await?;
//!
//! let orchestrator = ExecutionOrchestrator::new(OrchestratorConfig::default());
//! let result = orchestrator
//!     .execute_task(
//!         Arc::new(Job(TaskId::new())),
//!         events,
//!         std::future::pending(),
//!         Arc::new(StreamTaskHandler::new(adapter)),
//!         ExecutionOptions::default(),
//!     )
//!     .await?;
//! assert!(result.success);
//!
//! use futures::StreamExt;
//! while let Some(frame) = frames.next().await {
//!     print!("{frame}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod events;
pub mod handler;
pub mod message_buffer;
pub mod orchestrator;
pub mod presenter;
pub mod questions;
pub mod stream_adapter;
pub mod transport;
mod types;

pub use events::{EventClock, EventPayload, LogLevel, StreamEvent};
pub use handler::{ExecutionHandler, LoggingHandler, StreamTaskHandler};
pub use message_buffer::{BufferState, MessageBuffer, ProcessedMessage};
pub use orchestrator::{
    ExecutionOptions, ExecutionOrchestrator, ManagedTask, MessageKind, OrchestratorConfig,
    TaskEvent, event_channel,
};
pub use presenter::TaskPresenter;
pub use questions::{
    AnswerRequest, InMemoryQuestionBroker, QuestionBroker, QuestionError, QuestionFuture,
};
pub use stream_adapter::{AdapterConfig, CompletionKind, DisplayMode, StreamAdapter, StreamState};
pub use transport::{ChannelSink, EventSink, encode_sse_frame, sse_frames};
pub use types::{
    ContentType, ExecutionReason, ExecutionResult, JobId, TaskId, TokenUsage, ToolUsage,
    ToolUsageStats,
};
