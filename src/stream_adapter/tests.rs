use super::test_utils::*;
use super::*;
use crate::questions::InMemoryQuestionBroker;
use crate::transport::ChannelSink;
use crate::types::TokenUsage;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

fn adapter_with(config: AdapterConfig) -> (Arc<StreamAdapter>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let adapter = StreamAdapter::new(
        JobId::from_string("job-1"),
        sink.clone(),
        Arc::new(InMemoryQuestionBroker::new()),
        config,
    );
    (Arc::new(adapter), sink)
}

fn adapter() -> (Arc<StreamAdapter>, Arc<RecordingSink>) {
    adapter_with(AdapterConfig::default())
}

fn channel_adapter(
    broker: Arc<InMemoryQuestionBroker>,
    config: AdapterConfig,
) -> (Arc<StreamAdapter>, mpsc::Receiver<StreamEvent>) {
    let (sink, rx) = ChannelSink::new(32);
    let adapter = StreamAdapter::new(JobId::from_string("job-q"), Arc::new(sink), broker, config);
    (Arc::new(adapter), rx)
}

async fn next_question_id(rx: &mut mpsc::Receiver<StreamEvent>) -> String {
    while let Some(event) = rx.recv().await {
        if let EventPayload::Question { question_id, .. } = event.payload {
            return question_id;
        }
    }
    panic!("stream ended without a question");
}

fn messages(sink: &RecordingSink) -> Vec<(String, Option<ContentType>)> {
    sink.payloads()
        .into_iter()
        .filter_map(|p| match p {
            EventPayload::Progress {
                message,
                content_type,
                ..
            }
            | EventPayload::Log {
                message,
                content_type,
                ..
            } => Some((message, content_type)),
            _ => None,
        })
        .collect()
}

// ===================
// Output Tests
// ===================

#[tokio::test]
async fn test_show_methods_map_to_event_kinds() {
    let (adapter, sink) = adapter();

    adapter.show_information("info").await;
    adapter.show_warning("careful").await;
    adapter.show_error("bad").await;
    adapter.show_success("yay").await;
    adapter.show_tool_use("read_file", Some("reading")).await;
    adapter.clear_progress().await;

    assert_eq!(
        sink.kinds(),
        vec![
            "information",
            "warning",
            "error",
            "information",
            "tool_use",
            "progress"
        ]
    );
    assert!(!adapter.is_closed());
}

#[tokio::test]
async fn test_verbose_mode_passes_raw_text() {
    let (adapter, sink) = adapter_with(AdapterConfig::verbose());

    adapter
        .show_progress("<thinking>hmm</thinking>hi", Some(50))
        .await;

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0],
        EventPayload::progress("<thinking>hmm</thinking>hi", Some(50))
    );
}

#[tokio::test]
async fn test_buffered_mode_filters_hidden_content_types() {
    let (adapter, sink) = adapter();

    adapter.show_progress("<thinking>abc", None).await;
    adapter
        .show_progress("def</thinking>ghi<path>a.rs</path>", None)
        .await;

    // The <path> markup itself is system and hidden; its text is plain content.
    assert_eq!(
        messages(&sink),
        vec![
            ("ghi".to_string(), Some(ContentType::Content)),
            ("a.rs".to_string(), Some(ContentType::Content)),
        ]
    );
}

#[tokio::test]
async fn test_content_types_can_be_toggled() {
    let (adapter, sink) = adapter();
    adapter
        .set_content_type_enabled(ContentType::Thinking, true)
        .await;
    adapter
        .set_content_type_enabled(ContentType::Content, false)
        .await;

    adapter
        .log("<thinking>plan</thinking>visible?", LogLevel::Info)
        .await;

    assert_eq!(
        messages(&sink),
        vec![("plan".to_string(), Some(ContentType::Thinking))]
    );
}

#[tokio::test]
async fn test_tool_call_fragments_carry_tool_name() {
    let (adapter, sink) = adapter();

    adapter
        .show_progress("<read_file>src/lib.rs</read_file>", None)
        .await;

    let payloads = sink.payloads();
    assert_eq!(payloads.len(), 1);
    let EventPayload::Progress {
        message,
        content_type,
        tool_name,
        ..
    } = &payloads[0]
    else {
        panic!("expected progress, got {:?}", payloads[0]);
    };
    assert_eq!(message, "src/lib.rs");
    assert_eq!(*content_type, Some(ContentType::ToolCall));
    assert_eq!(tool_name.as_deref(), Some("read_file"));
}

#[tokio::test]
async fn test_reset_buffer_drops_open_sections() {
    let (adapter, sink) = adapter();

    adapter.show_progress("<thinking>half", None).await;
    assert!(adapter.buffer_state().await.in_thinking_section);

    adapter.reset_buffer().await;
    adapter.show_progress("fresh", None).await;

    assert_eq!(
        messages(&sink),
        vec![("fresh".to_string(), Some(ContentType::Content))]
    );
}

#[tokio::test]
async fn test_token_usage_is_coerced_and_summarized() {
    let (adapter, sink) = adapter();

    assert!(
        adapter
            .emit_token_usage(&json!({"totalTokensIn": 10, "totalTokensOut": 5, "totalCost": 0.0012}))
            .await
    );
    adapter
        .emit_token_usage(&json!({"totalTokensIn": "oops", "totalTokensOut": -1}))
        .await;

    let payloads = sink.payloads();
    assert_eq!(
        payloads[0],
        EventPayload::token_usage(
            "Tokens: 10 in, 5 out | Cost: $0.0012",
            TokenUsage::new(10, 5).with_cost(0.0012)
        )
    );
    assert_eq!(
        payloads[1],
        EventPayload::token_usage("Tokens: 0 in, 0 out", TokenUsage::new(0, 0))
    );
}

// ===================
// Lifecycle Tests
// ===================

#[tokio::test(start_paused = true)]
async fn test_intermediate_completion_keeps_stream_open() {
    let (adapter, sink) = adapter();

    adapter
        .emit_completion("step done", None, None, CompletionKind::Intermediate)
        .await;

    assert_eq!(adapter.stream_state().await, StreamState::Open);
    assert_eq!(sink.kinds(), vec!["completion"]);
    assert!(adapter.emit_start(None).await);
}

#[tokio::test(start_paused = true)]
async fn test_final_completion_ends_stream_after_delay() {
    let (adapter, sink) = adapter();
    let task_id = TaskId::from_string("task-9");

    let started = tokio::time::Instant::now();
    adapter
        .emit_completion("all done", Some("42".to_string()), Some(&task_id), CompletionKind::Final)
        .await;

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(sink.kinds(), vec!["completion", "stream_end"]);
    assert_eq!(
        sink.payloads()[0],
        EventPayload::completion("all done", Some("42".to_string()), Some("task-9".to_string()), true)
    );
    assert!(adapter.is_closed());
    assert_eq!(sink.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_intermediate_then_final_yields_one_stream_end() {
    let (adapter, sink) = adapter();

    adapter
        .emit_completion("checkpoint", None, None, CompletionKind::Intermediate)
        .await;
    adapter
        .emit_completion("finished", None, None, CompletionKind::Final)
        .await;

    assert_eq!(sink.kinds(), vec!["completion", "completion", "stream_end"]);
    let flags: Vec<bool> = sink
        .payloads()
        .into_iter()
        .filter_map(|p| match p {
            EventPayload::Completion { is_complete, .. } => Some(is_complete),
            _ => None,
        })
        .collect();
    assert_eq!(flags, vec![false, true]);
}

#[tokio::test(start_paused = true)]
async fn test_no_writes_after_stream_end() {
    let (adapter, sink) = adapter();

    adapter.emit_error("boom").await;
    assert!(!adapter.emit_start(None).await);
    adapter.show_information("late").await;
    assert!(
        !adapter
            .emit_completion("late", None, None, CompletionKind::Final)
            .await
    );
    adapter.close().await;

    assert_eq!(sink.kinds(), vec!["error", "stream_end"]);
    assert_eq!(sink.count("stream_end"), 1);
    assert_eq!(sink.sent_after_close(), 0);
    assert_eq!(sink.close_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_terminals_schedule_one_stream_end() {
    let (adapter, sink) = adapter();

    let (a, b) = tokio::join!(
        adapter.emit_completion("done", None, None, CompletionKind::Final),
        adapter.emit_error("also failed"),
    );

    assert!(a);
    assert!(!b);
    assert_eq!(sink.kinds(), vec!["completion", "stream_end"]);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_while_ending_is_dropped() {
    let (adapter, sink) = adapter();

    let ending = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.emit_error("first failure").await })
    };
    while adapter.stream_state().await == StreamState::Open {
        tokio::task::yield_now().await;
    }
    assert_eq!(adapter.stream_state().await, StreamState::Ending);

    assert!(
        !adapter
            .emit_completion("too late", None, None, CompletionKind::Final)
            .await
    );
    assert!(!adapter.emit_error("second failure").await);
    assert!(adapter.emit_start(None).await);

    assert!(ending.await.unwrap());
    assert_eq!(sink.kinds(), vec!["error", "start", "stream_end"]);
    assert_eq!(sink.count("error"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_flushes_retained_tail() {
    let (adapter, sink) = adapter();

    adapter.show_progress("score <", None).await;
    adapter.emit_error("cut off").await;

    assert_eq!(sink.kinds(), vec!["progress", "progress", "error", "stream_end"]);
    let texts: Vec<String> = messages(&sink).into_iter().map(|(m, _)| m).collect();
    assert_eq!(texts, vec!["score ".to_string(), "<".to_string()]);
}

#[tokio::test]
async fn test_close_is_idempotent_and_silent() {
    let (adapter, sink) = adapter();

    adapter.close().await;
    adapter.close().await;

    assert!(adapter.is_closed());
    assert_eq!(adapter.stream_state().await, StreamState::Closed);
    assert!(sink.events().is_empty());
    assert_eq!(sink.close_calls(), 1);
}

// ===================
// Question Tests
// ===================

#[tokio::test]
async fn test_ask_question_returns_answer() {
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let (adapter, mut rx) = channel_adapter(broker.clone(), AdapterConfig::default());

    let asker = {
        let adapter = adapter.clone();
        tokio::spawn(async move {
            adapter
                .ask_question("Pick", &["red".to_string(), "blue".to_string()])
                .await
        })
    };

    let question_id = next_question_id(&mut rx).await;
    broker
        .submit_answer(&question_id, "blue".to_string())
        .await
        .unwrap();

    assert_eq!(asker.await.unwrap(), "blue");
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_question_event_carries_choices() {
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let (adapter, mut rx) = channel_adapter(broker.clone(), AdapterConfig::default());

    let asker = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.ask_confirmation("Deploy?", false).await })
    };

    let event = rx.recv().await.unwrap();
    let EventPayload::Question {
        question_id,
        message,
        choices,
        suggestions,
    } = event.payload
    else {
        panic!("expected question");
    };
    assert_eq!(message, "Deploy?");
    assert_eq!(choices, Some(vec!["yes".to_string(), "no".to_string()]));
    assert_eq!(suggestions, choices);

    broker.submit_answer(&question_id, "Y".to_string()).await.unwrap();
    assert!(asker.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_question_falls_back_to_default() {
    let broker = Arc::new(InMemoryQuestionBroker::new().with_timeout(Duration::from_secs(5)));
    let (adapter, mut rx) = channel_adapter(broker.clone(), AdapterConfig::default());

    let answer = adapter.ask_confirmation("Continue?", true).await;

    assert!(answer);
    assert_eq!(rx.recv().await.unwrap().payload.kind(), "question");
    let error = rx.recv().await.unwrap();
    assert!(matches!(error.payload, EventPayload::Error { ref error, .. } if error.contains("timed out")));
}

#[tokio::test(start_paused = true)]
async fn test_adapter_question_timeout_applies_first() {
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let config = AdapterConfig::default().with_question_timeout_ms(1_000);
    let (adapter, mut rx) = channel_adapter(broker.clone(), config);

    let answer = adapter
        .ask_question("Which?", &["first".to_string(), "second".to_string()])
        .await;
    assert_eq!(answer, "first");

    let question_id = next_question_id(&mut rx).await;
    let error = rx.recv().await.unwrap();
    assert!(matches!(error.payload, EventPayload::Error { ref error, .. } if error.contains("timed out")));

    assert_eq!(broker.pending_count(), 0);
    assert_eq!(
        broker.submit_answer(&question_id, "second".to_string()).await,
        Err(QuestionError::UnknownQuestion(question_id))
    );
}

#[tokio::test]
async fn test_close_cancels_pending_question() {
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let (adapter, mut rx) = channel_adapter(broker.clone(), AdapterConfig::default());

    let asker = {
        let adapter = adapter.clone();
        tokio::spawn(async move { adapter.ask_input("Name?", Some("anon")).await })
    };

    next_question_id(&mut rx).await;
    adapter.close().await;

    assert_eq!(asker.await.unwrap(), "anon");
    assert_eq!(broker.pending_count(), 0);
}

#[tokio::test]
async fn test_question_after_close_returns_default_immediately() {
    let broker = Arc::new(InMemoryQuestionBroker::new());
    let (adapter, _rx) = channel_adapter(broker.clone(), AdapterConfig::default());
    adapter.close().await;

    assert_eq!(adapter.ask_input("Name?", None).await, "");
    assert!(!adapter.ask_confirmation("Sure?", false).await);
    assert_eq!(adapter.ask_question("Pick one", &[]).await, "");
    let choices = ["keep".to_string(), "delete".to_string()];
    assert_eq!(adapter.ask_question("Pick one", &choices).await, "keep");
    assert_eq!(broker.pending_count(), 0);
}
