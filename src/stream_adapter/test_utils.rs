use crate::events::{EventPayload, StreamEvent};
use crate::transport::EventSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ===================
// Recording Sink
// ===================

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StreamEvent>>,
    close_calls: AtomicUsize,
    sent_after_close: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events().into_iter().map(|e| e.payload).collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.payload.kind()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn sent_after_close(&self) -> usize {
        self.sent_after_close.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, event: StreamEvent) -> Result<()> {
        if self.close_calls() > 0 {
            self.sent_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}
