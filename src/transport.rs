//! Wire transport for [`StreamEvent`]s.
//!
//! [`EventSink`] is the seam between the adapter and whatever carries events to the client.
//! [`ChannelSink`] writes into a bounded tokio channel; [`sse_frames`] turns the receiving
//! end into a stream of SSE `data:` frames that an HTTP layer can use as a response body.

use crate::events::StreamEvent;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a send waits on a full channel before the event is dropped.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for a job's wire events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. Errors mean the consumer is gone.
    async fn send(&self, event: StreamEvent) -> Result<()>;

    /// Release the transport. Called once when the stream closes.
    async fn close(&self) {}
}

/// Sink backed by a bounded mpsc channel.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    send_timeout: Duration,
}

impl ChannelSink {
    /// Create a sink and the receiver that reads from it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::from_sender(tx), rx)
    }

    #[must_use]
    pub fn from_sender(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn sender(&self) -> Result<Option<mpsc::Sender<StreamEvent>>> {
        let guard = self.tx.lock().ok().context("lock poisoned")?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, event: StreamEvent) -> Result<()> {
        let Some(tx) = self.sender()? else {
            bail!("sink closed");
        };

        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::debug!("Event channel full, waiting for consumer...");
                match tokio::time::timeout(self.send_timeout, tx.send(event)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => bail!("event channel closed while sending"),
                    Err(_) => bail!("timed out waiting for event consumer"),
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => bail!("event channel closed"),
        }
    }

    async fn close(&self) {
        match self.tx.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(e) => log::warn!("Failed to close channel sink: {e}"),
        }
    }
}

/// Encode one event as an SSE frame: `data: <json>\n\n`.
///
/// # Errors
///
/// Returns an error if the event cannot be serialized.
pub fn encode_sse_frame(event: &StreamEvent) -> Result<String> {
    let json = serde_json::to_string(event).context("Failed to serialize stream event")?;
    Ok(format!("data: {json}\n\n"))
}

pub type FrameStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Turn a channel of events into SSE frames. The stream ends after `stream_end` or when
/// every sender is dropped.
#[must_use]
pub fn sse_frames(mut rx: mpsc::Receiver<StreamEvent>) -> FrameStream {
    Box::pin(async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let last = event.is_stream_end();
            match encode_sse_frame(&event) {
                Ok(frame) => yield frame,
                Err(e) => log::warn!("Dropping unencodable event: {e:#}"),
            }
            if last {
                break;
            }
        }
    })
}
