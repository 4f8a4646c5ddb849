//! Log bus types.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

/// Which pipe of the child a chunk was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of captured output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogChunk {
    pub stream: OutputStream,
    /// Raw text, including any trailing newline.
    pub data: String,
}

impl LogChunk {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            data: data.into(),
        }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            data: data.into(),
        }
    }
}

/// Identifies one subscription within a project channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(uuid::Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A live feed of chunks for one project id.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub project_id: String,
    pub(crate) rx: broadcast::Receiver<LogChunk>,
}

impl Subscription {
    /// Next chunk, or `None` once the subscription is closed.
    ///
    /// A subscriber that falls behind the channel capacity skips the
    /// chunks it missed.
    pub async fn recv(&mut self) -> Option<LogChunk> {
        loop {
            match self.rx.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(project_id = %self.project_id, skipped, "Subscriber lagged, chunks dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next chunk if one is already queued.
    pub fn try_recv(&mut self) -> Option<LogChunk> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => return Some(chunk),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    /// Convert into a `Stream` of chunks, skipping over lag gaps.
    pub fn into_stream(self) -> impl tokio_stream::Stream<Item = LogChunk> + Send {
        let project_id = self.project_id;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(chunk) => Some(chunk),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(project_id = %project_id, skipped, "Subscriber lagged, chunks dropped");
                None
            }
        })
    }
}

/// Bus statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Project ids with at least one registered subscriber.
    pub channel_count: usize,
    /// Registered subscriptions across all ids.
    pub subscriber_count: usize,
}
