//! Subscriber: receives new-file notifications and queues them.
//!
//! Delivery is best effort and at most once. Malformed notifications are
//! dropped without retry.

use futures::StreamExt;
use futures::channel::mpsc;
use opentelemetry::KeyValue;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use zeromq::{Socket, SocketEvent, SocketRecv, SubSocket};

use crate::engine::pool::PoolStats;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::model::WorkItem;
use crate::queue::DispatchQueue;
use crate::telemetry::metrics;

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// A stream of raw notification payloads.
pub trait NotificationSource: Send {
    /// Wait for the next payload.
    fn recv(&mut self) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

// ---------------------------------------------------------------------------
// ZeroMQ
// ---------------------------------------------------------------------------

/// SUB socket subscribed to every topic.
///
/// The socket does not reconnect on its own. A disconnect reported by the
/// socket monitor marks it stale, and the next receive builds a new one.
pub struct ZmqSource {
    endpoint: String,
    socket: SubSocket,
    events: mpsc::Receiver<SocketEvent>,
    stale: bool,
}

impl ZmqSource {
    /// Connect to `endpoint`, retrying every second until it succeeds.
    ///
    /// Returns `None` if shutdown is requested first.
    pub async fn connect(endpoint: &str, token: &CancellationToken) -> Result<Option<Self>> {
        loop {
            match Self::subscribe(endpoint).await {
                Ok((socket, events)) => {
                    info!(endpoint, "subscribed to all topics");
                    return Ok(Some(Self {
                        endpoint: endpoint.to_string(),
                        socket,
                        events,
                        stale: false,
                    }));
                }
                Err(e) => warn!(endpoint, error = %e, "failed to connect, retrying"),
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(None),
                _ = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
        }
    }

    async fn subscribe(endpoint: &str) -> Result<(SubSocket, mpsc::Receiver<SocketEvent>)> {
        let mut socket = SubSocket::new();
        let events = socket.monitor();
        socket.connect(endpoint).await?;
        socket.subscribe("").await?;
        Ok((socket, events))
    }

    /// One attempt at replacing a dead socket. The receive loop backs off
    /// between failed attempts.
    async fn reconnect(&mut self) -> Result<()> {
        let (socket, events) = Self::subscribe(&self.endpoint).await?;
        self.socket = socket;
        self.events = events;
        self.stale = false;
        info!(endpoint = %self.endpoint, "resubscribed after disconnect");
        Ok(())
    }
}

impl NotificationSource for ZmqSource {
    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            if self.stale {
                self.reconnect().await?;
            }

            tokio::select! {
                message = self.socket.recv() => match message {
                    Ok(message) => {
                        return Ok(message
                            .get(0)
                            .map(|frame| frame.to_vec())
                            .unwrap_or_default());
                    }
                    Err(e) => {
                        self.stale = true;
                        return Err(e.into());
                    }
                },
                event = self.events.next() => match event {
                    Some(SocketEvent::Disconnected(..)) | None => {
                        warn!(endpoint = %self.endpoint, "publisher disconnected");
                        self.stale = true;
                    }
                    Some(_) => trace!("socket event"),
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

pub struct Subscriber<S> {
    source: S,
    queue: DispatchQueue,
    lifecycle: Lifecycle,
    recv_timeout: Duration,
    stats: Option<Arc<PoolStats>>,
}

impl<S: NotificationSource> Subscriber<S> {
    pub fn new(source: S, queue: DispatchQueue, lifecycle: Lifecycle) -> Self {
        Self {
            source,
            queue,
            lifecycle,
            recv_timeout: Duration::from_millis(1500),
            stats: None,
        }
    }

    /// Bound on a single receive, so pending snapshot requests are seen.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Worker counters included in state snapshots.
    pub fn with_stats(mut self, stats: Arc<PoolStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Receive and queue notifications until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let token = self.lifecycle.token();
        debug!("subscriber started");

        loop {
            if self.lifecycle.take_snapshot_request() {
                self.log_snapshot();
            }

            let received = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = tokio::time::timeout(self.recv_timeout, self.source.recv()) => received,
            };

            match received {
                Err(_) => trace!("receive timed out"),
                Ok(Ok(payload)) => {
                    self.accept(&payload)?;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "receive failed");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_INTERVAL) => {}
                    }
                }
            }
        }

        debug!(pending = self.queue.len(), "subscriber finished");
        Ok(())
    }

    /// Decode one payload and queue it. Returns whether it was queued.
    fn accept(&self, payload: &[u8]) -> Result<bool> {
        let item = match WorkItem::from_notification(payload) {
            Ok(item) => item,
            Err(e) => {
                trace!(error = %e, "discarding notification");
                metrics::items_dropped().add(1, &[KeyValue::new("reason", "decode")]);
                return Ok(false);
            }
        };

        debug!(path = %item.path.display(), tags = ?item.tags, "queued");
        self.queue.push(item)?;
        metrics::items_received().add(1, &[]);
        Ok(true)
    }

    fn log_snapshot(&self) {
        let stats = self.stats.as_ref().map(|stats| stats.snapshot()).unwrap_or_default();
        info!(
            queued = self.queue.len(),
            active = stats.active,
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            stale = stats.stale,
            errors = stats.errors,
            "state snapshot"
        );
    }
}
