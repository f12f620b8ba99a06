//! Bridge from async transport code to the blocking stream handlers.
//!
//! Handlers block while a result queue is full, so they must not run on a
//! runtime worker. The transport task sends events over a bounded channel and
//! a blocking task replays them into the handler in order. A full channel
//! suspends the transport task, carrying backpressure up to the network.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::LocalError;
use crate::handler::{PartsHandler, ScanHandler};
use crate::protocol::status::{Issue, Status};
use crate::protocol::types::RowBatch;

enum StreamEvent {
    Part { index: usize, batch: RowBatch },
    Issues(Vec<Issue>),
    TxMeta(String),
    Finished(Status),
    Failed(LocalError),
}

enum Target {
    Parts(Arc<dyn PartsHandler>),
    Scan(Arc<dyn ScanHandler>),
}

impl Target {
    /// Deliver one event. Returns true once the stream is terminated.
    fn deliver(&self, event: StreamEvent) -> bool {
        match (self, event) {
            (Target::Parts(handler), StreamEvent::Part { index, batch }) => {
                handler.on_next_part(index, batch);
                false
            }
            (Target::Scan(handler), StreamEvent::Part { index: 0, batch }) => {
                handler.on_next(batch);
                false
            }
            (Target::Scan(handler), StreamEvent::Part { index, .. }) => {
                handler.on_error(LocalError::Protocol(format!(
                    "scan stream has a single result set, got index {}",
                    index
                )));
                true
            }
            (Target::Parts(handler), StreamEvent::Issues(issues)) => {
                handler.on_issues(issues);
                false
            }
            (Target::Parts(handler), StreamEvent::TxMeta(tx_id)) => {
                handler.on_tx_meta(tx_id);
                false
            }
            (Target::Scan(_), StreamEvent::Issues(_) | StreamEvent::TxMeta(_)) => {
                tracing::trace!("Scan stream ignores metadata");
                false
            }
            (Target::Parts(handler), StreamEvent::Finished(status)) => {
                handler.on_finished(status);
                true
            }
            (Target::Scan(handler), StreamEvent::Finished(status)) => {
                handler.on_finished(status);
                true
            }
            (Target::Parts(handler), StreamEvent::Failed(err)) => {
                handler.on_error(err);
                true
            }
            (Target::Scan(handler), StreamEvent::Failed(err)) => {
                handler.on_error(err);
                true
            }
        }
    }

    fn abandon(&self) {
        let err = LocalError::Transport("stream closed without status".into());
        match self {
            Target::Parts(handler) => handler.on_error(err),
            Target::Scan(handler) => handler.on_error(err),
        }
    }
}

/// Async producer side of a stream.
///
/// Dropping the sender without [`finish`](PartSender::finish) or
/// [`fail`](PartSender::fail) fails the stream with a transport error.
pub struct PartSender {
    events: mpsc::Sender<StreamEvent>,
}

fn handler_gone() -> LocalError {
    LocalError::Transport("stream handler is gone".into())
}

impl PartSender {
    async fn send(&self, event: StreamEvent) -> Result<(), LocalError> {
        self.events.send(event).await.map_err(|_| handler_gone())
    }

    /// Deliver a data part of result set `index`. Waits while the handler is
    /// behind.
    pub async fn send_part(&self, index: usize, batch: RowBatch) -> Result<(), LocalError> {
        self.send(StreamEvent::Part { index, batch }).await
    }

    pub async fn send_issues(&self, issues: Vec<Issue>) -> Result<(), LocalError> {
        self.send(StreamEvent::Issues(issues)).await
    }

    pub async fn send_tx_meta(&self, tx_id: impl Into<String>) -> Result<(), LocalError> {
        self.send(StreamEvent::TxMeta(tx_id.into())).await
    }

    /// End the stream with the server's final status.
    pub async fn finish(self, status: Status) -> Result<(), LocalError> {
        self.send(StreamEvent::Finished(status)).await
    }

    /// End the stream with a local failure.
    pub async fn fail(self, err: LocalError) -> Result<(), LocalError> {
        self.send(StreamEvent::Failed(err)).await
    }

    /// Returns true once the draining side stopped (the stream terminated or
    /// the handler panicked).
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

fn spawn_drain(target: Target, capacity: usize) -> (PartSender, JoinHandle<()>) {
    let (events, mut rx) = mpsc::channel(capacity.max(1));
    let drain = tokio::task::spawn_blocking(move || {
        while let Some(event) = rx.blocking_recv() {
            if target.deliver(event) {
                return;
            }
        }
        tracing::debug!("Stream sender dropped before the final status");
        target.abandon();
    });
    (PartSender { events }, drain)
}

/// Feed a multi-part query stream handler from async code.
///
/// Must be called within a Tokio runtime. The returned handle completes once
/// the handler saw the terminal event.
pub fn part_channel(
    handler: Arc<dyn PartsHandler>,
    capacity: usize,
) -> (PartSender, JoinHandle<()>) {
    spawn_drain(Target::Parts(handler), capacity)
}

/// Feed a flat scan stream handler from async code. Parts must use index 0.
pub fn scan_channel(handler: Arc<dyn ScanHandler>, capacity: usize) -> (PartSender, JoinHandle<()>) {
    spawn_drain(Target::Scan(handler), capacity)
}
