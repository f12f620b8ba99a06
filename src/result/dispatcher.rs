//! Routes server-pushed parts into result set slots.

use std::sync::Arc;
use std::time::Duration;

use crate::error::LocalError;
use crate::handler::{PartsHandler, ScanHandler, StreamObserver};
use crate::protocol::status::{Issue, Status};
use crate::protocol::types::{ColumnInfo, RowBatch};
use crate::state::stream::StreamState;
use crate::warnings::Warnings;

use super::control::ExecutionControl;
use super::cursor::ResultFeed;
use super::slot::{PendingResultSet, SlotResolution};

/// Hooks the connection attaches to an execution.
///
/// Both are called from the transport thread. `on_finished` runs after every
/// slot is resolved and before the execution's start signal fires.
pub(crate) trait ExecutionListener: Send + Sync {
    fn on_tx_id(&self, tx_id: &str);

    fn on_finished(&self, state: &StreamState);
}

/// Stream handler of one execution.
pub(crate) struct StreamDispatcher {
    control: Arc<ExecutionControl>,
    slots: Vec<Arc<PendingResultSet>>,
    capacity: usize,
    poll_interval: Duration,
    warnings: Warnings,
    listener: Option<Box<dyn ExecutionListener>>,
}

impl StreamDispatcher {
    pub fn new(
        control: Arc<ExecutionControl>,
        slots: Vec<Arc<PendingResultSet>>,
        capacity: usize,
        poll_interval: Duration,
        warnings: Warnings,
        listener: Option<Box<dyn ExecutionListener>>,
    ) -> Self {
        Self {
            control,
            slots,
            capacity,
            poll_interval,
            warnings,
            listener,
        }
    }

    fn new_feed(&self, index: usize, columns: Arc<[ColumnInfo]>) -> ResultFeed {
        ResultFeed::new(
            index,
            columns,
            self.capacity,
            self.poll_interval,
            Arc::clone(&self.control),
        )
    }

    fn on_part(&self, index: usize, batch: RowBatch) {
        let Some(slot) = self.slots.get(index) else {
            tracing::warn!(
                "Unexpected result set index {} (batch has {} result sets)",
                index,
                self.slots.len()
            );
            self.control.request_cancel();
            let err = LocalError::Protocol(format!("unexpected result set index {}", index));
            self.terminate(StreamState::Error(err), None);
            return;
        };

        let feed = slot.feed_or_init(|| self.new_feed(index, Arc::clone(batch.columns())));
        if let Some(feed) = feed {
            feed.push(batch);
        }
        self.control.mark_started();
    }

    /// Apply the terminal state and resolve every slot. Later terminal
    /// callbacks are ignored.
    fn terminate(&self, state: StreamState, status: Option<&Status>) {
        if !self.control.finish(state.clone()) {
            tracing::debug!("Ignoring duplicate stream completion: {:?}", state);
            return;
        }
        if let Some(status) = status {
            self.warnings.add_status(status);
        }

        for slot in &self.slots {
            if !slot.is_resolved() {
                let resolution = match &state {
                    StreamState::Running | StreamState::Success => SlotResolution::Ready(Arc::new(
                        self.new_feed(slot.index(), Arc::from(Vec::new())),
                    )),
                    StreamState::Failure(status) => SlotResolution::Failed(status.clone()),
                    StreamState::Error(err) => SlotResolution::Error(err.clone()),
                    StreamState::Cancelled => SlotResolution::Error(LocalError::Cancelled),
                };
                slot.resolve(resolution);
            }
            if let Some(feed) = slot.feed() {
                feed.complete();
            }
        }

        if let Some(listener) = &self.listener {
            listener.on_finished(&state);
        }
        self.control.mark_started();
    }
}

impl StreamObserver for StreamDispatcher {
    fn on_finished(&self, status: Status) {
        if status.is_success() {
            tracing::debug!("Stream finished with {}", status.code);
        } else {
            tracing::debug!("Stream finished with {}", status);
        }
        let state = if status.is_success() {
            StreamState::Success
        } else if self.control.is_cancel_requested() {
            StreamState::Cancelled
        } else {
            StreamState::Failure(status.clone())
        };
        self.terminate(state, Some(&status));
    }

    fn on_error(&self, error: LocalError) {
        tracing::debug!("Stream failed: {}", error);
        let state = if self.control.is_cancel_requested() {
            StreamState::Cancelled
        } else {
            StreamState::Error(error)
        };
        self.terminate(state, None);
    }
}

impl PartsHandler for StreamDispatcher {
    fn on_issues(&self, issues: Vec<Issue>) {
        self.warnings.add_issues(issues);
    }

    fn on_next_part(&self, index: usize, batch: RowBatch) {
        self.on_part(index, batch);
    }

    fn on_tx_meta(&self, tx_id: String) {
        if self.control.is_started() {
            tracing::warn!("Transaction id {} arrived after the first part", tx_id);
        }
        if let Some(listener) = &self.listener {
            listener.on_tx_id(&tx_id);
        }
    }
}

impl ScanHandler for StreamDispatcher {
    fn on_next(&self, batch: RowBatch) {
        self.on_part(0, batch);
    }
}
