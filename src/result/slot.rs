//! Per-statement outcome of a batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::LocalError;
use crate::promise::{CallContext, Promise};
use crate::protocol::status::Status;
use crate::query::StatementKind;

use super::cursor::ResultFeed;

/// Final outcome of a result set slot.
#[derive(Clone)]
pub(crate) enum SlotResolution {
    Ready(Arc<ResultFeed>),
    Failed(Status),
    Error(LocalError),
}

/// A result set that resolves exactly once: when its first part arrives, or
/// when the stream ends without one.
pub(crate) struct PendingResultSet {
    index: usize,
    resolution: Promise<SlotResolution>,
    discarded: AtomicBool,
}

impl PendingResultSet {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            resolution: Promise::new(),
            discarded: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Resolve the slot. Returns `false` and keeps the first value if it was
    /// already resolved.
    pub fn resolve(&self, resolution: SlotResolution) -> bool {
        let feed = match &resolution {
            SlotResolution::Ready(feed) => Some(Arc::clone(feed)),
            _ => None,
        };
        if !self.resolution.complete(resolution) {
            return false;
        }
        if let Some(feed) = feed
            && self.discarded.load(Ordering::SeqCst)
        {
            feed.discard();
        }
        true
    }

    /// Feed of the resolved slot, creating it with `make` if the slot is still
    /// unresolved. `None` if the slot resolved to a failure.
    pub fn feed_or_init(&self, make: impl FnOnce() -> ResultFeed) -> Option<Arc<ResultFeed>> {
        if !self.resolution.is_done() {
            self.resolve(SlotResolution::Ready(Arc::new(make())));
        }
        match self.resolution.get() {
            Some(SlotResolution::Ready(feed)) => Some(feed),
            _ => None,
        }
    }

    /// Resolved feed, if any, without waiting.
    pub fn feed(&self) -> Option<Arc<ResultFeed>> {
        match self.resolution.get() {
            Some(SlotResolution::Ready(feed)) => Some(feed),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_done()
    }

    pub fn join(&self, ctx: &CallContext, timeout: Duration) -> Result<SlotResolution, LocalError> {
        self.resolution.join_in(ctx, timeout)
    }

    /// Mark the result set as unwanted. Its feed, now or once created, drops
    /// everything it receives.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
        if let Some(feed) = self.feed() {
            feed.discard();
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst)
    }
}

/// Outcome descriptor of one statement of a batch.
#[derive(Clone)]
pub(crate) enum ResultSlot {
    /// DDL acknowledgement
    Ddl,
    /// Statement without a result set
    UpdateCount,
    /// Statement producing a result set
    ResultSet(Arc<PendingResultSet>),
}

impl ResultSlot {
    /// Build one slot per statement. Result set slots are numbered in
    /// statement order.
    pub fn for_statements(kinds: &[StatementKind]) -> Vec<ResultSlot> {
        let mut next_index = 0;
        kinds
            .iter()
            .map(|kind| match kind {
                StatementKind::Scheme => ResultSlot::Ddl,
                StatementKind::Update => ResultSlot::UpdateCount,
                StatementKind::Select => {
                    let slot = ResultSlot::ResultSet(Arc::new(PendingResultSet::new(next_index)));
                    next_index += 1;
                    slot
                }
            })
            .collect()
    }

    /// Update count reported for the statement: 0 for DDL, 1 for an update,
    /// -1 for a result set.
    pub fn update_count(&self) -> i64 {
        match self {
            ResultSlot::Ddl => 0,
            ResultSlot::UpdateCount => 1,
            ResultSlot::ResultSet(_) => -1,
        }
    }

    pub fn has_result_set(&self) -> bool {
        matches!(self, ResultSlot::ResultSet(_))
    }

    pub fn pending(&self) -> Option<&Arc<PendingResultSet>> {
        match self {
            ResultSlot::ResultSet(pending) => Some(pending),
            _ => None,
        }
    }
}
