//! Caller-side view of one running batch.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result, msg};
use crate::opts::Opts;
use crate::promise::CallContext;
use crate::query::Query;
use crate::warnings::Warnings;

use super::control::ExecutionControl;
use super::cursor::LazyCursor;
use super::dispatcher::{ExecutionListener, StreamDispatcher};
use super::slot::{ResultSlot, SlotResolution};

/// Buffering and waiting limits of an execution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecutionSettings {
    pub capacity: usize,
    pub poll_interval: Duration,
    pub join_duration: Duration,
}

impl From<&Opts> for ExecutionSettings {
    fn from(opts: &Opts) -> Self {
        Self {
            capacity: opts.result_queue_capacity,
            poll_interval: opts.poll_interval,
            join_duration: opts.join_duration,
        }
    }
}

/// Results of one batch, in statement order.
///
/// Each statement is either DDL, an update, or a result set. Result sets are
/// read strictly forward with [`get_more_results`](Execution::get_more_results);
/// moving past a result set closes it and discards its unread rows.
pub struct Execution {
    slots: Vec<ResultSlot>,
    cursors: Vec<Option<LazyCursor>>,
    current: usize,
    control: Arc<ExecutionControl>,
    join_duration: Duration,
    closed: bool,
}

impl Execution {
    /// Build the slots for `query` and the handler that will fill them.
    pub(crate) fn prepare(
        query: &Query,
        settings: ExecutionSettings,
        ctx: CallContext,
        warnings: Warnings,
        listener: Option<Box<dyn ExecutionListener>>,
    ) -> (Execution, Arc<StreamDispatcher>) {
        let slots = ResultSlot::for_statements(query.statements());
        let pending: Vec<_> = slots
            .iter()
            .filter_map(ResultSlot::pending)
            .map(Arc::clone)
            .collect();
        let control = Arc::new(ExecutionControl::new(query.text().to_string(), ctx));

        let dispatcher = Arc::new(StreamDispatcher::new(
            Arc::clone(&control),
            pending.clone(),
            settings.capacity,
            settings.poll_interval,
            warnings,
            listener,
        ));

        let execution = Execution {
            slots,
            cursors: pending.iter().map(|_| None).collect(),
            current: 0,
            control,
            join_duration: settings.join_duration,
            closed: false,
        };
        (execution, dispatcher)
    }

    pub(crate) fn control(&self) -> &Arc<ExecutionControl> {
        &self.control
    }

    /// Wait until the first part arrives or the stream ends.
    ///
    /// A stream that fails before delivering any part fails here.
    pub(crate) fn wait_started(&self) -> Result<()> {
        if let Err(err) = self.control.join_started(self.join_duration) {
            self.control.request_cancel();
            return Err(Error::Local(err));
        }

        let delivered = self
            .slots
            .iter()
            .filter_map(ResultSlot::pending)
            .any(|p| p.feed().is_some());
        if delivered {
            return Ok(());
        }
        match self.control.terminal_error(self.control.state()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of statements in the batch.
    pub fn statement_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of the statement whose results are current.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Update count of statement `index`: 0 for DDL, 1 for an update, -1 for a
    /// result set or an index past the end.
    pub fn update_count(&self, index: usize) -> i64 {
        self.slots.get(index).map_or(-1, ResultSlot::update_count)
    }

    pub fn has_result_set(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(ResultSlot::has_result_set)
    }

    /// Cursor of statement `index`, or `None` if it has no result set.
    ///
    /// Blocks until the result set's first part arrives or the stream ends.
    /// A result set that was closed, directly or by moving past it, is gone.
    pub fn result_set(&mut self, index: usize) -> Result<Option<&mut LazyCursor>> {
        if self.closed {
            return Err(Error::Closed(msg::CLOSED_RESULT_SET.into()));
        }
        let Some(pending) = self.slots.get(index).and_then(ResultSlot::pending).cloned() else {
            return Ok(None);
        };
        if pending.is_discarded() || pending.feed().is_some_and(|f| f.is_closed()) {
            return Err(Error::Closed(msg::CLOSED_RESULT_SET.into()));
        }

        let rs_index = pending.index();
        let Some(entry) = self.cursors.get_mut(rs_index) else {
            return Ok(None);
        };
        if entry.is_none() {
            let resolution = match pending.join(self.control.ctx(), self.join_duration) {
                Ok(resolution) => resolution,
                Err(err) => {
                    self.control.request_cancel();
                    return Err(Error::Local(err));
                }
            };
            match resolution {
                SlotResolution::Ready(feed) => {
                    *entry = Some(LazyCursor::new(feed, self.join_duration));
                }
                SlotResolution::Failed(status) => return Err(self.control.status_error(status)),
                SlotResolution::Error(err) => return Err(Error::Local(err)),
            }
        }
        Ok(entry.as_mut())
    }

    /// Cursor of the current statement.
    pub fn current_result_set(&mut self) -> Result<Option<&mut LazyCursor>> {
        self.result_set(self.current)
    }

    /// Close the current result set and move to the next statement.
    ///
    /// Returns true if the new current statement has a result set.
    pub fn get_more_results(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::Closed(msg::CLOSED_RESULT_SET.into()));
        }
        if self.current >= self.slots.len() {
            return Ok(false);
        }
        self.discard_slot(self.current);
        self.current += 1;
        Ok(self.has_result_set(self.current))
    }

    fn discard_slot(&mut self, index: usize) {
        let Some(pending) = self.slots.get(index).and_then(ResultSlot::pending) else {
            return;
        };
        if let Some(Some(cursor)) = self.cursors.get_mut(pending.index()) {
            cursor.discard();
        }
        pending.discard();
    }

    fn discard_all(&mut self) {
        for index in 0..self.slots.len() {
            self.discard_slot(index);
        }
    }

    /// Stop the stream if it is still running. Returns false if it already
    /// finished or was already cancelled.
    pub fn cancel(&self) -> bool {
        self.control.request_cancel()
    }

    /// Close every result set and wait for the stream to end.
    ///
    /// Fails with the stream's status if it did not succeed, unless the stream
    /// was cancelled by the client.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        tracing::debug!("Stream closing");
        self.closed = true;
        self.discard_all();
        self.control.request_cancel();

        let state = self.control.join(self.join_duration)?;
        if self.control.is_cancel_requested() {
            tracing::debug!("Stream cancelled and finished with {:?}", state);
            return Ok(());
        }
        tracing::debug!("Stream closed with {:?}", state);
        match self.control.terminal_error(state) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        if !self.closed {
            self.discard_all();
            self.control.request_cancel();
        }
    }
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("statements", &self.slots.len())
            .field("current", &self.current)
            .field("state", &self.control.state())
            .field("closed", &self.closed)
            .finish()
    }
}
