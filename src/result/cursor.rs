//! Forward-only cursor over one streamed result set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, LocalError, Result, msg};
use crate::protocol::types::{ColumnInfo, Row, RowBatch, Value};
use crate::row::{FromRow, FromValue, decode_value};

use super::control::ExecutionControl;
use super::queue::{BoundedResultQueue, PushOutcome};

/// Producer side of one result set: the queue the dispatcher fills and the
/// cursor drains.
pub(crate) struct ResultFeed {
    index: usize,
    columns: Arc<[ColumnInfo]>,
    queue: BoundedResultQueue,
    rows_total: AtomicU64,
    closed: AtomicBool,
    control: Arc<ExecutionControl>,
}

impl ResultFeed {
    pub fn new(
        index: usize,
        columns: Arc<[ColumnInfo]>,
        capacity: usize,
        poll_interval: Duration,
        control: Arc<ExecutionControl>,
    ) -> Self {
        Self {
            index,
            columns,
            queue: BoundedResultQueue::new(capacity, poll_interval),
            rows_total: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            control,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Total rows delivered so far, read or not.
    pub fn rows_total(&self) -> u64 {
        self.rows_total.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue a batch, blocking while the cursor is behind.
    ///
    /// Batches for a closed result set, or for a cancelled execution, are
    /// dropped.
    pub fn push(&self, batch: RowBatch) -> PushOutcome {
        let rows = batch.row_count() as u64;
        let control = &self.control;
        let total = self.rows_total.fetch_add(rows, Ordering::AcqRel) + rows;
        let outcome = self
            .queue
            .push(batch, || self.is_closed() || control.is_cancel_requested());
        match outcome {
            PushOutcome::Queued => {
                tracing::trace!("Result set {} got {} rows", self.index, total);
            }
            PushOutcome::Closed => {
                tracing::trace!("Result set {} dropped {} rows", self.index, rows);
            }
        }
        outcome
    }

    /// Wake the cursor so it observes the terminal stream state.
    pub fn complete(&self) {
        self.queue.wake_all();
    }

    /// Caller-initiated close: discard everything and stop the stream if it
    /// is still running.
    pub fn close(&self) -> bool {
        if !self.discard() {
            return false;
        }
        self.control.request_cancel();
        true
    }

    /// Discard the result set without touching the stream. Later batches for
    /// it are dropped on arrival.
    pub fn discard(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::trace!("Result set {} closed", self.index);
        self.queue.close();
        true
    }
}

/// Closes a cursor from another thread.
#[derive(Clone)]
pub struct CursorCloser {
    feed: Arc<ResultFeed>,
}

impl CursorCloser {
    /// Close the cursor. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.feed.close()
    }
}

/// Forward-only, read-only cursor over one result set.
///
/// Rows are pulled from the stream lazily; [`next`](LazyCursor::next) blocks
/// while the server has not delivered the next batch yet.
pub struct LazyCursor {
    feed: Arc<ResultFeed>,
    pending: std::vec::IntoIter<Row>,
    current: Option<Row>,
    row_index: u64,
    join_duration: Duration,
}

impl LazyCursor {
    pub(crate) fn new(feed: Arc<ResultFeed>, join_duration: Duration) -> Self {
        Self {
            feed,
            pending: Vec::new().into_iter(),
            current: None,
            row_index: 0,
            join_duration,
        }
    }

    /// Index of this result set within its batch.
    pub fn index(&self) -> usize {
        self.feed.index()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.feed.columns
    }

    /// Zero-based index of the column called `name`.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.feed.columns.iter().position(|c| c.name == name)
    }

    /// Advance to the next row.
    ///
    /// Returns `Ok(false)` at the end of a successful stream. If the stream
    /// failed, rows delivered before the failure are still returned and the
    /// failure is raised once they are exhausted.
    pub fn next(&mut self) -> Result<bool> {
        loop {
            if self.feed.is_closed() {
                self.current = None;
                return Err(Error::Closed(msg::CLOSED_RESULT_SET.into()));
            }

            if let Some(row) = self.pending.next() {
                self.current = Some(row);
                self.row_index += 1;
                return Ok(true);
            }
            self.current = None;

            if let Some(batch) = self.feed.queue.try_pop() {
                self.pending = batch.into_rows().into_iter();
                continue;
            }

            let control = &self.feed.control;
            if control.is_terminal() {
                // A batch may have landed between the pop and the state read.
                if !self.feed.queue.is_empty() {
                    continue;
                }
                if let Some(err) = control.terminal_error(control.state()) {
                    return Err(err);
                }
                let total = self.feed.rows_total();
                if total > 0 {
                    self.row_index = total + 1;
                }
                return Ok(false);
            }

            // Only a live stream can be overdue; delivered rows stay readable.
            if let Err(err) = control.ctx().check() {
                control.request_cancel();
                return Err(Error::Local(err));
            }

            if let Some(batch) = self.feed.queue.pop(self.feed.queue.poll_interval()) {
                self.pending = batch.into_rows().into_iter();
            }
        }
    }

    /// Current one-based row number; 0 before the first row.
    pub fn row(&self) -> u64 {
        self.row_index
    }

    pub fn is_before_first(&self) -> bool {
        self.feed.rows_total() > 0 && self.row_index < 1
    }

    pub fn is_first(&self) -> bool {
        self.row_index == 1
    }

    /// Returns true if the cursor is on the last row.
    ///
    /// Waits until either more rows arrive or the stream completes, at most
    /// `join_duration`.
    pub fn is_last(&self) -> Result<bool> {
        if self.current.is_none() || !self.wait_drained()? {
            return Ok(false);
        }
        let total = self.feed.rows_total();
        Ok(total > 0 && self.row_index == total)
    }

    /// Returns true if the cursor moved past the last row.
    ///
    /// Waits like [`is_last`](LazyCursor::is_last).
    pub fn is_after_last(&self) -> Result<bool> {
        if self.current.is_some() || !self.wait_drained()? {
            return Ok(false);
        }
        let total = self.feed.rows_total();
        Ok(total > 0 && self.row_index > total)
    }

    fn has_buffered_rows(&self) -> bool {
        self.pending.len() > 0 || !self.feed.queue.is_empty()
    }

    /// Wait until the stream is terminal with nothing left to read
    /// (`Ok(true)`) or until unread rows are buffered (`Ok(false)`).
    ///
    /// Never waits on the stream alone: a producer blocked on a full queue
    /// only finishes once the cursor reads.
    fn wait_drained(&self) -> Result<bool> {
        let control = &self.feed.control;
        let started = Instant::now();
        loop {
            if self.has_buffered_rows() {
                return Ok(false);
            }
            if control.is_terminal() {
                return Ok(!self.has_buffered_rows());
            }
            control.ctx().check()?;
            let elapsed = started.elapsed();
            if elapsed >= self.join_duration {
                return Err(LocalError::Timeout(self.join_duration).into());
            }
            let wait = self.feed.queue.poll_interval().min(self.join_duration - elapsed);
            self.feed.queue.wait_ready(wait);
        }
    }

    /// The row the cursor is on.
    pub fn current_row(&self) -> Result<&Row> {
        self.current
            .as_ref()
            .ok_or_else(|| Error::InvalidUsage(format!("Current row is not available: {}", self.row_index)))
    }

    /// Raw value of a zero-based column of the current row.
    pub fn value(&self, column: usize) -> Result<&Value> {
        let row = self.current_row()?;
        row.value(column)
            .ok_or_else(|| Error::InvalidUsage(format!("Column index out of range: {}", column)))
    }

    /// Decode a zero-based column of the current row.
    pub fn get<T: FromValue>(&self, column: usize) -> Result<T> {
        decode_value(Some(self.value(column)?))
    }

    /// Decode the whole current row.
    pub fn current_as<T: FromRow>(&self) -> Result<T> {
        T::from_row(&self.feed.columns, self.current_row()?)
    }

    /// Close the cursor and discard unread rows. Stops the stream if it is
    /// still running. Idempotent.
    pub fn close(&mut self) {
        self.current = None;
        self.pending = Vec::new().into_iter();
        self.feed.close();
    }

    pub fn is_closed(&self) -> bool {
        self.feed.is_closed()
    }

    /// Handle that closes this cursor from another thread.
    pub fn close_handle(&self) -> CursorCloser {
        CursorCloser {
            feed: Arc::clone(&self.feed),
        }
    }

    pub(crate) fn discard(&mut self) {
        self.current = None;
        self.pending = Vec::new().into_iter();
        self.feed.discard();
    }

    pub fn absolute(&mut self, _row: i64) -> Result<bool> {
        Err(forward_only())
    }

    pub fn relative(&mut self, _rows: i64) -> Result<bool> {
        Err(forward_only())
    }

    pub fn previous(&mut self) -> Result<bool> {
        Err(forward_only())
    }

    pub fn first(&mut self) -> Result<bool> {
        Err(forward_only())
    }

    pub fn last(&mut self) -> Result<bool> {
        Err(forward_only())
    }

    pub fn before_first(&mut self) -> Result<()> {
        Err(forward_only())
    }

    pub fn after_last(&mut self) -> Result<()> {
        Err(forward_only())
    }
}

fn forward_only() -> Error {
    Error::Unsupported(msg::FORWARD_ONLY.into())
}

impl std::fmt::Debug for LazyCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCursor")
            .field("index", &self.index())
            .field("row", &self.row_index)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::CallContext;
    use crate::protocol::status::{Status, StatusCode};
    use crate::state::stream::StreamState;

    fn columns() -> Arc<[ColumnInfo]> {
        Arc::from(vec![ColumnInfo::new("id", "Int64")])
    }

    fn batch(ids: std::ops::Range<i64>) -> RowBatch {
        RowBatch::new(
            columns(),
            ids.map(|i| Row::new(vec![Value::Int(i)])).collect(),
        )
    }

    fn feed(control: &Arc<ExecutionControl>) -> Arc<ResultFeed> {
        Arc::new(ResultFeed::new(
            0,
            columns(),
            5,
            Duration::from_millis(10),
            Arc::clone(control),
        ))
    }

    fn control() -> Arc<ExecutionControl> {
        Arc::new(ExecutionControl::new("SELECT id".into(), CallContext::new()))
    }

    #[test]
    fn test_reads_all_rows_then_ends() {
        let control = control();
        let feed = feed(&control);
        feed.push(batch(0..3));
        feed.push(batch(3..5));
        control.finish(StreamState::Success);
        feed.complete();

        let mut cursor = LazyCursor::new(feed, Duration::from_secs(1));
        assert!(cursor.is_before_first());
        let mut ids = Vec::new();
        while cursor.next().unwrap() {
            if cursor.row() == 1 {
                assert!(cursor.is_first());
            }
            ids.push(cursor.get::<i64>(0).unwrap());
        }
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(cursor.row(), 6);
        assert!(cursor.is_after_last().unwrap());
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_is_last() {
        let control = control();
        let feed = feed(&control);
        feed.push(batch(0..2));
        control.finish(StreamState::Success);

        let mut cursor = LazyCursor::new(feed, Duration::from_secs(1));
        assert!(cursor.next().unwrap());
        assert!(!cursor.is_last().unwrap());
        assert!(cursor.next().unwrap());
        assert!(cursor.is_last().unwrap());
        assert!(!cursor.is_after_last().unwrap());
    }

    #[test]
    fn test_failure_after_buffered_rows() {
        let control = control();
        let feed = feed(&control);
        feed.push(batch(0..2));
        control.finish(StreamState::Failure(Status::new(StatusCode::Overloaded)));

        let mut cursor = LazyCursor::new(feed, Duration::from_secs(1));
        assert!(cursor.next().unwrap());
        assert!(cursor.next().unwrap());
        let err = cursor.next().unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::Overloaded));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_local_error_surfaces() {
        let control = control();
        let feed = feed(&control);
        control.finish(StreamState::Error(LocalError::Transport("reset".into())));

        let mut cursor = LazyCursor::new(feed, Duration::from_secs(1));
        assert!(matches!(
            cursor.next(),
            Err(Error::Local(LocalError::Transport(_)))
        ));
    }

    #[test]
    fn test_closed_cursor_never_yields_rows() {
        let control = control();
        let feed = feed(&control);
        feed.push(batch(0..3));

        let mut cursor = LazyCursor::new(Arc::clone(&feed), Duration::from_secs(1));
        assert!(cursor.next().unwrap());
        cursor.close();
        cursor.close();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.next(), Err(Error::Closed(_))));
        assert!(cursor.current_row().is_err());
        assert!(control.is_cancel_requested());

        // Late batches are dropped instead of blocking the producer
        assert_eq!(feed.push(batch(3..4)), PushOutcome::Closed);
    }

    #[test]
    fn test_forward_only() {
        let control = control();
        let mut cursor = LazyCursor::new(feed(&control), Duration::from_secs(1));
        for err in [
            cursor.absolute(1).unwrap_err(),
            cursor.relative(-1).unwrap_err(),
            cursor.previous().unwrap_err(),
            cursor.first().unwrap_err(),
            cursor.last().unwrap_err(),
        ] {
            assert!(err.is_illegal_usage());
            assert!(err.to_string().contains(msg::FORWARD_ONLY));
        }
        assert!(cursor.before_first().is_err());
        assert!(cursor.after_last().is_err());
    }

    #[test]
    fn test_deadline_cancels_stream() {
        let control = Arc::new(ExecutionControl::new(
            "SELECT id".into(),
            CallContext::with_timeout(Duration::from_millis(20)),
        ));
        let mut cursor = LazyCursor::new(feed(&control), Duration::from_secs(1));
        assert!(matches!(
            cursor.next(),
            Err(Error::Local(LocalError::DeadlineExceeded))
        ));
        assert!(control.is_cancel_requested());
    }

    #[test]
    fn test_rows_of_finished_stream_readable_after_deadline() {
        let control = Arc::new(ExecutionControl::new(
            "SELECT id".into(),
            CallContext::with_timeout(Duration::from_millis(20)),
        ));
        let feed = feed(&control);
        feed.push(batch(0..3));
        control.finish(StreamState::Success);
        feed.complete();
        std::thread::sleep(Duration::from_millis(40));

        let mut cursor = LazyCursor::new(feed, Duration::from_secs(1));
        let mut ids = Vec::new();
        while cursor.next().unwrap() {
            ids.push(cursor.get::<i64>(0).unwrap());
        }
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(!control.is_cancel_requested());
    }

    #[test]
    fn test_is_last_returns_when_more_rows_arrive() {
        let control = control();
        let feed = Arc::new(ResultFeed::new(
            0,
            columns(),
            1,
            Duration::from_millis(10),
            Arc::clone(&control),
        ));
        feed.push(batch(0..1));

        let mut cursor = LazyCursor::new(Arc::clone(&feed), Duration::from_millis(500));
        assert!(cursor.next().unwrap());

        // The producer fills the one-slot queue and then blocks on it; the
        // stream cannot finish until the cursor reads.
        let producer = {
            let feed = Arc::clone(&feed);
            let control = Arc::clone(&control);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                for i in 1..4 {
                    feed.push(batch(i..i + 1));
                }
                control.finish(StreamState::Success);
                feed.complete();
            })
        };

        assert!(!cursor.is_last().unwrap());
        let mut ids = vec![cursor.get::<i64>(0).unwrap()];
        while cursor.next().unwrap() {
            ids.push(cursor.get::<i64>(0).unwrap());
        }
        assert_eq!(ids, vec![0, 1, 2, 3]);
        producer.join().unwrap();
        assert!(cursor.is_after_last().unwrap());
    }

    #[test]
    fn test_is_last_times_out_on_silent_stream() {
        let control = control();
        let mut cursor = LazyCursor::new(feed(&control), Duration::from_millis(30));
        let feed = Arc::clone(&cursor.feed);
        feed.push(batch(0..1));
        assert!(cursor.next().unwrap());
        assert!(matches!(
            cursor.is_last(),
            Err(Error::Local(LocalError::Timeout(_)))
        ));
    }
}
