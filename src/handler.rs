//! Callbacks for server-pushed result streams.
//!
//! The transport calls these from its own I/O thread. Two stream shapes exist:
//!
//! - Scan streams (legacy): a flat sequence of batches for a single result set.
//!   `on_next`* → `on_finished`
//! - Query streams: parts tagged with a result set index, interleaved with issues.
//!   The transaction id, if any, comes before the first part.
//!   `on_issues`* [`on_tx_meta`] (`on_issues` | `on_next_part`)* → `on_finished`
//!
//! A query call returns to the caller once the first part arrives, and the
//! connection decides how to run its next query from the transaction id it
//! has seen by then. A transport must therefore deliver `on_tx_meta` before
//! the first `on_next_part` of the stream.
//!
//! Either stream may end with `on_error` instead of `on_finished` if the
//! transport itself fails. Implementations must tolerate duplicate terminal
//! callbacks.

use crate::error::LocalError;
use crate::protocol::status::{Issue, Status};
use crate::protocol::types::RowBatch;

/// Terminal callbacks shared by both stream shapes.
pub trait StreamObserver: Send + Sync {
    /// The server finished the stream with `status`.
    fn on_finished(&self, status: Status);

    /// The stream failed locally (transport error, interruption).
    fn on_error(&self, error: LocalError);
}

/// Handler for the flat scan stream.
pub trait ScanHandler: StreamObserver {
    /// Called for each batch of the single result set.
    fn on_next(&self, batch: RowBatch);
}

/// Handler for the multi-part query stream.
pub trait PartsHandler: StreamObserver {
    /// Called when the server attaches non-fatal issues to the stream.
    fn on_issues(&self, issues: Vec<Issue>) {
        let _ = issues;
    }

    /// Called for each data part of result set `index`.
    fn on_next_part(&self, index: usize, batch: RowBatch);

    /// Called when the server reports the transaction the query ran in.
    /// Must precede the first [`on_next_part`](PartsHandler::on_next_part).
    ///
    /// An empty id means the transaction was committed or closed.
    fn on_tx_meta(&self, tx_id: String) {
        let _ = tx_id;
    }
}
