//! Streaming results.
//!
//! Parts pushed by the transport thread flow through
//! `StreamDispatcher` → per-result-set `BoundedResultQueue` → `LazyCursor`.
//!
//! # Structure
//!
//! - `queue`: Bounded batch queue with producer backpressure
//! - `cursor`: Forward-only cursor and its producer-side feed
//! - `slot`: Per-statement outcome descriptors
//! - `control`: Terminal state and single-shot cancellation of one stream
//! - `dispatcher`: Stream handler demultiplexing parts into slots
//! - `execution`: Caller-side view of a running batch

pub(crate) mod control;
pub mod cursor;
pub(crate) mod dispatcher;
pub mod execution;
pub mod queue;
pub(crate) mod slot;

pub use cursor::{CursorCloser, LazyCursor};
pub use execution::Execution;
pub use queue::{BoundedResultQueue, PushOutcome};
