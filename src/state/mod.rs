//! Pure state machines.
//!
//! These hold no I/O: the connection asks them what to do next and feeds the
//! outcome back.

pub mod stream;
pub mod transaction;

pub use stream::{StreamState, StreamStateCell};
pub use transaction::{IsolationLevel, SchemeAction, SchemeQueryTxMode, TxState};
