//! Streaming results and transaction tracking for a YDB client.
//!
//! # Features
//!
//! - **Lazy cursors**: server-pushed parts are read through a synchronous,
//!   forward-only cursor with bounded buffering and backpressure
//! - **Multi-statement batches**: one cursor per result set, read in order
//! - **Transaction tracking**: auto-commit, isolation levels and the DDL policy
//!   inside open transactions
//! - **Retry classification**: every failure carries its retry category
//!
//! The transport is not part of this crate: it implements [`Client`] and
//! [`Session`] and pushes parts into the handlers it is given.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use zero_ydb::sync::Conn;
//! use zero_ydb::{Client, Opts, Query};
//!
//! fn run(client: Arc<dyn Client>) -> zero_ydb::error::Result<()> {
//!     let opts = Opts::try_from("ydb://localhost:2136/local?autoCommit=false")?;
//!     let mut conn = Conn::new(client, opts)?;
//!
//!     let mut execution = conn.execute(&Query::select("SELECT id, name FROM users"))?;
//!     if let Some(cursor) = execution.result_set(0)? {
//!         while cursor.next()? {
//!             let (id, name): (i64, String) = cursor.current_as()?;
//!             println!("{}: {}", id, name);
//!         }
//!     }
//!     execution.close()?;
//!
//!     conn.commit()?;
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod error;
pub mod handler;
pub mod opts;
pub mod promise;
pub mod protocol;
pub mod query;
pub mod result;
pub mod row;
pub mod state;
pub mod sync;
pub mod warnings;

#[cfg(feature = "tokio")]
pub mod tokio;

pub use classify::StatusCategory;
pub use error::{Error, LocalError, Result};
pub use handler::{PartsHandler, ScanHandler, StreamObserver};
pub use opts::Opts;
pub use promise::{CallContext, Promise};
pub use protocol::{
    Client, ColumnInfo, Issue, IssueSeverity, Row, RowBatch, Session, SessionHandle,
    SessionResult, Status, StatusCode, StreamControl, TxControl, TxMode, Value,
};
pub use query::{Query, QueryType, StatementKind};
pub use result::{CursorCloser, Execution, LazyCursor};
pub use row::{FromRow, FromValue};
pub use state::transaction::{IsolationLevel, SchemeQueryTxMode, TxState};
pub use warnings::Warnings;
