//! Types exchanged with the transport layer.
//!
//! The wire encoding itself lives outside this crate; these are the shapes the
//! transport hands over.
//!
//! # Structure
//!
//! - `status`: Status codes, statuses and issues
//! - `types`: Columns, values, rows and row batches
//! - `session`: Session and client traits, transaction directives

pub mod session;
pub mod status;
pub mod types;

pub use session::{Client, Session, SessionHandle, SessionResult, StreamControl, TxControl, TxMode};
pub use status::{Issue, IssueSeverity, Status, StatusCode};
pub use types::{ColumnInfo, Row, RowBatch, Value};
