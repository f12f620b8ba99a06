//! Error types for zero-ydb.

use std::time::Duration;

use thiserror::Error;

use crate::classify::StatusCategory;
use crate::protocol::status::{Status, StatusCode};

/// Result type for zero-ydb operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Messages shared by several error sites.
pub mod msg {
    pub const FORWARD_ONLY: &str = "Result set in FORWARD_ONLY mode";
    pub const SCHEME_QUERY_INSIDE_TRANSACTION: &str =
        "Scheme query cannot be executed inside active transaction. \
         This behavior may be changed by property schemeQueryTxMode";
    pub const SCAN_QUERY_INSIDE_TRANSACTION: &str =
        "Scan query cannot be executed inside active transaction";
    pub const CHANGE_ISOLATION_INSIDE_TX: &str =
        "Can't change transaction isolation level or auto commit mode inside active transaction";
    pub const READONLY_INSIDE_TRANSACTION: &str =
        "Can't change read only mode inside active transaction";
    pub const CLOSED_CONNECTION: &str = "Connection is closed";
    pub const CLOSED_RESULT_SET: &str = "Result set is closed";
    pub const QUERY_DEADLINE_EXCEEDED: &str = "Query deadline exceeded";
    pub const QUERY_CANCELLED: &str = "Query was cancelled";
}

/// Client-side failure that is not a server status.
///
/// These are surfaced eagerly: once one is observed the whole stream is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocalError {
    /// A blocking join gave up after its configured duration.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The waiting thread was interrupted.
    #[error("operation interrupted")]
    Interrupted,

    /// The caller cancelled the operation.
    #[error("{}", msg::QUERY_CANCELLED)]
    Cancelled,

    /// The caller's own deadline expired.
    #[error("{}", msg::QUERY_DEADLINE_EXCEEDED)]
    DeadlineExceeded,

    /// The transport failed (connection reset, stream dropped, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The stream violated the protocol (unknown result set index, ...).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Error type for zero-ydb.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-success status reported by the server
    #[error("{message}: {status}")]
    Status {
        /// What the client was doing
        message: String,
        /// Server status with its issues
        status: Status,
        /// Effective retry category (after the deadline/cancel downgrade)
        category: StatusCategory,
    },

    /// Local execution failure (timeout, interrupt, cancellation, transport)
    #[error("Local execution error: {0}")]
    Local(#[from] LocalError),

    /// Invalid usage (e.g., changing isolation inside a transaction)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Operation on a closed connection or result set
    #[error("{0}")]
    Closed(String),

    /// A column value could not be converted to the requested type
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl Error {
    /// Build a status error, classifying the status without any caller context.
    pub fn status(message: impl Into<String>, status: Status) -> Self {
        let category = status.code.category();
        Error::Status {
            message: message.into(),
            status,
            category,
        }
    }

    /// Retry category if this is a server status error.
    pub fn category(&self) -> Option<StatusCategory> {
        match self {
            Error::Status { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Returns true if retrying the same operation may succeed.
    ///
    /// Conditionally retryable errors count as retryable here; callers that
    /// need the distinction should look at [`Error::category`].
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            Some(StatusCategory::Retryable | StatusCategory::ConditionallyRetryable)
        )
    }

    /// Get the status code if this is a server status error.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(status.code),
            _ => None,
        }
    }

    /// Returns true for local execution errors.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::Local(_))
    }

    /// Returns true if the caller broke a state-machine contract.
    pub fn is_illegal_usage(&self) -> bool {
        matches!(self, Error::InvalidUsage(_) | Error::Unsupported(_))
    }
}
