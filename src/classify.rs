//! Retry classification of server statuses.
//!
//! The client never retries by itself. It only tells the caller which bucket a
//! failure belongs to:
//!
//! | Category                 | Meaning                                           |
//! |--------------------------|---------------------------------------------------|
//! | `Success`                | nothing to do                                     |
//! | `NonRetryable`           | retrying the same request fails the same way      |
//! | `Retryable`              | retry, possibly with a new session or backoff     |
//! | `ConditionallyRetryable` | retry only if the request is idempotent           |

use std::time::{Duration, Instant};

#[cfg(not(debug_assertions))]
use no_panic::no_panic;

use crate::error::{Error, LocalError, Result};
use crate::promise::{CallContext, Promise};
use crate::protocol::status::{Status, StatusCode};

/// Retry eligibility of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Success,
    NonRetryable,
    Retryable,
    ConditionallyRetryable,
}

impl StatusCode {
    /// Classify this code, independent of any caller state.
    ///
    /// Codes this client does not know are non-retryable.
    #[cfg_attr(not(debug_assertions), no_panic)]
    pub fn category(self) -> StatusCategory {
        match self {
            StatusCode::Success => StatusCategory::Success,

            StatusCode::BadRequest
            | StatusCode::InternalError
            | StatusCode::ClientUnauthenticated
            | StatusCode::Unauthorized
            | StatusCode::SchemeError
            | StatusCode::GenericError
            | StatusCode::ClientCallUnimplemented
            | StatusCode::Unsupported
            | StatusCode::Unused
            | StatusCode::AlreadyExists => StatusCategory::NonRetryable,

            // NotFound may be an evicted prepared query or a dead transaction,
            // BadSession and SessionExpired need a new session.
            StatusCode::Aborted
            | StatusCode::Unavailable
            | StatusCode::Overloaded
            | StatusCode::TransportUnavailable
            | StatusCode::ClientResourceExhausted
            | StatusCode::NotFound
            | StatusCode::BadSession
            | StatusCode::SessionExpired => StatusCategory::Retryable,

            StatusCode::Cancelled
            | StatusCode::ClientCancelled
            | StatusCode::ClientInternalError
            | StatusCode::Undetermined
            | StatusCode::Timeout
            | StatusCode::PreconditionFailed
            | StatusCode::ClientDeadlineExceeded
            | StatusCode::SessionBusy
            | StatusCode::ClientDiscoveryFailed
            | StatusCode::ClientLimitsReached => StatusCategory::ConditionallyRetryable,

            StatusCode::Other(_) => StatusCategory::NonRetryable,
        }
    }
}

/// Classify `code` for a caller whose context is `ctx`.
///
/// A conditionally retryable failure is downgraded to non-retryable when the
/// caller's own deadline has expired or the caller cancelled: the failure was
/// self-inflicted and a retry would hit the same wall.
pub fn classify(code: StatusCode, ctx: &CallContext) -> StatusCategory {
    match code.category() {
        StatusCategory::ConditionallyRetryable if ctx.is_expired() || ctx.is_cancelled() => {
            StatusCategory::NonRetryable
        }
        category => category,
    }
}

/// Turn a status into `Ok` or a classified [`Error::Status`].
pub fn validate(message: &str, status: Status, ctx: &CallContext) -> Result<Status> {
    if classify(status.code, ctx) == StatusCategory::Success {
        return Ok(status);
    }
    Err(status_error(message, status, ctx))
}

/// Build the error for a non-success `status` seen by a caller whose context
/// is `ctx`.
pub fn status_error(message: &str, status: Status, ctx: &CallContext) -> Error {
    let category = classify(status.code, ctx);
    let message = if category != status.code.category() {
        let reason = if ctx.is_expired() {
            crate::error::msg::QUERY_DEADLINE_EXCEEDED
        } else {
            crate::error::msg::QUERY_CANCELLED
        };
        format!("{} ({})", message, reason)
    } else {
        message.to_string()
    };

    Error::Status {
        message,
        status,
        category,
    }
}

/// Wait for an operation status and classify it.
///
/// Blocks for at most `timeout`. A local timeout, interrupt or cancellation is
/// reported as [`Error::Local`]; if the caller's context already fired, that is
/// what gets reported, so a self-imposed deadline is never mistaken for a
/// server-side one.
pub fn join_status(
    operation: &str,
    promise: &Promise<Status>,
    ctx: &CallContext,
    timeout: Duration,
) -> Result<Status> {
    tracing::debug!("{}", operation);
    let started = Instant::now();

    let joined = promise.join_in(ctx, timeout);
    let elapsed = started.elapsed();

    let status = match joined {
        Ok(status) => status,
        Err(err) => {
            tracing::debug!("[{:?}] {} failed locally: {}", elapsed, operation, err);
            return Err(Error::Local(local_error(err, ctx)));
        }
    };

    if status.is_success() {
        tracing::debug!("[{:?}] {}", elapsed, status.code);
    } else {
        tracing::debug!("[{:?}] {}", elapsed, status);
    }

    validate(&format!("Cannot execute '{}'", operation), status, ctx)
}

/// Prefer the caller's context over the raw join failure.
fn local_error(err: LocalError, ctx: &CallContext) -> LocalError {
    if ctx.is_expired() {
        LocalError::DeadlineExceeded
    } else if ctx.is_cancelled() {
        LocalError::Cancelled
    } else {
        err
    }
}
