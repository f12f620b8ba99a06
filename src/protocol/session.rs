//! Session and client collaborators supplied by the transport layer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::handler::{PartsHandler, ScanHandler};
use crate::promise::Promise;
use crate::query::Query;

use super::status::Status;

/// Transaction mode requested for a new transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Read-write, serializable
    SerializableRw,
    /// Read-only over the latest data
    OnlineRo {
        /// Reads may observe data from different points in time
        allow_inconsistent: bool,
    },
    /// Read-only over slightly stale data
    StaleRo,
}

/// Transaction directive sent with one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxControl {
    /// Run outside any transaction (DDL, scans)
    None,
    /// Begin a new transaction
    Begin {
        mode: TxMode,
        /// Commit when the execution completes
        commit: bool,
    },
    /// Continue an already open transaction
    Continue {
        tx_id: String,
        /// Commit when the execution completes
        commit: bool,
    },
}

impl TxControl {
    /// Returns true if the transaction is committed together with the execution.
    pub fn commits(&self) -> bool {
        match self {
            TxControl::None => true,
            TxControl::Begin { commit, .. } | TxControl::Continue { commit, .. } => *commit,
        }
    }
}

/// Handle used to stop a running stream.
pub trait StreamControl: Send + Sync {
    /// Ask the server to stop producing parts. The stream still terminates
    /// through the handler, usually with a `Cancelled` status.
    fn cancel(&self);
}

/// Server-side session.
///
/// Every method except `close` is asynchronous: it returns immediately and
/// reports progress through a promise or a stream handler.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// Start a query over the multi-part stream.
    fn execute_query(
        &self,
        query: &Query,
        tx: &TxControl,
        handler: Arc<dyn PartsHandler>,
    ) -> Box<dyn StreamControl>;

    /// Start a read-only scan over the flat stream.
    fn execute_scan(&self, query: &Query, handler: Arc<dyn ScanHandler>) -> Box<dyn StreamControl>;

    fn commit(&self, tx_id: &str) -> Promise<Status>;

    fn rollback(&self, tx_id: &str) -> Promise<Status>;

    fn keep_alive(&self) -> Promise<Status>;

    /// Return the session to its owner. Called at most once per session by
    /// [`SessionHandle`].
    fn close(&self);
}

/// Result of a session creation attempt.
pub type SessionResult = Result<Arc<dyn Session>, Status>;

/// Factory of sessions.
pub trait Client: Send + Sync {
    fn create_session(&self) -> Promise<SessionResult>;
}

struct HandleInner {
    session: Arc<dyn Session>,
    released: AtomicBool,
}

/// Shared ownership of a session that is released exactly once.
///
/// Clones refer to the same session; [`release`](SessionHandle::release) from
/// any clone closes it, and subsequent calls are no-ops.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl SessionHandle {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                session,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn session(&self) -> &dyn Session {
        self.inner.session.as_ref()
    }

    pub fn id(&self) -> &str {
        self.inner.session.id()
    }

    /// Close the session. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        if self
            .inner
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        tracing::debug!("Release session {}", self.id());
        self.inner.session.close();
        true
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Returns true if both handles refer to the same session.
    pub fn same_as(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id())
            .field("released", &self.is_released())
            .finish()
    }
}
