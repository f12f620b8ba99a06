//! Transaction state machine.
//!
//! ```text
//!            set_auto_commit(false)              first execution returns tx id
//! NoTransaction ───────────────────► Pending ───────────────────────────► Active(tx_id)
//!      ▲        ◄───────────────────    ▲   ◄──────────────────────────────┘
//!      │         set_auto_commit(true)  │      commit / rollback / tx closed
//!      └─ read-only isolation levels ───┘
//! ```
//!
//! The state only decides; the connection performs the I/O and feeds the
//! outcome back through the transition methods.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result, msg};
use crate::protocol::session::{SessionHandle, TxControl, TxMode};

/// Isolation / consistency level of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read-write serializable transactions
    #[default]
    SerializableRw,
    /// Read-only, consistent, latest data
    OnlineConsistentRo,
    /// Read-only, consistent, possibly stale data
    StaleConsistentRo,
    /// Read-only, latest data, no cross-read consistency
    OnlineInconsistentRo,
}

impl IsolationLevel {
    pub fn is_read_only(self) -> bool {
        self != IsolationLevel::SerializableRw
    }

    /// Transaction mode used when a transaction is started at this level.
    pub fn tx_mode(self) -> TxMode {
        match self {
            IsolationLevel::SerializableRw => TxMode::SerializableRw,
            IsolationLevel::OnlineConsistentRo => TxMode::OnlineRo {
                allow_inconsistent: false,
            },
            IsolationLevel::StaleConsistentRo => TxMode::StaleRo,
            IsolationLevel::OnlineInconsistentRo => TxMode::OnlineRo {
                allow_inconsistent: true,
            },
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serializable" | "SERIALIZABLE_READ_WRITE" => Ok(IsolationLevel::SerializableRw),
            "online-consistent" | "ONLINE_CONSISTENT_READ_ONLY" => {
                Ok(IsolationLevel::OnlineConsistentRo)
            }
            "stale" | "STALE_CONSISTENT_READ_ONLY" => Ok(IsolationLevel::StaleConsistentRo),
            "online-inconsistent" | "ONLINE_INCONSISTENT_READ_ONLY" => {
                Ok(IsolationLevel::OnlineInconsistentRo)
            }
            _ => Err(Error::Unsupported(format!(
                "Unsupported transaction level: {}",
                s
            ))),
        }
    }
}

/// How DDL interacts with an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemeQueryTxMode {
    /// Reject DDL while a transaction is open; the caller must commit first.
    #[default]
    CommitFirst,
    /// Commit the open transaction, then run the DDL on its own.
    ShadowCommit,
    /// Run the DDL outside the open transaction and leave it untouched.
    FakeTx,
}

impl FromStr for SchemeQueryTxMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COMMIT_FIRST" | "ERROR" => Ok(SchemeQueryTxMode::CommitFirst),
            "SHADOW_COMMIT" => Ok(SchemeQueryTxMode::ShadowCommit),
            "FAKE_TX" => Ok(SchemeQueryTxMode::FakeTx),
            _ => Err(Error::InvalidUsage(format!(
                "Invalid schemeQueryTxMode: expected one of ['COMMIT_FIRST', 'SHADOW_COMMIT', 'FAKE_TX'], got {}",
                s
            ))),
        }
    }
}

/// What the connection must do before running a DDL batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeAction {
    /// Run it; no transaction is open.
    Execute,
    /// Commit the open transaction first.
    CommitThenExecute,
    /// Run it outside the open transaction.
    ExecuteOutside,
}

/// Transaction state of one connection.
#[derive(Clone)]
pub enum TxState {
    /// Every execution is self-contained: auto-commit, or a read-only level.
    NoTransaction {
        auto_commit: bool,
        level: IsolationLevel,
    },
    /// Auto-commit off and nothing executed yet; the next execution begins a
    /// transaction.
    Pending { level: IsolationLevel },
    /// An explicit transaction is open and owns its session.
    Active {
        tx_id: String,
        session: SessionHandle,
        level: IsolationLevel,
    },
}

impl TxState {
    /// Initial state for a connection.
    pub fn new(auto_commit: bool, level: IsolationLevel) -> Self {
        if auto_commit || level.is_read_only() {
            TxState::NoTransaction { auto_commit, level }
        } else {
            TxState::Pending { level }
        }
    }

    pub fn auto_commit(&self) -> bool {
        match self {
            TxState::NoTransaction { auto_commit, .. } => *auto_commit,
            TxState::Pending { .. } | TxState::Active { .. } => false,
        }
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        match self {
            TxState::NoTransaction { level, .. }
            | TxState::Pending { level }
            | TxState::Active { level, .. } => *level,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.isolation_level().is_read_only()
    }

    /// Id of the open transaction, if any.
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            TxState::Active { tx_id, .. } => Some(tx_id),
            _ => None,
        }
    }

    /// Session owned by the open transaction, if any.
    pub fn session(&self) -> Option<&SessionHandle> {
        match self {
            TxState::Active { session, .. } => Some(session),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TxState::Active { .. })
    }

    /// Directive for the next data query.
    pub fn tx_control(&self) -> TxControl {
        match self {
            TxState::NoTransaction { auto_commit, level } => TxControl::Begin {
                mode: level.tx_mode(),
                commit: *auto_commit || level.is_read_only(),
            },
            TxState::Pending { level } => TxControl::Begin {
                mode: level.tx_mode(),
                commit: false,
            },
            TxState::Active { tx_id, .. } => TxControl::Continue {
                tx_id: tx_id.clone(),
                commit: false,
            },
        }
    }

    pub fn with_auto_commit(&self, auto_commit: bool) -> Result<TxState> {
        if auto_commit == self.auto_commit() {
            return Ok(self.clone());
        }
        if self.is_active() {
            return Err(Error::Unsupported(msg::CHANGE_ISOLATION_INSIDE_TX.into()));
        }
        Ok(TxState::new(auto_commit, self.isolation_level()))
    }

    pub fn with_isolation_level(&self, level: IsolationLevel) -> Result<TxState> {
        if level == self.isolation_level() {
            return Ok(self.clone());
        }
        if self.is_active() {
            return Err(Error::Unsupported(msg::CHANGE_ISOLATION_INSIDE_TX.into()));
        }
        Ok(TxState::new(self.auto_commit(), level))
    }

    /// Switch between read-write serializable and online consistent read-only.
    ///
    /// Other read-only levels are kept when read-only is requested again.
    pub fn with_read_only(&self, read_only: bool) -> Result<TxState> {
        if self.is_active() {
            return Err(Error::Unsupported(msg::READONLY_INSIDE_TRANSACTION.into()));
        }
        let level = self.isolation_level();
        let next = match (read_only, level.is_read_only()) {
            (true, false) => IsolationLevel::OnlineConsistentRo,
            (false, true) => IsolationLevel::SerializableRw,
            _ => level,
        };
        Ok(TxState::new(self.auto_commit(), next))
    }

    /// State after a successful commit. Releases the transaction's session.
    pub fn with_commit(&self) -> TxState {
        self.close_transaction()
    }

    /// State after a rollback. Releases the transaction's session.
    pub fn with_rollback(&self) -> TxState {
        self.close_transaction()
    }

    /// State after the server reported the transaction as gone (failed
    /// statement, expired transaction).
    pub fn with_invalidated(&self) -> TxState {
        self.close_transaction()
    }

    fn close_transaction(&self) -> TxState {
        match self {
            TxState::Active { tx_id, session, level } => {
                tracing::debug!("Clear TxID: {}", tx_id);
                session.release();
                TxState::new(false, *level)
            }
            other => other.clone(),
        }
    }

    /// Absorb the transaction id reported by an execution that ran with
    /// [`tx_control`](Self::tx_control) on `session`.
    ///
    /// An empty or missing id means the transaction is closed.
    pub fn with_tx_id(&self, tx_id: Option<&str>, session: &SessionHandle) -> Result<TxState> {
        let tx_id = tx_id.filter(|id| !id.is_empty());
        match (self, tx_id) {
            (TxState::NoTransaction { .. }, _) | (TxState::Pending { .. }, None) => Ok(self.clone()),
            (TxState::Pending { level }, Some(id)) => {
                tracing::debug!("New TxID: {}", id);
                Ok(TxState::Active {
                    tx_id: id.to_string(),
                    session: session.clone(),
                    level: *level,
                })
            }
            (TxState::Active { tx_id: current, .. }, Some(id)) if current == id => Ok(self.clone()),
            (TxState::Active { tx_id: current, .. }, Some(id)) => Err(Error::InvalidUsage(format!(
                "previous transaction {} not closed, but opened another one: {}",
                current, id
            ))),
            (TxState::Active { .. }, None) => Ok(self.close_transaction()),
        }
    }

    /// Decide how a DDL batch runs under `mode`.
    pub fn scheme_action(&self, mode: SchemeQueryTxMode) -> Result<SchemeAction> {
        if !self.is_active() {
            return Ok(SchemeAction::Execute);
        }
        match mode {
            SchemeQueryTxMode::CommitFirst => Err(Error::InvalidUsage(
                msg::SCHEME_QUERY_INSIDE_TRANSACTION.into(),
            )),
            SchemeQueryTxMode::ShadowCommit => Ok(SchemeAction::CommitThenExecute),
            SchemeQueryTxMode::FakeTx => Ok(SchemeAction::ExecuteOutside),
        }
    }
}

impl fmt::Debug for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::NoTransaction { auto_commit, level } => f
                .debug_struct("NoTransaction")
                .field("auto_commit", auto_commit)
                .field("level", level)
                .finish(),
            TxState::Pending { level } => f.debug_struct("Pending").field("level", level).finish(),
            TxState::Active { tx_id, session, level } => f
                .debug_struct("Active")
                .field("tx_id", tx_id)
                .field("session", &session.id())
                .field("level", level)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::handler::{PartsHandler, ScanHandler};
    use crate::promise::Promise;
    use crate::protocol::session::{Session, StreamControl};
    use crate::protocol::status::Status;
    use crate::query::Query;

    #[derive(Default)]
    struct CountingSession {
        closes: AtomicUsize,
    }

    struct NoopControl;

    impl StreamControl for NoopControl {
        fn cancel(&self) {}
    }

    impl Session for CountingSession {
        fn id(&self) -> &str {
            "session-1"
        }

        fn execute_query(
            &self,
            _query: &Query,
            _tx: &TxControl,
            _handler: Arc<dyn PartsHandler>,
        ) -> Box<dyn StreamControl> {
            Box::new(NoopControl)
        }

        fn execute_scan(
            &self,
            _query: &Query,
            _handler: Arc<dyn ScanHandler>,
        ) -> Box<dyn StreamControl> {
            Box::new(NoopControl)
        }

        fn commit(&self, _tx_id: &str) -> Promise<Status> {
            Promise::completed(Status::success())
        }

        fn rollback(&self, _tx_id: &str) -> Promise<Status> {
            Promise::completed(Status::success())
        }

        fn keep_alive(&self) -> Promise<Status> {
            Promise::completed(Status::success())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn active(tx_id: &str) -> (TxState, Arc<CountingSession>) {
        let session = Arc::new(CountingSession::default());
        let handle = SessionHandle::new(Arc::clone(&session) as Arc<dyn Session>);
        let state = TxState::new(false, IsolationLevel::SerializableRw)
            .with_tx_id(Some(tx_id), &handle)
            .unwrap();
        (state, session)
    }

    #[test]
    fn test_initial_states() {
        assert!(matches!(
            TxState::new(true, IsolationLevel::SerializableRw),
            TxState::NoTransaction { auto_commit: true, .. }
        ));
        assert!(matches!(
            TxState::new(false, IsolationLevel::SerializableRw),
            TxState::Pending { .. }
        ));
        // Read-only levels never open explicit transactions
        assert!(matches!(
            TxState::new(false, IsolationLevel::StaleConsistentRo),
            TxState::NoTransaction { auto_commit: false, .. }
        ));
    }

    #[test]
    fn test_tx_control() {
        assert_eq!(
            TxState::new(true, IsolationLevel::SerializableRw).tx_control(),
            TxControl::Begin {
                mode: TxMode::SerializableRw,
                commit: true
            }
        );
        assert_eq!(
            TxState::new(false, IsolationLevel::SerializableRw).tx_control(),
            TxControl::Begin {
                mode: TxMode::SerializableRw,
                commit: false
            }
        );
        assert_eq!(
            TxState::new(false, IsolationLevel::OnlineInconsistentRo).tx_control(),
            TxControl::Begin {
                mode: TxMode::OnlineRo {
                    allow_inconsistent: true
                },
                commit: true
            }
        );
        let (state, _session) = active("T1");
        assert_eq!(
            state.tx_control(),
            TxControl::Continue {
                tx_id: "T1".into(),
                commit: false
            }
        );
    }

    #[test]
    fn test_pending_captures_tx_id() {
        let (state, _session) = active("T1");
        assert_eq!(state.tx_id(), Some("T1"));
        assert!(!state.auto_commit());
    }

    #[test]
    fn test_changes_rejected_inside_transaction() {
        let (state, _session) = active("T1");
        assert!(state.with_auto_commit(true).unwrap_err().is_illegal_usage());
        assert!(
            state
                .with_isolation_level(IsolationLevel::StaleConsistentRo)
                .unwrap_err()
                .is_illegal_usage()
        );
        assert!(state.with_read_only(true).unwrap_err().is_illegal_usage());

        // Unchanged values are no-ops, even inside a transaction
        let same = state.with_auto_commit(false).unwrap();
        assert_eq!(same.tx_id(), Some("T1"));
        let same = state
            .with_isolation_level(IsolationLevel::SerializableRw)
            .unwrap();
        assert_eq!(same.tx_id(), Some("T1"));
    }

    #[test]
    fn test_commit_releases_session_once() {
        let (state, session) = active("T1");
        let after = state.with_commit();
        assert!(matches!(after, TxState::Pending { .. }));
        assert_eq!(after.tx_id(), None);
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);

        // The old state still holds a clone of the released handle
        let again = state.with_rollback();
        assert_eq!(again.tx_id(), None);
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_commit_without_transaction_is_noop() {
        let state = TxState::new(true, IsolationLevel::SerializableRw);
        assert!(matches!(
            state.with_commit(),
            TxState::NoTransaction { auto_commit: true, .. }
        ));
    }

    #[test]
    fn test_empty_tx_id_closes_transaction() {
        let (state, session) = active("T1");
        let handle = state.session().unwrap().clone();
        let after = state.with_tx_id(Some(""), &handle).unwrap();
        assert!(matches!(after, TxState::Pending { .. }));
        assert_eq!(session.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tx_id_is_immutable() {
        let (state, _session) = active("T1");
        let handle = state.session().unwrap().clone();
        assert!(state.with_tx_id(Some("T1"), &handle).is_ok());
        assert!(state.with_tx_id(Some("T2"), &handle).is_err());
    }

    #[test]
    fn test_read_only_toggle() {
        let state = TxState::new(true, IsolationLevel::SerializableRw);
        let ro = state.with_read_only(true).unwrap();
        assert_eq!(ro.isolation_level(), IsolationLevel::OnlineConsistentRo);
        let stale = ro
            .with_isolation_level(IsolationLevel::StaleConsistentRo)
            .unwrap();
        assert_eq!(
            stale.with_read_only(true).unwrap().isolation_level(),
            IsolationLevel::StaleConsistentRo
        );
        assert_eq!(
            stale.with_read_only(false).unwrap().isolation_level(),
            IsolationLevel::SerializableRw
        );
    }

    #[test]
    fn test_scheme_actions() {
        let idle = TxState::new(false, IsolationLevel::SerializableRw);
        assert_eq!(
            idle.scheme_action(SchemeQueryTxMode::CommitFirst).unwrap(),
            SchemeAction::Execute
        );

        let (state, _session) = active("T1");
        let err = state
            .scheme_action(SchemeQueryTxMode::CommitFirst)
            .unwrap_err();
        assert!(err.to_string().contains("Scheme query cannot be executed inside active transaction"));
        assert_eq!(
            state.scheme_action(SchemeQueryTxMode::ShadowCommit).unwrap(),
            SchemeAction::CommitThenExecute
        );
        assert_eq!(
            state.scheme_action(SchemeQueryTxMode::FakeTx).unwrap(),
            SchemeAction::ExecuteOutside
        );
    }

    #[test]
    fn test_parse_levels_and_modes() {
        assert_eq!(
            "stale".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::StaleConsistentRo
        );
        assert!("chaos".parse::<IsolationLevel>().is_err());
        assert_eq!(
            "SHADOW_COMMIT".parse::<SchemeQueryTxMode>().unwrap(),
            SchemeQueryTxMode::ShadowCommit
        );
        assert_eq!(
            "ERROR".parse::<SchemeQueryTxMode>().unwrap(),
            SchemeQueryTxMode::CommitFirst
        );
    }
}
