//! Synchronous YDB connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::classify::{join_status, status_error};
use crate::error::{Error, Result, msg};
use crate::opts::Opts;
use crate::promise::CallContext;
use crate::protocol::session::{Client, SessionHandle, TxControl};
use crate::protocol::status::{Issue, StatusCode};
use crate::query::{Query, QueryType};
use crate::result::dispatcher::ExecutionListener;
use crate::result::execution::{Execution, ExecutionSettings};
use crate::row::FromRow;
use crate::state::stream::StreamState;
use crate::state::transaction::{IsolationLevel, SchemeAction, SchemeQueryTxMode, TxState};
use crate::warnings::Warnings;

/// Keeps the connection's transaction state in sync with one execution.
///
/// Adopts the transaction id the server reports, drops the transaction when
/// the execution fails inside it, and releases the execution's session unless
/// an open transaction now owns it.
struct TxTracker {
    tx: Arc<Mutex<TxState>>,
    session: SessionHandle,
    track_tx_id: bool,
}

impl ExecutionListener for TxTracker {
    fn on_tx_id(&self, tx_id: &str) {
        if !self.track_tx_id {
            return;
        }
        let mut tx = self.tx.lock();
        match tx.with_tx_id(Some(tx_id), &self.session) {
            Ok(next) => *tx = next,
            Err(err) => tracing::warn!("{}", err),
        }
    }

    fn on_finished(&self, state: &StreamState) {
        let mut tx = self.tx.lock();
        let owned = tx.session().is_some_and(|s| s.same_as(&self.session));
        if !owned {
            self.session.release();
        } else if *state != StreamState::Success {
            *tx = tx.with_invalidated();
        }
    }
}

/// Synchronous YDB connection.
///
/// Sessions are taken from the [`Client`] per execution and kept only while a
/// transaction is open.
pub struct Conn {
    client: Arc<dyn Client>,
    opts: Opts,
    tx: Arc<Mutex<TxState>>,
    warnings: Warnings,
    ctx: CallContext,
    closed: bool,
}

impl Conn {
    /// Create a connection over `client`. No session is created until the
    /// first execution.
    pub fn new<O: TryInto<Opts>>(client: Arc<dyn Client>, opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let tx = TxState::new(opts.auto_commit, opts.isolation_level);
        Ok(Self {
            client,
            opts,
            tx: Arc::new(Mutex::new(tx)),
            warnings: Warnings::new(),
            ctx: CallContext::new(),
            closed: false,
        })
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed(msg::CLOSED_CONNECTION.into()));
        }
        Ok(())
    }

    /// Id of the open transaction, if any.
    pub fn tx_id(&self) -> Option<String> {
        self.tx.lock().tx_id().map(str::to_string)
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.lock().is_active()
    }

    pub fn auto_commit(&self) -> bool {
        self.tx.lock().auto_commit()
    }

    /// Change the commit mode. Fails inside an open transaction.
    pub fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.ensure_open()?;
        let mut tx = self.tx.lock();
        *tx = tx.with_auto_commit(auto_commit)?;
        tracing::debug!("Set auto-commit: {}", auto_commit);
        Ok(())
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.tx.lock().isolation_level()
    }

    /// Change the isolation level. Fails inside an open transaction.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        let mut tx = self.tx.lock();
        *tx = tx.with_isolation_level(level)?;
        tracing::debug!("Set transaction isolation level: {:?}", level);
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.tx.lock().is_read_only()
    }

    /// Switch between read-write and read-only mode. Fails inside an open
    /// transaction.
    pub fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.ensure_open()?;
        let mut tx = self.tx.lock();
        *tx = tx.with_read_only(read_only)?;
        Ok(())
    }

    pub fn scheme_query_tx_mode(&self) -> SchemeQueryTxMode {
        self.opts.scheme_query_tx_mode
    }

    /// Context of the most recent execution. Cancelling it from another
    /// thread aborts that execution's blocking waits and stops its stream.
    pub fn cancel_context(&self) -> CallContext {
        self.ctx.clone()
    }

    /// Warnings collected by the most recent operation.
    pub fn warnings(&self) -> Vec<Issue> {
        self.warnings.snapshot()
    }

    pub fn clear_warnings(&self) {
        self.warnings.clear();
    }

    fn create_session(&self, ctx: &CallContext) -> Result<SessionHandle> {
        let started = Instant::now();
        let created = self
            .client
            .create_session()
            .join_in(ctx, self.opts.join_duration)?;
        match created {
            Ok(session) => {
                tracing::debug!("[{:?}] Session {} created", started.elapsed(), session.id());
                Ok(SessionHandle::new(session))
            }
            Err(status) => Err(status_error("Cannot create session", status, ctx)),
        }
    }

    /// Start executing `query` and return once its first part arrived or the
    /// stream ended.
    ///
    /// A stream that fails before producing any part fails here. Later
    /// failures surface when the affected result set is read.
    pub fn execute(&mut self, query: &Query) -> Result<Execution> {
        self.ensure_open()?;
        self.warnings.clear();

        let ctx = match self.opts.query_timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::new(),
        };
        self.ctx = ctx.clone();

        let (session, tx_control) = match query.query_type() {
            QueryType::Scheme => {
                let action = self.tx.lock().scheme_action(self.opts.scheme_query_tx_mode)?;
                if action == SchemeAction::CommitThenExecute {
                    tracing::debug!("Commit before scheme query");
                    self.commit()?;
                }
                (self.create_session(&ctx)?, TxControl::None)
            }
            QueryType::Scan => {
                if self.tx.lock().is_active() {
                    return Err(Error::InvalidUsage(msg::SCAN_QUERY_INSIDE_TRANSACTION.into()));
                }
                (self.create_session(&ctx)?, TxControl::None)
            }
            QueryType::Data => {
                let (owned, tx_control) = {
                    let tx = self.tx.lock();
                    (tx.session().cloned(), tx.tx_control())
                };
                let session = match owned {
                    Some(session) => session,
                    None => self.create_session(&ctx)?,
                };
                (session, tx_control)
            }
        };

        tracing::debug!(
            "Executing '{}' on session {} with {:?}",
            query.text(),
            session.id(),
            tx_control
        );

        let tracker = TxTracker {
            tx: Arc::clone(&self.tx),
            session: session.clone(),
            track_tx_id: query.query_type() == QueryType::Data,
        };
        let (execution, dispatcher) = Execution::prepare(
            query,
            ExecutionSettings::from(&self.opts),
            ctx,
            self.warnings.clone(),
            Some(Box::new(tracker)),
        );

        let stream = match query.query_type() {
            QueryType::Scan => session.session().execute_scan(query, dispatcher),
            QueryType::Scheme | QueryType::Data => {
                session
                    .session()
                    .execute_query(query, &tx_control, dispatcher)
            }
        };
        execution.control().attach(stream);
        execution.wait_started()?;
        Ok(execution)
    }

    /// Execute `query` and discard its results.
    pub fn query_drop(&mut self, query: &Query) -> Result<()> {
        let mut execution = self.execute(query)?;
        execution.close()
    }

    /// Execute `query` and collect the rows of its first result set.
    pub fn query_collect<T: FromRow>(&mut self, query: &Query) -> Result<Vec<T>> {
        let mut execution = self.execute(query)?;
        let mut rows = Vec::new();
        for index in 0..execution.statement_count() {
            if let Some(cursor) = execution.result_set(index)? {
                while cursor.next()? {
                    rows.push(cursor.current_as::<T>()?);
                }
                break;
            }
        }
        execution.close()?;
        Ok(rows)
    }

    /// Commit the open transaction. No-op without one.
    ///
    /// If the server no longer knows the transaction, it is dropped locally and
    /// the error is still returned.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some((tx_id, session)) = self.open_transaction() else {
            return Ok(());
        };
        self.warnings.clear();

        let result = join_status(
            "Commit",
            &session.session().commit(&tx_id),
            &CallContext::new(),
            self.opts.join_duration,
        );
        match result {
            Ok(status) => {
                self.warnings.add_status(&status);
                self.clear_tx();
                Ok(())
            }
            Err(err) => {
                if err.status_code() == Some(StatusCode::NotFound) {
                    self.clear_tx();
                }
                Err(err)
            }
        }
    }

    /// Roll back the open transaction. No-op without one.
    ///
    /// A transaction the server no longer knows is dropped locally with a
    /// warning.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let Some((tx_id, session)) = self.open_transaction() else {
            return Ok(());
        };
        self.warnings.clear();

        let result = join_status(
            "Rollback",
            &session.session().rollback(&tx_id),
            &CallContext::new(),
            self.opts.join_duration,
        );
        match result {
            Ok(status) => {
                self.warnings.add_status(&status);
                self.clear_tx();
                Ok(())
            }
            Err(err) if err.status_code() == Some(StatusCode::NotFound) => {
                tracing::warn!(
                    "Unable to rollback transaction {}, it seems the transaction is expired: {}",
                    tx_id,
                    err
                );
                self.clear_tx();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn open_transaction(&self) -> Option<(String, SessionHandle)> {
        let tx = self.tx.lock();
        match (tx.tx_id(), tx.session()) {
            (Some(tx_id), Some(session)) => Some((tx_id.to_string(), session.clone())),
            _ => None,
        }
    }

    fn clear_tx(&self) {
        let mut tx = self.tx.lock();
        *tx = tx.with_commit();
    }

    /// Run `f` inside an explicit transaction.
    ///
    /// The transaction is committed if `f` returns `Ok` and rolled back
    /// otherwise. Auto-commit is restored afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if a transaction is already open.
    pub fn run_transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Conn) -> Result<R>,
    {
        self.ensure_open()?;
        if self.in_transaction() {
            return Err(Error::InvalidUsage("nested transactions are not supported".into()));
        }

        let restore_auto_commit = self.auto_commit();
        if restore_auto_commit {
            self.set_auto_commit(false)?;
        }

        let outcome = match f(self) {
            Ok(value) => self.commit().map(|()| value),
            Err(err) => Err(err),
        };
        if outcome.is_err()
            && let Err(err) = self.rollback()
        {
            tracing::warn!("Rollback after failed transaction: {}", err);
        }

        if restore_auto_commit {
            let restored = self.set_auto_commit(true);
            if outcome.is_ok() {
                restored?;
            }
        }
        outcome
    }

    /// Check the connection by pinging a session within `timeout`.
    pub fn is_valid(&self, timeout: Duration) -> bool {
        if self.closed {
            return false;
        }
        let ctx = CallContext::with_timeout(timeout);
        let owned = self.tx.lock().session().cloned();
        let session = match owned {
            Some(session) => session,
            None => match self.create_session(&ctx) {
                Ok(session) => session,
                Err(err) => {
                    tracing::debug!("Keep alive failed: {}", err);
                    return false;
                }
            },
        };

        let result = join_status("Keep alive", &session.session().keep_alive(), &ctx, timeout);
        if !self.tx.lock().session().is_some_and(|s| s.same_as(&session)) {
            session.release();
        }
        result.is_ok()
    }

    /// Close the connection. An open transaction is rolled back best-effort
    /// and its session released. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.warnings.clear();
        let rolled_back = self.rollback();
        self.closed = true;
        self.clear_tx();
        tracing::debug!("Connection closed");
        rolled_back
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("tx", &*self.tx.lock())
            .field("closed", &self.closed)
            .finish()
    }
}
