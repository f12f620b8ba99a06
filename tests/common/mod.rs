//! Scripted in-process server used by the integration tests.
//!
//! Each execution pops the next script from the queue and plays it on its own
//! thread, the way a transport delivers parts from its I/O thread.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use zero_ydb::error::LocalError;
use zero_ydb::{
    Client, ColumnInfo, Issue, PartsHandler, Promise, Query, Row, RowBatch, ScanHandler, Session,
    SessionResult, Status, StatusCode, StreamControl, TxControl, Value,
};

/// One step of a scripted stream.
#[derive(Clone)]
pub enum Event {
    TxMeta(String),
    Part(usize, RowBatch),
    Issues(Vec<Issue>),
    Finish(Status),
    Fail(LocalError),
    /// Block until the client cancels, then finish with `CANCELLED`.
    AwaitCancel,
    Sleep(Duration),
}

/// Single-column `id Int64` batch.
pub fn batch(ids: impl IntoIterator<Item = i64>) -> RowBatch {
    let columns: Arc<[ColumnInfo]> = Arc::from(vec![ColumnInfo::new("id", "Int64")]);
    let rows = ids
        .into_iter()
        .map(|id| Row::new(vec![Value::Int(id)]))
        .collect();
    RowBatch::new(columns, rows)
}

/// Two-column `id Int64, name Utf8` batch.
pub fn named_batch(rows: &[(i64, &str)]) -> RowBatch {
    let columns: Arc<[ColumnInfo]> = Arc::from(vec![
        ColumnInfo::new("id", "Int64"),
        ColumnInfo::new("name", "Utf8"),
    ]);
    let rows = rows
        .iter()
        .map(|(id, name)| Row::new(vec![Value::Int(*id), Value::Text(name.to_string())]))
        .collect();
    RowBatch::new(columns, rows)
}

pub fn ok() -> Event {
    Event::Finish(Status::success())
}

pub fn fail(code: StatusCode) -> Event {
    Event::Finish(Status::new(code))
}

/// A call observed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute {
        session: String,
        text: String,
        tx: TxControl,
    },
    Scan {
        session: String,
        text: String,
    },
    Commit {
        session: String,
        tx_id: String,
    },
    Rollback {
        session: String,
        tx_id: String,
    },
    KeepAlive {
        session: String,
    },
}

#[derive(Default)]
struct ServerState {
    scripts: Mutex<VecDeque<Vec<Event>>>,
    commit_results: Mutex<VecDeque<Status>>,
    rollback_results: Mutex<VecDeque<Status>>,
    calls: Mutex<Vec<Call>>,
    sessions_created: AtomicUsize,
    sessions_closed: AtomicUsize,
    cancels: AtomicUsize,
    players: Mutex<Vec<thread::JoinHandle<()>>>,
}

/// Fake server shared by the client, its sessions and the test.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<ServerState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self) -> Arc<dyn Client> {
        Arc::new(FakeClient {
            server: self.clone(),
        })
    }

    /// Queue the script for the next execution.
    pub fn script(&self, events: Vec<Event>) -> &Self {
        self.state.scripts.lock().push_back(events);
        self
    }

    /// Queue the status of the next commit. Commits succeed by default.
    pub fn commit_result(&self, status: Status) -> &Self {
        self.state.commit_results.lock().push_back(status);
        self
    }

    /// Queue the status of the next rollback. Rollbacks succeed by default.
    pub fn rollback_result(&self, status: Status) -> &Self {
        self.state.rollback_results.lock().push_back(status);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().clone()
    }

    pub fn executed(&self) -> Vec<(String, TxControl)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute { text, tx, .. } => Some((text, tx)),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Commit { tx_id, .. } => Some(tx_id),
                _ => None,
            })
            .collect()
    }

    pub fn rollbacks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Rollback { tx_id, .. } => Some(tx_id),
                _ => None,
            })
            .collect()
    }

    pub fn sessions_created(&self) -> usize {
        self.state.sessions_created.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    /// Wait for every stream played so far to deliver its last event.
    pub fn wait_idle(&self) {
        let players: Vec<_> = self.state.players.lock().drain(..).collect();
        for player in players {
            player.join().unwrap();
        }
    }

    fn next_script(&self) -> Vec<Event> {
        self.state
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![ok()])
    }

    fn record(&self, call: Call) {
        self.state.calls.lock().push(call);
    }

    fn play(&self, sink: Sink, events: Vec<Event>) -> Box<dyn StreamControl> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let control = FakeControl {
            cancelled: Arc::clone(&cancelled),
            server: self.clone(),
        };
        let player = thread::spawn(move || {
            for event in events {
                if cancelled.load(Ordering::SeqCst) {
                    sink.finish(Status::new(StatusCode::Cancelled));
                    return;
                }
                match event {
                    Event::TxMeta(tx_id) => sink.tx_meta(tx_id),
                    Event::Part(index, batch) => sink.part(index, batch),
                    Event::Issues(issues) => sink.issues(issues),
                    Event::Finish(status) => sink.finish(status),
                    Event::Fail(err) => sink.fail(err),
                    Event::AwaitCancel => {
                        while !cancelled.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(5));
                        }
                        sink.finish(Status::new(StatusCode::Cancelled));
                        return;
                    }
                    Event::Sleep(duration) => thread::sleep(duration),
                }
            }
        });
        self.state.players.lock().push(player);
        Box::new(control)
    }
}

enum Sink {
    Parts(Arc<dyn PartsHandler>),
    Scan(Arc<dyn ScanHandler>),
}

impl Sink {
    fn tx_meta(&self, tx_id: String) {
        if let Sink::Parts(handler) = self {
            handler.on_tx_meta(tx_id);
        }
    }

    fn part(&self, index: usize, batch: RowBatch) {
        match self {
            Sink::Parts(handler) => handler.on_next_part(index, batch),
            Sink::Scan(handler) => handler.on_next(batch),
        }
    }

    fn issues(&self, issues: Vec<Issue>) {
        if let Sink::Parts(handler) = self {
            handler.on_issues(issues);
        }
    }

    fn finish(&self, status: Status) {
        match self {
            Sink::Parts(handler) => handler.on_finished(status),
            Sink::Scan(handler) => handler.on_finished(status),
        }
    }

    fn fail(&self, err: LocalError) {
        match self {
            Sink::Parts(handler) => handler.on_error(err),
            Sink::Scan(handler) => handler.on_error(err),
        }
    }
}

struct FakeControl {
    cancelled: Arc<AtomicBool>,
    server: FakeServer,
}

impl StreamControl for FakeControl {
    fn cancel(&self) {
        self.server.state.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct FakeClient {
    server: FakeServer,
}

impl Client for FakeClient {
    fn create_session(&self) -> Promise<SessionResult> {
        let n = self.server.state.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        let session: Arc<dyn Session> = Arc::new(FakeSession {
            id: format!("session-{}", n),
            server: self.server.clone(),
        });
        Promise::completed(Ok(session))
    }
}

struct FakeSession {
    id: String,
    server: FakeServer,
}

impl Session for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute_query(
        &self,
        query: &Query,
        tx: &TxControl,
        handler: Arc<dyn PartsHandler>,
    ) -> Box<dyn StreamControl> {
        self.server.record(Call::Execute {
            session: self.id.clone(),
            text: query.text().to_string(),
            tx: tx.clone(),
        });
        let events = self.server.next_script();
        self.server.play(Sink::Parts(handler), events)
    }

    fn execute_scan(&self, query: &Query, handler: Arc<dyn ScanHandler>) -> Box<dyn StreamControl> {
        self.server.record(Call::Scan {
            session: self.id.clone(),
            text: query.text().to_string(),
        });
        let events = self.server.next_script();
        self.server.play(Sink::Scan(handler), events)
    }

    fn commit(&self, tx_id: &str) -> Promise<Status> {
        self.server.record(Call::Commit {
            session: self.id.clone(),
            tx_id: tx_id.to_string(),
        });
        let status = self
            .server
            .state
            .commit_results
            .lock()
            .pop_front()
            .unwrap_or_else(Status::success);
        Promise::completed(status)
    }

    fn rollback(&self, tx_id: &str) -> Promise<Status> {
        self.server.record(Call::Rollback {
            session: self.id.clone(),
            tx_id: tx_id.to_string(),
        });
        let status = self
            .server
            .state
            .rollback_results
            .lock()
            .pop_front()
            .unwrap_or_else(Status::success);
        Promise::completed(status)
    }

    fn keep_alive(&self) -> Promise<Status> {
        self.server.record(Call::KeepAlive {
            session: self.id.clone(),
        });
        Promise::completed(Status::success())
    }

    fn close(&self) {
        self.server.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}
