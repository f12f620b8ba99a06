//! State shared by everything attached to one running stream.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::classify;
use crate::error::{Error, LocalError};
use crate::promise::{CallContext, Promise};
use crate::protocol::session::StreamControl;
use crate::protocol::status::Status;
use crate::state::stream::{StreamState, StreamStateCell};

/// Terminal state, start signal and single-shot cancellation of one
/// execution.
pub(crate) struct ExecutionControl {
    message: String,
    ctx: CallContext,
    state: StreamStateCell,
    started: Promise<()>,
    stream: OnceLock<Box<dyn StreamControl>>,
    cancel_requested: AtomicBool,
    cancel_sent: AtomicBool,
}

impl ExecutionControl {
    pub fn new(message: String, ctx: CallContext) -> Self {
        Self {
            message,
            ctx,
            state: StreamStateCell::new(),
            started: Promise::new(),
            stream: OnceLock::new(),
            cancel_requested: AtomicBool::new(false),
            cancel_sent: AtomicBool::new(false),
        }
    }

    pub fn ctx(&self) -> &CallContext {
        &self.ctx
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn finish(&self, state: StreamState) -> bool {
        self.state.finish(state)
    }

    pub fn join(&self, timeout: Duration) -> Result<StreamState, LocalError> {
        self.state.join(timeout)
    }

    /// Signal that the first part arrived or the stream ended.
    pub fn mark_started(&self) {
        self.started.complete(());
    }

    pub fn is_started(&self) -> bool {
        self.started.is_done()
    }

    pub fn join_started(&self, timeout: Duration) -> Result<(), LocalError> {
        self.started.join_in(&self.ctx, timeout)
    }

    /// Attach the handle that stops the running stream. A cancellation
    /// requested before this point is delivered now.
    pub fn attach(&self, stream: Box<dyn StreamControl>) {
        if self.stream.set(stream).is_err() {
            tracing::warn!("Stream control attached twice");
            return;
        }
        if self.cancel_requested.load(Ordering::SeqCst) {
            self.send_cancel();
        }
    }

    /// Ask the server to stop the stream. Only the first request while the
    /// stream is running has any effect.
    pub fn request_cancel(&self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::debug!("Stream cancel");
        self.send_cancel();
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    fn send_cancel(&self) {
        if let Some(stream) = self.stream.get()
            && !self.cancel_sent.swap(true, Ordering::SeqCst)
        {
            stream.cancel();
        }
    }

    /// Error for a non-success stream status, classified against the
    /// execution's context.
    pub fn status_error(&self, status: Status) -> Error {
        let message = format!("Cannot execute '{}'", self.message);
        classify::status_error(&message, status, &self.ctx)
    }

    /// Error for a terminal state that did not succeed.
    pub fn terminal_error(&self, state: StreamState) -> Option<Error> {
        match state {
            StreamState::Running | StreamState::Success => None,
            StreamState::Failure(status) => Some(self.status_error(status)),
            StreamState::Error(err) => Some(Error::Local(err)),
            StreamState::Cancelled => Some(Error::Local(if self.ctx.is_expired() {
                LocalError::DeadlineExceeded
            } else {
                LocalError::Cancelled
            })),
        }
    }
}
