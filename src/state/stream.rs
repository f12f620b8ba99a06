//! Terminal state of one server stream.

use std::time::Duration;

use crate::error::LocalError;
use crate::promise::Promise;
use crate::protocol::status::Status;

/// Lifecycle of a stream.
///
/// `Running` is the only non-terminal state. Once a terminal state is
/// recorded it never changes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamState {
    Running,
    /// The server finished with a success status
    Success,
    /// The server finished with a non-success status
    Failure(Status),
    /// The stream broke locally
    Error(LocalError),
    /// The stream was cancelled by the client
    Cancelled,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamState::Running)
    }
}

/// Write-once cell holding the terminal state of a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamStateCell {
    terminal: Promise<StreamState>,
}

impl StreamStateCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a terminal state. Returns `false` if one was already recorded
    /// or `state` is `Running`.
    pub fn finish(&self, state: StreamState) -> bool {
        if !state.is_terminal() {
            return false;
        }
        self.terminal.complete(state)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_done()
    }

    /// Current state.
    pub fn get(&self) -> StreamState {
        self.terminal.get().unwrap_or(StreamState::Running)
    }

    /// Wait for the terminal state.
    pub fn join(&self, timeout: Duration) -> Result<StreamState, LocalError> {
        self.terminal.join(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::StatusCode;

    #[test]
    fn test_terminal_state_is_final() {
        let cell = StreamStateCell::new();
        assert_eq!(cell.get(), StreamState::Running);
        assert!(!cell.finish(StreamState::Running));
        assert!(cell.finish(StreamState::Failure(Status::new(StatusCode::Aborted))));
        assert!(!cell.finish(StreamState::Success));
        assert!(!cell.finish(StreamState::Cancelled));
        assert_eq!(
            cell.get(),
            StreamState::Failure(Status::new(StatusCode::Aborted))
        );
    }

    #[test]
    fn test_join_times_out_while_running() {
        let cell = StreamStateCell::new();
        assert_eq!(
            cell.join(Duration::from_millis(10)),
            Err(LocalError::Timeout(Duration::from_millis(10)))
        );
    }
}
