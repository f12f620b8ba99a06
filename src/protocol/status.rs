//! Operation status and issues reported by the server.

use std::fmt;

/// Status code of a server operation or a client-side transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    BadRequest,
    Unauthorized,
    InternalError,
    Aborted,
    Unavailable,
    Overloaded,
    SchemeError,
    GenericError,
    Timeout,
    BadSession,
    PreconditionFailed,
    AlreadyExists,
    NotFound,
    SessionExpired,
    Cancelled,
    Undetermined,
    Unsupported,
    SessionBusy,

    // Client-side codes
    TransportUnavailable,
    ClientResourceExhausted,
    ClientDeadlineExceeded,
    ClientInternalError,
    ClientCancelled,
    ClientUnauthenticated,
    ClientCallUnimplemented,
    ClientDiscoveryFailed,
    ClientLimitsReached,

    /// Placeholder used when no status was produced
    Unused,

    /// Code not known to this client
    Other(i32),
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::BadRequest => "BAD_REQUEST",
            StatusCode::Unauthorized => "UNAUTHORIZED",
            StatusCode::InternalError => "INTERNAL_ERROR",
            StatusCode::Aborted => "ABORTED",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::Overloaded => "OVERLOADED",
            StatusCode::SchemeError => "SCHEME_ERROR",
            StatusCode::GenericError => "GENERIC_ERROR",
            StatusCode::Timeout => "TIMEOUT",
            StatusCode::BadSession => "BAD_SESSION",
            StatusCode::PreconditionFailed => "PRECONDITION_FAILED",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::SessionExpired => "SESSION_EXPIRED",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Undetermined => "UNDETERMINED",
            StatusCode::Unsupported => "UNSUPPORTED",
            StatusCode::SessionBusy => "SESSION_BUSY",
            StatusCode::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            StatusCode::ClientResourceExhausted => "CLIENT_RESOURCE_EXHAUSTED",
            StatusCode::ClientDeadlineExceeded => "CLIENT_DEADLINE_EXCEEDED",
            StatusCode::ClientInternalError => "CLIENT_INTERNAL_ERROR",
            StatusCode::ClientCancelled => "CLIENT_CANCELLED",
            StatusCode::ClientUnauthenticated => "CLIENT_UNAUTHENTICATED",
            StatusCode::ClientCallUnimplemented => "CLIENT_CALL_UNIMPLEMENTED",
            StatusCode::ClientDiscoveryFailed => "CLIENT_DISCOVERY_FAILED",
            StatusCode::ClientLimitsReached => "CLIENT_LIMITS_REACHED",
            StatusCode::Unused => "UNUSED_STATUS",
            StatusCode::Other(code) => return write!(f, "STATUS_{}", code),
        };
        f.write_str(name)
    }
}

/// Severity of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssueSeverity {
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueSeverity::Fatal => "S_FATAL",
            IssueSeverity::Error => "S_ERROR",
            IssueSeverity::Warning => "S_WARNING",
            IssueSeverity::Info => "S_INFO",
        })
    }
}

/// Diagnostic attached to a status. Issues may nest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Issue {
    /// Issue code (0 if absent)
    pub code: u32,
    /// Human-readable message
    pub message: String,
    pub severity: IssueSeverity,
    /// Child issues
    pub nested: Vec<Issue>,
}

impl Issue {
    /// Create an issue without children.
    pub fn new(code: u32, message: impl Into<String>, severity: IssueSeverity) -> Self {
        Self {
            code,
            message: message.into(),
            severity,
            nested: Vec::new(),
        }
    }

    /// Create a warning-level issue.
    pub fn warning(code: u32, message: impl Into<String>) -> Self {
        Self::new(code, message, IssueSeverity::Warning)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        if self.code != 0 {
            write!(f, "#{} ", self.code)?;
        }
        write!(f, "{} ({})", self.message, self.severity)?;
        for child in &self.nested {
            f.write_str("\n")?;
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Status of a server operation: a code plus its issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub issues: Vec<Issue>,
}

impl Status {
    /// Status with no issues.
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            issues: Vec::new(),
        }
    }

    /// The successful status.
    pub fn success() -> Self {
        Self::new(StatusCode::Success)
    }

    /// Attach issues.
    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status{{code = {}", self.code)?;
        if !self.issues.is_empty() {
            f.write_str(", issues = [")?;
            for (i, issue) in self.issues.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", issue)?;
            }
            f.write_str("]")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display_nested() {
        let mut parent = Issue::new(1060, "Execution", IssueSeverity::Warning);
        parent.nested.push(Issue::warning(2503, "Given predicate is not suitable"));
        assert_eq!(
            parent.to_string(),
            "#1060 Execution (S_WARNING)\n  #2503 Given predicate is not suitable (S_WARNING)"
        );
    }

    #[test]
    fn test_status_display() {
        let status = Status::new(StatusCode::SchemeError)
            .with_issues(vec![Issue::new(0, "Unknown table", IssueSeverity::Error)]);
        assert_eq!(
            status.to_string(),
            "Status{code = SCHEME_ERROR, issues = [Unknown table (S_ERROR)]}"
        );
    }
}
