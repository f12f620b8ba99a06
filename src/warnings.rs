//! Connection-level store of non-fatal issues.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::status::{Issue, Status};

/// Issues accumulated by a connection, shared with the streams it starts.
///
/// Warnings are never raised as errors; callers read them with
/// [`snapshot`](Warnings::snapshot) and reset them with
/// [`clear`](Warnings::clear).
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    issues: Arc<Mutex<Vec<Issue>>>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issues(&self, issues: impl IntoIterator<Item = Issue>) {
        let mut store = self.issues.lock();
        for issue in issues {
            tracing::debug!("Issue: {}", issue);
            store.push(issue);
        }
    }

    /// Record the issues attached to `status`.
    pub fn add_status(&self, status: &Status) {
        if !status.issues.is_empty() {
            self.add_issues(status.issues.iter().cloned());
        }
    }

    pub fn snapshot(&self) -> Vec<Issue> {
        self.issues.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }

    pub fn clear(&self) {
        self.issues.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::StatusCode;

    #[test]
    fn test_accumulate_and_clear() {
        let warnings = Warnings::new();
        let shared = warnings.clone();
        shared.add_issues(vec![Issue::warning(1030, "Type annotation")]);
        warnings.add_status(
            &Status::success().with_issues(vec![Issue::warning(2503, "Key column")]),
        );
        warnings.add_status(&Status::new(StatusCode::Success));

        let issues = warnings.snapshot();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].code, 2503);

        shared.clear();
        assert!(warnings.is_empty());
    }
}
