//! Repeated lookup failure detection.
//!
//! Counts failed collaborator lookups per normalized term within a run and
//! reports when a term has failed often enough that further lookups are
//! skipped, independent of any tool budget.

use dashmap::DashMap;

use crate::error::CollaboratorError;

/// Default threshold: stop looking a term up after this many failures.
pub const REPEATED_FAILURE_THRESHOLD: usize = 2;

pub struct FailureLedger {
    threshold: usize,
    counters: DashMap<String, usize>,
}

impl Default for FailureLedger {
    fn default() -> Self {
        Self::new(REPEATED_FAILURE_THRESHOLD)
    }
}

impl FailureLedger {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            counters: DashMap::new(),
        }
    }

    /// Record a failure for `term`. Returns a diagnostic once the term
    /// reaches the threshold.
    pub fn record(&self, term: &str, err: &CollaboratorError) -> Option<String> {
        let count = {
            let mut entry = self.counters.entry(term.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        (count >= self.threshold).then(|| {
            format!(
                "Skipping further lookups for '{}': failed {} times ({})",
                term,
                count,
                classify_error(err)
            )
        })
    }

    /// A success clears the term's counter; the collaborator recovered.
    pub fn clear(&self, term: &str) {
        self.counters.remove(term);
    }

    pub fn is_exhausted(&self, term: &str) -> bool {
        self.counters
            .get(term)
            .is_some_and(|count| *count >= self.threshold)
    }

    pub fn failures(&self, term: &str) -> usize {
        self.counters.get(term).map(|c| *c).unwrap_or(0)
    }
}

fn classify_error(err: &CollaboratorError) -> &'static str {
    match err {
        CollaboratorError::Timeout { .. } => "timeout",
        CollaboratorError::Unavailable { .. } => "unavailable",
        CollaboratorError::InvalidResponse { .. } => "invalid_response",
        CollaboratorError::Cancelled { .. } => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn timeout() -> CollaboratorError {
        CollaboratorError::Timeout {
            collaborator: "catalog",
            after: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_trips_at_threshold() {
        let ledger = FailureLedger::default();
        assert!(ledger.record("gmail", &timeout()).is_none());
        assert!(!ledger.is_exhausted("gmail"));

        let msg = ledger.record("gmail", &timeout()).unwrap();
        assert!(msg.contains("failed 2 times"));
        assert!(msg.contains("timeout"));
        assert!(ledger.is_exhausted("gmail"));
        assert!(!ledger.is_exhausted("slack"));
    }

    #[test]
    fn test_success_resets_term() {
        let ledger = FailureLedger::new(2);
        ledger.record("gmail", &CollaboratorError::unavailable("catalog", "down"));
        ledger.clear("gmail");
        assert_eq!(ledger.failures("gmail"), 0);
        assert!(ledger.record("gmail", &timeout()).is_none());
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let ledger = FailureLedger::new(0);
        assert!(ledger.record("x", &timeout()).is_some());
    }
}
