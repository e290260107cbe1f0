//! Report log
//!
//! Append-only record of user reports. A report may reference a partner
//! from an already-ended room; filing one never touches pairing or room
//! state.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::info;

use crate::types::UserId;

/// A filed report
#[derive(Debug, Clone)]
pub struct Report {
    /// User who filed the report
    pub reporter_id: UserId,
    /// User being reported
    pub reported_id: UserId,
    /// Free-form reason supplied by the reporter
    pub reason: String,
    /// Filing time
    pub created_at: SystemTime,
}

/// Append-only in-memory report store
#[derive(Debug, Default)]
pub struct ReportLog {
    entries: Mutex<Vec<Report>>,
}

impl ReportLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Report>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a report
    pub fn file(&self, reporter_id: UserId, reported_id: UserId, reason: impl Into<String>) {
        let report = Report {
            reporter_id,
            reported_id,
            reason: reason.into(),
            created_at: SystemTime::now(),
        };
        info!("Report filed by {} against {}", reporter_id, reported_id);
        self.lock().push(report);
    }

    /// Number of filed reports
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all filed reports, in filing order
    pub fn snapshot(&self) -> Vec<Report> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_appends_in_order() {
        let log = ReportLog::new();
        let reporter = UserId::new();
        let first = UserId::new();
        let second = UserId::new();

        assert!(log.is_empty());
        log.file(reporter, first, "spamming");
        log.file(reporter, second, "abusive");

        let reports = log.snapshot();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].reported_id, first);
        assert_eq!(reports[0].reason, "spamming");
        assert_eq!(reports[1].reported_id, second);
    }
}
