// ==========================================
// Precast tracking backend - job progress
// ==========================================
// Single logical counter per job, shared by every batch worker.
// All updates happen under one mutex, so an observer always sees
// processed = succeeded + failed.
// ==========================================

use crate::domain::{ErrorSummary, JobCounters, RowFailure, RowFailureKind, RowOutcome};
use crate::importer::ProgressObserver;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct ProgressState {
    counters: JobCounters,
    errors: Vec<String>,
    seen_errors: HashSet<String>,
    warnings: Vec<String>,
    database_errors: usize,
}

#[derive(Debug)]
pub struct JobProgress {
    state: Mutex<ProgressState>,
    max_messages: usize,
}

impl JobProgress {
    /// `max_messages` bounds both the error and the warning list.
    pub fn new(max_messages: usize) -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            max_messages,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ProgressState) -> T) -> T {
        // a poisoned lock still holds consistent counters
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// One more non-blank row was read from the file.
    pub fn add_total(&self, rows: i64) {
        self.with_state(|s| s.counters.total += rows);
    }

    pub fn record_success(&self, warnings: &[String]) {
        let max = self.max_messages;
        self.with_state(|s| {
            s.counters.processed += 1;
            s.counters.succeeded += 1;
            for w in warnings {
                if s.warnings.len() < max {
                    s.warnings.push(w.clone());
                }
            }
        });
    }

    pub fn record_failure(&self, failure: &RowFailure) {
        let max = self.max_messages;
        let summary = failure.summary();
        self.with_state(|s| {
            s.counters.processed += 1;
            s.counters.failed += 1;
            if failure.kind == RowFailureKind::DatabaseError {
                s.database_errors += 1;
            }
            if s.errors.len() < max && s.seen_errors.insert(summary.clone()) {
                s.errors.push(summary);
            }
        });
    }

    pub fn add_warning(&self, warning: impl Into<String>) {
        let max = self.max_messages;
        let warning = warning.into();
        self.with_state(|s| {
            if s.warnings.len() < max {
                s.warnings.push(warning);
            }
        });
    }

    pub fn counters(&self) -> JobCounters {
        self.with_state(|s| s.counters)
    }

    /// Rows that failed with a database error (these fail the job).
    pub fn database_errors(&self) -> usize {
        self.with_state(|s| s.database_errors)
    }

    pub fn snapshot(&self) -> (JobCounters, ErrorSummary) {
        self.with_state(|s| {
            (
                s.counters,
                ErrorSummary {
                    reason: None,
                    errors: s.errors.clone(),
                    warnings: s.warnings.clone(),
                },
            )
        })
    }
}

impl ProgressObserver for JobProgress {
    fn record(&self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Persisted { warnings, .. } => self.record_success(warnings),
            RowOutcome::Failed(failure) => self.record_failure(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn failure(row: usize, kind: RowFailureKind) -> RowFailure {
        RowFailure::new(row, None, kind, "boom")
    }

    #[test]
    fn test_counters_stay_consistent() {
        let p = JobProgress::new(100);
        p.add_total(3);
        p.record_success(&[]);
        p.record_failure(&failure(3, RowFailureKind::Parse));
        p.record_failure(&failure(4, RowFailureKind::DatabaseError));

        let c = p.counters();
        assert_eq!(c.total, 3);
        assert_eq!(c.processed, 3);
        assert_eq!(c.processed, c.succeeded + c.failed);
        assert_eq!(p.database_errors(), 1);
    }

    #[test]
    fn test_error_list_is_bounded_and_distinct() {
        let p = JobProgress::new(2);
        p.record_failure(&failure(2, RowFailureKind::Duplicate));
        p.record_failure(&failure(2, RowFailureKind::Duplicate));
        p.record_failure(&failure(3, RowFailureKind::Duplicate));
        p.record_failure(&failure(4, RowFailureKind::Duplicate));

        let (counters, summary) = p.snapshot();
        assert_eq!(counters.failed, 4);
        assert_eq!(summary.errors.len(), 2);
        assert_ne!(summary.errors[0], summary.errors[1]);
    }

    #[test]
    fn test_concurrent_updates() {
        let p = Arc::new(JobProgress::new(10));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let p = p.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        p.record(&RowOutcome::Persisted {
                            element_type_id: 1,
                            instances_created: 0,
                            warnings: vec![],
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(p.counters().succeeded, 2000);
        assert_eq!(p.counters().processed, 2000);
    }
}
