// ==========================================
// Precast tracking backend - batch worker pool
// ==========================================
// drafts → contiguous batches of `batch_size`
//        → at most `max_concurrency` batches in flight (semaphore)
//        → each batch persists its drafts sequentially
//        → BatchResult on an unbounded channel, report ordered by batch number
//
// Above the throttle threshold the concurrency is capped (default:
// more than 1000 drafts ⇒ at most 6 batches at once).
// The cancel token is checked before admitting each batch and before
// each draft; admitted work is always joined before returning.
// ==========================================

use crate::config::ImportConfig;
use crate::domain::{ElementTypeDraft, RowFailure, RowOutcome};
use crate::importer::cancel::CancelToken;
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

// ==========================================
// Seams
// ==========================================

/// Persists one draft.
///
/// `Ok(RowOutcome::Failed)` is a row-level failure; `Err` stops the
/// pipeline (`Cancelled`, pool exhaustion, fatal database error).
#[async_trait]
pub trait DraftPersister: Send + Sync {
    async fn persist(
        &self,
        draft: &ElementTypeDraft,
        cancel: &CancelToken,
    ) -> ImportResult<RowOutcome>;
}

/// Receives every row outcome as soon as it is known.
pub trait ProgressObserver: Send + Sync {
    fn record(&self, outcome: &RowOutcome);
}

/// Observer that ignores everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn record(&self, _outcome: &RowOutcome) {}
}

// ==========================================
// Results
// ==========================================
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// 1-based
    pub batch_number: usize,
    pub duration: Duration,
    /// element_type ids persisted by this batch
    pub successes: Vec<i64>,
    pub failures: Vec<RowFailure>,
    pub warnings: Vec<String>,
    /// Drafts never attempted because the batch stopped early
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Completed batches ordered by batch_number
    pub batches: Vec<BatchResult>,
    pub total_batches: usize,
    pub concurrency: usize,
    pub peak_concurrency: usize,
    pub cancelled: bool,
    /// Pipeline-stopping error, if any
    pub fatal: Option<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.successes.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|b| b.failures.len()).sum()
    }

    pub fn processed(&self) -> usize {
        self.succeeded() + self.failed()
    }
}

/// Contiguous index ranges of at most `batch_size` items.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

// ==========================================
// BatchPool
// ==========================================
pub struct BatchPool {
    persister: Arc<dyn DraftPersister>,
    config: ImportConfig,
}

impl BatchPool {
    pub fn new(persister: Arc<dyn DraftPersister>, config: ImportConfig) -> Self {
        Self { persister, config }
    }

    /// Persist `drafts` in batches.
    ///
    /// # Arguments
    /// - batch_size / max_concurrency: already clamped by the caller
    /// - cancel: stops admission of new batches and of new drafts
    /// - observer: notified after every draft
    pub async fn process(
        &self,
        drafts: Vec<ElementTypeDraft>,
        batch_size: usize,
        max_concurrency: usize,
        cancel: &CancelToken,
        observer: Arc<dyn ProgressObserver>,
    ) -> BatchReport {
        let concurrency = self
            .config
            .effective_concurrency(drafts.len(), max_concurrency);
        let ranges = partition(drafts.len(), batch_size);
        let total_batches = ranges.len();

        tracing::info!(
            drafts = drafts.len(),
            batch_size,
            requested_concurrency = max_concurrency,
            concurrency,
            total_batches,
            "batch processing started"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchResult>();
        let halt = CancelToken::new();
        let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(total_batches);

        for (idx, batch) in into_batches(drafts, &ranges).into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            if cancel.is_cancelled() || halt.is_cancelled() {
                tracing::info!(batch_number = idx + 1, "batch dispatch stopped");
                break;
            }

            let ctx = BatchContext {
                batch_number: idx + 1,
                persister: self.persister.clone(),
                observer: observer.clone(),
                cancel: cancel.clone(),
                halt: halt.clone(),
                fatal: fatal.clone(),
            };
            let tx = tx.clone();
            let active = active.clone();
            let peak = peak.clone();

            handles.push(tokio::spawn(async move {
                let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now_active, Ordering::SeqCst);

                let result = run_batch(ctx, batch).await;

                active.fetch_sub(1, Ordering::SeqCst);
                // receiver outlives every worker
                let _ = tx.send(result);
                drop(permit);
            }));
        }
        drop(tx);

        for outcome in futures::future::join_all(handles).await {
            if let Err(e) = outcome {
                tracing::error!(error = %e, "batch worker panicked");
                record_fatal(&fatal, format!("batch worker failed: {}", e));
            }
        }

        let mut results = Vec::with_capacity(total_batches);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results.sort_by_key(|r| r.batch_number);

        let fatal = fatal.lock().ok().and_then(|f| f.clone());
        let report = BatchReport {
            batches: results,
            total_batches,
            concurrency,
            peak_concurrency: peak.load(Ordering::SeqCst),
            cancelled: cancel.is_cancelled(),
            fatal,
        };

        tracing::info!(
            completed_batches = report.batches.len(),
            total_batches,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled,
            peak_concurrency = report.peak_concurrency,
            "batch processing finished"
        );
        report
    }
}

struct BatchContext {
    batch_number: usize,
    persister: Arc<dyn DraftPersister>,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelToken,
    halt: CancelToken,
    fatal: Arc<Mutex<Option<String>>>,
}

fn into_batches(drafts: Vec<ElementTypeDraft>, ranges: &[Range<usize>]) -> Vec<Vec<ElementTypeDraft>> {
    let mut iter = drafts.into_iter();
    ranges
        .iter()
        .map(|r| iter.by_ref().take(r.len()).collect())
        .collect()
}

fn record_fatal(slot: &Mutex<Option<String>>, message: String) {
    if let Ok(mut fatal) = slot.lock() {
        fatal.get_or_insert(message);
    }
}

async fn run_batch(ctx: BatchContext, drafts: Vec<ElementTypeDraft>) -> BatchResult {
    let started = Instant::now();
    let mut result = BatchResult {
        batch_number: ctx.batch_number,
        duration: Duration::ZERO,
        successes: Vec::new(),
        failures: Vec::new(),
        warnings: Vec::new(),
        skipped: 0,
    };

    let total = drafts.len();
    for (idx, draft) in drafts.iter().enumerate() {
        if ctx.halt.is_cancelled() {
            result.skipped = total - idx;
            break;
        }

        match ctx.persister.persist(draft, &ctx.cancel).await {
            Ok(outcome) => {
                ctx.observer.record(&outcome);
                match outcome {
                    RowOutcome::Persisted {
                        element_type_id,
                        warnings,
                        ..
                    } => {
                        result.successes.push(element_type_id);
                        result.warnings.extend(warnings);
                    }
                    RowOutcome::Failed(failure) => result.failures.push(failure),
                }
            }
            Err(ImportError::Cancelled) => {
                result.skipped = total - idx;
                break;
            }
            Err(e) => {
                tracing::error!(
                    batch_number = ctx.batch_number,
                    row_number = draft.row_number,
                    error = %e,
                    "batch aborted"
                );
                record_fatal(&ctx.fatal, e.to_string());
                ctx.halt.cancel();
                result.skipped = total - idx;
                break;
            }
        }
    }

    result.duration = started.elapsed();
    tracing::debug!(
        batch_number = result.batch_number,
        successes = result.successes.len(),
        failures = result.failures.len(),
        skipped = result.skipped,
        duration_ms = result.duration.as_millis() as u64,
        "batch finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimensions, RowFailureKind};
    use std::collections::HashSet;

    fn draft(row: usize) -> ElementTypeDraft {
        ElementTypeDraft {
            project_id: 1,
            row_number: row,
            code: format!("ET{}", row),
            name: format!("ET{}", row),
            dimensions: Dimensions::default(),
            density: 0.0,
            version_code: "VR-1".to_string(),
            stage_path: vec![],
            drawings: vec![],
            hierarchy_quantities: vec![],
            bom_lines: vec![],
            total_count_element: 0,
            created_by: None,
        }
    }

    /// Persists in memory; rejects repeated codes as duplicates.
    #[derive(Default)]
    struct MemoryPersister {
        seen: Mutex<HashSet<String>>,
        delay_ms: u64,
        fail_at_row: Option<usize>,
    }

    #[async_trait]
    impl DraftPersister for MemoryPersister {
        async fn persist(
            &self,
            draft: &ElementTypeDraft,
            cancel: &CancelToken,
        ) -> ImportResult<RowOutcome> {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            if self.fail_at_row == Some(draft.row_number) {
                return Err(ImportError::PoolExhausted("test".into()));
            }
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let fresh = self.seen.lock().unwrap().insert(draft.code.clone());
            if fresh {
                Ok(RowOutcome::Persisted {
                    element_type_id: draft.row_number as i64,
                    instances_created: 0,
                    warnings: vec![],
                })
            } else {
                Ok(RowOutcome::Failed(RowFailure::new(
                    draft.row_number,
                    Some(draft.code.clone()),
                    RowFailureKind::Duplicate,
                    "exists",
                )))
            }
        }
    }

    fn pool(persister: MemoryPersister) -> BatchPool {
        BatchPool::new(Arc::new(persister), ImportConfig::default())
    }

    #[test]
    fn test_partition_sizes() {
        for (n, b) in [(0usize, 30usize), (1, 30), (30, 30), (31, 30), (300, 30), (7, 3), (50, 1)] {
            let parts = partition(n, b);
            assert_eq!(parts.len(), (n + b - 1) / b, "n={} b={}", n, b);
            if n > 0 {
                assert_eq!(parts.last().unwrap().len(), ((n - 1) % b) + 1);
                assert_eq!(parts.iter().map(|r| r.len()).sum::<usize>(), n);
            }
        }
    }

    #[tokio::test]
    async fn test_process_reports_batches_in_order() {
        let pool = pool(MemoryPersister::default());
        let drafts: Vec<_> = (1..=95).map(draft).collect();

        let report = pool
            .process(drafts, 30, 3, &CancelToken::new(), Arc::new(NoProgress))
            .await;

        assert_eq!(report.total_batches, 4);
        assert_eq!(report.batches.len(), 4);
        let numbers: Vec<usize> = report.batches.iter().map(|b| b.batch_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(report.batches[3].successes.len(), 5);
        assert_eq!(report.succeeded(), 95);
        assert!(report.fatal.is_none());
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_row_failures_do_not_abort_batch() {
        let pool = pool(MemoryPersister::default());
        let mut drafts: Vec<_> = (1..=10).map(draft).collect();
        drafts[5].code = "ET1".to_string();

        let report = pool
            .process(drafts, 4, 2, &CancelToken::new(), Arc::new(NoProgress))
            .await;
        assert_eq!(report.succeeded(), 9);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.processed(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_throttling_caps_peak_concurrency() {
        let persister = MemoryPersister {
            delay_ms: 1,
            ..Default::default()
        };
        let pool = pool(persister);
        let drafts: Vec<_> = (1..=1001).map(draft).collect();

        let report = pool
            .process(drafts, 10, 20, &CancelToken::new(), Arc::new(NoProgress))
            .await;
        assert_eq!(report.concurrency, 6);
        assert!(report.peak_concurrency <= 6);
        assert_eq!(report.succeeded(), 1001);
    }

    #[tokio::test]
    async fn test_cancel_before_start_dispatches_nothing() {
        let pool = pool(MemoryPersister::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = pool
            .process((1..=20).map(draft).collect(), 5, 2, &cancel, Arc::new(NoProgress))
            .await;
        assert!(report.cancelled);
        assert!(report.batches.is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_stops_dispatch() {
        let persister = MemoryPersister {
            fail_at_row: Some(3),
            ..Default::default()
        };
        let pool = pool(persister);

        let report = pool
            .process((1..=50).map(draft).collect(), 5, 1, &CancelToken::new(), Arc::new(NoProgress))
            .await;
        assert!(report.fatal.is_some());
        assert_eq!(report.batches.len(), 1);
        assert_eq!(report.batches[0].successes.len(), 2);
        assert_eq!(report.batches[0].skipped, 3);
    }
}
