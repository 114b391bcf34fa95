// ==========================================
// Precast tracking backend - live job registry
// ==========================================
// Process-global job_id → (cancel token, progress), one mutex.
// Registered when the background task starts, removed when the job
// reaches a terminal state.
// ==========================================

use crate::importer::CancelToken;
use crate::jobs::progress::JobProgress;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct JobHandle {
    pub cancel: CancelToken,
    pub progress: Arc<JobProgress>,
}

impl JobHandle {
    pub fn new(max_messages: usize) -> Self {
        Self {
            cancel: CancelToken::new(),
            progress: Arc::new(JobProgress::new(max_messages)),
        }
    }
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_jobs<T>(&self, f: impl FnOnce(&mut HashMap<String, JobHandle>) -> T) -> T {
        let mut guard = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn register(&self, job_id: &str, handle: JobHandle) {
        self.with_jobs(|jobs| {
            jobs.insert(job_id.to_string(), handle);
        });
    }

    pub fn deregister(&self, job_id: &str) -> Option<JobHandle> {
        self.with_jobs(|jobs| jobs.remove(job_id))
    }

    pub fn get(&self, job_id: &str) -> Option<JobHandle> {
        self.with_jobs(|jobs| jobs.get(job_id).cloned())
    }

    /// Signal a live job. Returns false when the job is not registered.
    pub fn cancel(&self, job_id: &str) -> bool {
        self.with_jobs(|jobs| match jobs.get(job_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        })
    }

    /// Signal every live job; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        self.with_jobs(|jobs| {
            for handle in jobs.values() {
                handle.cancel.cancel();
            }
            jobs.len()
        })
    }

    pub fn len(&self) -> usize {
        self.with_jobs(|jobs| jobs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_cancel_deregister() {
        let registry = JobRegistry::new();
        let handle = JobHandle::new(10);
        registry.register("a", handle.clone());

        assert!(registry.cancel("a"));
        assert!(handle.cancel.is_cancelled());
        assert!(!registry.cancel("b"));

        assert!(registry.deregister("a").is_some());
        assert!(registry.is_empty());
    }
}
