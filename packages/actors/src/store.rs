//! In-memory job store.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use relay_core::{Job, JobId, JobStore, StoreError, StoreErrorKind, StoreResult};

/// Job store kept in process memory.
///
/// Useful for tests and single-process deployments where jobs need not
/// survive a restart. Writes can be made to fail on demand to exercise the
/// engine's error paths.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    failure: Mutex<Option<StoreErrorKind>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `kind` (or succeed again with `None`).
    pub fn fail_writes(&self, kind: Option<StoreErrorKind>) {
        *self.failure.lock() = kind;
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    fn check_writable(&self) -> StoreResult<()> {
        match *self.failure.lock() {
            Some(kind) => Err(StoreError::new(kind, "injected write failure")),
            None => Ok(()),
        }
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.check_writable()?;
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&job.id) {
                return Err(StoreError::rejected(format!("job {} already exists", job.id)));
            }
            jobs.insert(job.id.clone(), job);
            Ok(())
        })
    }

    fn get(&self, id: &JobId) -> BoxFuture<'_, StoreResult<Option<Job>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.jobs.lock().get(&id).cloned()) })
    }

    fn update(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.check_writable()?;
            self.jobs.lock().insert(job.id.clone(), job);
            Ok(())
        })
    }

    fn delete(&self, id: &JobId) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.clone();
        Box::pin(async move {
            self.check_writable()?;
            self.jobs.lock().remove(&id);
            Ok(())
        })
    }

    fn load_queue(&self, queue: &str) -> BoxFuture<'_, StoreResult<Vec<Job>>> {
        let queue = queue.to_string();
        Box::pin(async move {
            let mut jobs: Vec<Job> = self
                .jobs
                .lock()
                .values()
                .filter(|job| job.queue == queue && job.state.is_pending())
                .cloned()
                .collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Ok(jobs)
        })
    }
}
