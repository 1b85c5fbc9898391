//! Durable job storage contract.
//!
//! The engine never talks to a database directly; it goes through a
//! [`JobStore`]. Implementations live next to their backend (memory and file
//! stores in `relay_actors`, SurrealDB in `relay_db`).

use futures_util::future::BoxFuture;

use crate::{Job, JobId};

/// Structured failure cause reported by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// The backend cannot be reached or is shutting down.
    Unavailable,
    /// The backend refused the operation for lack of permission.
    AccessDenied,
    /// The backend rejected the write (constraint, schema, quota...).
    Rejected,
    /// Stored data could not be decoded.
    Corrupt,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreErrorKind::Unavailable => write!(f, "unavailable"),
            StoreErrorKind::AccessDenied => write!(f, "access denied"),
            StoreErrorKind::Rejected => write!(f, "rejected"),
            StoreErrorKind::Corrupt => write!(f, "corrupt"),
        }
    }
}

/// Error returned by a [`JobStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store {kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Rejected, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Corrupt, message)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Pluggable persistence for jobs.
///
/// Methods return boxed futures so the engine can hold an
/// `Arc<dyn JobStore>`.
pub trait JobStore: Send + Sync + 'static {
    /// Persist a new job. Fails with `Rejected` if the id already exists.
    fn insert(&self, job: Job) -> BoxFuture<'_, StoreResult<()>>;

    /// Fetch a job by id.
    fn get(&self, id: &JobId) -> BoxFuture<'_, StoreResult<Option<Job>>>;

    /// Overwrite a stored job.
    fn update(&self, job: Job) -> BoxFuture<'_, StoreResult<()>>;

    /// Delete a job. Deleting an unknown id succeeds.
    fn delete(&self, id: &JobId) -> BoxFuture<'_, StoreResult<()>>;

    /// Jobs of a queue the engine still owns (queued or active), oldest first.
    fn load_queue(&self, queue: &str) -> BoxFuture<'_, StoreResult<Vec<Job>>>;
}
