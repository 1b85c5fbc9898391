//! Error types shared by the engine and discovery crates.

use crate::StoreError;

/// Errors surfaced by the job engine to producers and registrants.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Consumer conflict: {0}")]
    Conflict(String),

    #[error("Invalid topic pattern: {0}")]
    InvalidTopic(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Job engine is shutting down")]
    ShuttingDown,
}

/// Errors raised while building topology snapshots and events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Illegal argument: {0}")]
    IllegalArgument(&'static str),

    #[error("Topology view has no local instance")]
    NoLocalInstance,
}
