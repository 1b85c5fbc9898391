//! Core domain types for the relay job queue and topology engine.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobState and JobStatus for work items
//! - QueueConfig and topic patterns for routing
//! - JobEvent for engine lifecycle notifications
//! - Topology views, events and listener/provider contracts
//! - The JobStore persistence contract and error taxonomy

mod error;
mod events;
mod job;
mod queue;
mod store;
mod topology;

pub use error::{JobError, TopologyError};
pub use events::JobEvent;
pub use job::{Job, JobId, JobProperties, JobResult, JobState, JobStatus};
pub use queue::{MAIN_QUEUE, QueueConfig, QueueKind, QueueStats, TopicPattern};
pub use store::{JobStore, StoreError, StoreErrorKind, StoreResult};
pub use topology::{
    ClusterView, InstanceDescription, InstanceProperties, PropertyProvider, TopologyEvent,
    TopologyEventKind, TopologyEventListener, TopologyView,
};
