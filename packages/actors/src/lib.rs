//! Actor system for the relay job engine.
//!
//! This crate provides the Ractor-based actor system that persists,
//! dispatches and retries jobs, plus the consumer registry and the
//! reference job stores.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor that spawns and restarts queue actors
//! - `QueueActor` - Owns one queue's jobs and pushes them to its workers
//! - `WorkerActor` - Runs a consumer for one job at a time
//! - `JobManager` - Facade used by producers and consumer registrants
//!
//! # Usage
//!
//! ```ignore
//! use relay_actors::{EngineConfig, JobManager, MemoryJobStore, job_consumer};
//!
//! let manager = JobManager::start(EngineConfig::default(), Arc::new(MemoryJobStore::new())).await?;
//! manager.register_consumer("mail/send", job_consumer!(|job| JobResult::Ok))?;
//! manager.add("mail/send", None, JobProperties::new()).await?;
//! ```

mod config;
mod consumer;
mod manager;
mod messages;
mod persistence;
mod queue_actor;
pub mod registry;
mod store;
mod supervisor;
mod worker_actor;

pub use config::EngineConfig;
pub use consumer::{
    CONSUMER_TOPICS_PROPERTY, ConsumerFuture, ConsumerHandle, ConsumerRegistry,
    ConsumerTopicsProvider, FnConsumer, JobConsumer, StopSignal,
};
pub use manager::{JobManager, LeadershipListener};
pub use messages::{QueueMessage, SupervisorMessage, WorkerMessage};
pub use persistence::FileJobStore;
pub use queue_actor::{QueueActor, QueueActorArgs};
pub use registry::QueueRegistry;
pub use store::MemoryJobStore;
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export core types used by consumers.
pub use relay_core::{Job, JobResult};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
