//! Message types for actor communication.

use std::sync::Arc;

use relay_core::{Job, JobError, JobId, JobResult, QueueStats};
use ractor::RpcReplyPort;
use tokio::sync::OwnedSemaphorePermit;

use crate::consumer::{JobConsumer, StopSignal};

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Persist and enqueue a new job. The permit is held until the job
    /// leaves the queue.
    Enqueue {
        job: Box<Job>,
        permit: Option<OwnedSemaphorePermit>,
        reply: RpcReplyPort<Result<Job, JobError>>,
    },

    /// Report the outcome of one attempt.
    JobFinished {
        job_id: JobId,
        worker_id: String,
        result: JobResult,
        error: Option<String>,
        duration_ms: u64,
    },

    /// A failed job's retry delay elapsed; append it to the tail.
    RetryDue { job_id: JobId },

    /// Stop a job owned by this queue. Replies whether the queue owned it.
    Stop {
        job_id: JobId,
        reply: RpcReplyPort<Result<bool, JobError>>,
    },

    /// Forget a job owned by this queue. Replies whether the queue owned it.
    Remove {
        job_id: JobId,
        reply: RpcReplyPort<Result<bool, JobError>>,
    },

    /// Earliest job not yet handed to a consumer.
    GetHead { reply: RpcReplyPort<Option<Job>> },

    /// Queue counters.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Local leadership changed.
    LeadershipChanged { is_leader: bool },

    /// Consumers were registered or removed.
    ConsumersChanged,

    /// Shutdown the queue and its workers.
    Shutdown,

    /// Periodic tick for housekeeping.
    Tick,
}

/// Messages for the WorkerActor.
pub enum WorkerMessage {
    /// Run one attempt of a job with the given consumer.
    ProcessJob {
        job: Box<Job>,
        consumer: Arc<dyn JobConsumer>,
        stop: StopSignal,
    },

    /// Shutdown the worker.
    Shutdown,
}

impl std::fmt::Debug for WorkerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerMessage::ProcessJob { job, .. } => f
                .debug_struct("ProcessJob")
                .field("job_id", &job.id)
                .finish_non_exhaustive(),
            WorkerMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Forward a leadership change to every queue.
    LeadershipChanged { is_leader: bool },

    /// Wake every queue after a consumer registration change.
    ConsumersChanged,

    /// Shutdown all queues.
    Shutdown,
}
