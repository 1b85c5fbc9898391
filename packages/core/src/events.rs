//! Event types emitted by the job engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Events emitted by the job queue system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A queue actor started.
    QueueStarted {
        queue: String,
        recovered: usize,
        timestamp: DateTime<Utc>,
    },
    /// A new job was queued.
    JobQueued { job: Job, timestamp: DateTime<Utc> },
    /// A job was handed to a consumer.
    JobStarted {
        job_id: JobId,
        queue: String,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobSucceeded {
        job_id: JobId,
        queue: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed.
    JobFailed {
        job_id: JobId,
        queue: String,
        error: String,
        retry_count: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A job was dropped (cancelled by its consumer or out of retries).
    JobDropped {
        job_id: JobId,
        queue: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was stopped on request.
    JobStopped {
        job_id: JobId,
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was removed on request.
    JobRemoved {
        job_id: JobId,
        queue: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::QueueStarted { timestamp, .. } => *timestamp,
            JobEvent::JobQueued { timestamp, .. } => *timestamp,
            JobEvent::JobStarted { timestamp, .. } => *timestamp,
            JobEvent::JobSucceeded { timestamp, .. } => *timestamp,
            JobEvent::JobFailed { timestamp, .. } => *timestamp,
            JobEvent::JobDropped { timestamp, .. } => *timestamp,
            JobEvent::JobStopped { timestamp, .. } => *timestamp,
            JobEvent::JobRemoved { timestamp, .. } => *timestamp,
        }
    }

    /// Get the queue name associated with this event.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::QueueStarted { queue, .. } => queue,
            JobEvent::JobQueued { job, .. } => &job.queue,
            JobEvent::JobStarted { queue, .. } => queue,
            JobEvent::JobSucceeded { queue, .. } => queue,
            JobEvent::JobFailed { queue, .. } => queue,
            JobEvent::JobDropped { queue, .. } => queue,
            JobEvent::JobStopped { queue, .. } => queue,
            JobEvent::JobRemoved { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            JobEvent::QueueStarted { .. } => None,
            JobEvent::JobQueued { job, .. } => Some(&job.id),
            JobEvent::JobStarted { job_id, .. } => Some(job_id),
            JobEvent::JobSucceeded { job_id, .. } => Some(job_id),
            JobEvent::JobFailed { job_id, .. } => Some(job_id),
            JobEvent::JobDropped { job_id, .. } => Some(job_id),
            JobEvent::JobStopped { job_id, .. } => Some(job_id),
            JobEvent::JobRemoved { job_id, .. } => Some(job_id),
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::QueueStarted {
                queue, recovered, ..
            } => format!("Queue '{}' started ({} recovered)", queue, recovered),
            JobEvent::JobQueued { job, .. } => {
                format!("Job {} queued on '{}'", job.id, job.queue)
            }
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobSucceeded {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} succeeded in {}ms", job_id, duration_ms),
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobDropped { job_id, reason, .. } => {
                format!("Job {} dropped: {}", job_id, reason)
            }
            JobEvent::JobStopped { job_id, .. } => format!("Job {} stopped", job_id),
            JobEvent::JobRemoved { job_id, .. } => format!("Job {} removed", job_id),
        }
    }
}
