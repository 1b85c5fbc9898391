//! Worker actor for executing jobs.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use relay_core::JobResult;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{QueueMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: ActorRef<QueueMessage>,
    pub timeout: Option<Duration>,
}

/// Worker actor that executes jobs.
///
/// Workers never poll: the queue actor pushes a job when the worker is
/// idle, and the worker reports the outcome back.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting worker: {}", args.worker_id);
        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            timeout: args.timeout,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessJob {
                job,
                consumer,
                stop,
            } => {
                let job = *job;
                let job_id = job.id.clone();
                tracing::debug!("Worker {} processing job {}", state.worker_id, job_id);

                let started = Instant::now();
                // A panicking consumer counts as a failed attempt.
                let attempt = AssertUnwindSafe(consumer.process(job, stop)).catch_unwind();
                let outcome = match state.timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, attempt).await {
                        Ok(outcome) => outcome.map_err(|_| "consumer panicked".to_string()),
                        Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
                    },
                    None => attempt.await.map_err(|_| "consumer panicked".to_string()),
                };

                let (result, error) = match outcome {
                    Ok(JobResult::Failed) => (JobResult::Failed, Some("consumer failed".into())),
                    Ok(result) => (result, None),
                    Err(error) => {
                        tracing::warn!("Job {} attempt aborted: {}", job_id, error);
                        (JobResult::Failed, Some(error))
                    }
                };

                if state
                    .queue
                    .send_message(QueueMessage::JobFinished {
                        job_id,
                        worker_id: state.worker_id.clone(),
                        result,
                        error,
                        duration_ms: started.elapsed().as_millis() as u64,
                    })
                    .is_err()
                {
                    // Queue is gone; nothing left to report to.
                    myself.stop(None);
                }
            }

            WorkerMessage::Shutdown => {
                tracing::debug!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
