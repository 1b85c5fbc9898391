//! Queue actor owning the jobs of a single queue.
//!
//! The queue actor is the only writer of its jobs' persisted state. It keeps
//! the undispatched jobs in insertion order, pushes them to idle workers and
//! applies the retry policy when a worker reports back.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::{
    Job, JobError, JobEvent, JobId, JobResult, JobState, JobStore, QueueConfig, QueueKind,
    QueueStats,
};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};

use crate::consumer::{ConsumerRegistry, JobConsumer, StopSignal};
use crate::messages::{QueueMessage, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Queue actor arguments.
pub struct QueueActorArgs {
    pub config: QueueConfig,
    pub store: Arc<dyn JobStore>,
    pub consumers: Arc<ConsumerRegistry>,
    pub capacity: Option<Arc<Semaphore>>,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub is_leader: bool,
    pub tick_interval: Duration,
}

/// A job handed to a worker.
struct ActiveJob {
    job: Job,
    worker_id: String,
    stop: StopSignal,
}

/// Where an owned job currently sits.
enum Owned {
    Pending(usize, Job),
    Active(ActiveJob),
    Delayed(Job),
}

impl Owned {
    fn job(&self) -> &Job {
        match self {
            Owned::Pending(_, job) | Owned::Delayed(job) => job,
            Owned::Active(active) => &active.job,
        }
    }
}

/// A store write that failed and is retried on the next tick.
enum ParkedWrite {
    Update(Job),
    Delete,
}

/// State for the queue actor.
pub struct QueueActorState {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    consumers: Arc<ConsumerRegistry>,
    capacity: Option<Arc<Semaphore>>,
    event_tx: broadcast::Sender<JobEvent>,
    /// Undispatched jobs in insertion order.
    pending: VecDeque<Job>,
    /// Jobs handed to workers, by ID.
    active: HashMap<JobId, ActiveJob>,
    /// Failed jobs waiting out their retry delay.
    delayed: HashMap<JobId, Job>,
    /// Backpressure permits held by undispatched jobs.
    permits: HashMap<JobId, OwnedSemaphorePermit>,
    idle_workers: VecDeque<(String, ActorRef<WorkerMessage>)>,
    busy_workers: HashMap<String, ActorRef<WorkerMessage>>,
    worker_ids: HashMap<ActorId, String>,
    worker_counter: u64,
    /// Latest failed write per job.
    parked: HashMap<JobId, ParkedWrite>,
    is_leader: bool,
    needs_recovery: bool,
    shutting_down: bool,
    stats: QueueStats,
}

impl QueueActorState {
    fn new(args: QueueActorArgs) -> Self {
        Self {
            config: args.config,
            store: args.store,
            consumers: args.consumers,
            capacity: args.capacity,
            event_tx: args.event_tx,
            pending: VecDeque::new(),
            active: HashMap::new(),
            delayed: HashMap::new(),
            permits: HashMap::new(),
            idle_workers: VecDeque::new(),
            busy_workers: HashMap::new(),
            worker_ids: HashMap::new(),
            worker_counter: 0,
            parked: HashMap::new(),
            is_leader: args.is_leader,
            needs_recovery: false,
            shutting_down: false,
            stats: QueueStats::default(),
        }
    }

    /// Broadcast an event.
    fn broadcast(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        let _ = self.event_tx.send(event);
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn can_dispatch(&self) -> bool {
        matches!(self.config.kind, QueueKind::Ordered | QueueKind::Unordered)
            && (!self.config.leader_only || self.is_leader)
    }

    fn owns(&self, id: &JobId) -> Option<&Job> {
        self.pending
            .iter()
            .find(|job| &job.id == id)
            .or_else(|| self.active.get(id).map(|a| &a.job))
            .or_else(|| self.delayed.get(id))
    }

    fn take(&mut self, id: &JobId) -> Option<Owned> {
        if let Some(index) = self.pending.iter().position(|job| &job.id == id) {
            return self.pending.remove(index).map(|job| Owned::Pending(index, job));
        }
        if let Some(active) = self.active.remove(id) {
            return Some(Owned::Active(active));
        }
        self.delayed.remove(id).map(Owned::Delayed)
    }

    fn restore(&mut self, owned: Owned) {
        match owned {
            Owned::Pending(index, job) => {
                let index = index.min(self.pending.len());
                self.pending.insert(index, job);
            }
            Owned::Active(active) => {
                self.active.insert(active.job.id.clone(), active);
            }
            Owned::Delayed(job) => {
                self.delayed.insert(job.id.clone(), job);
            }
        }
    }

    /// Release the backpressure permit held by a job.
    fn release(&mut self, id: &JobId) {
        self.permits.remove(id);
    }

    /// Take a permit for a job going back to waiting without a producer.
    ///
    /// Never blocks: when the bound is exhausted the job is kept anyway and
    /// only counts against the bound once a permit frees up for it.
    fn reacquire(&mut self, id: &JobId) {
        let Some(capacity) = &self.capacity else {
            return;
        };
        if self.permits.contains_key(id) {
            return;
        }
        match capacity.clone().try_acquire_owned() {
            Ok(permit) => {
                self.permits.insert(id.clone(), permit);
            }
            Err(_) => tracing::debug!(
                "Job {} waits beyond the pending bound of '{}'",
                id,
                self.config.name
            ),
        }
    }

    /// Persist a job, parking the write for the next tick if the store fails.
    async fn persist(&mut self, job: Job) {
        let id = job.id.clone();
        match self.store.update(job.clone()).await {
            Ok(()) => {
                self.parked.remove(&id);
            }
            Err(e) => {
                tracing::warn!("Failed to persist job {} ({}); retrying on tick", id, e);
                self.parked.insert(id, ParkedWrite::Update(job));
            }
        }
    }

    async fn forget(&mut self, id: &JobId) {
        match self.store.delete(id).await {
            Ok(()) => {
                self.parked.remove(id);
            }
            Err(e) => {
                tracing::warn!("Failed to delete job {} ({}); retrying on tick", id, e);
                self.parked.insert(id.clone(), ParkedWrite::Delete);
            }
        }
    }

    async fn flush_parked(&mut self) {
        if self.parked.is_empty() {
            return;
        }
        let parked = std::mem::take(&mut self.parked);
        for (id, write) in parked {
            let result = match &write {
                ParkedWrite::Update(job) => self.store.update(job.clone()).await,
                ParkedWrite::Delete => self.store.delete(&id).await,
            };
            if let Err(e) = result {
                tracing::debug!("Parked write for job {} still failing: {}", id, e);
                self.parked.insert(id, write);
            }
        }
    }

    /// Load the queue's unfinished jobs from the store.
    async fn recover(&mut self) -> Result<usize, JobError> {
        let jobs = self.store.load_queue(&self.config.name).await?;
        let mut recovered = 0;
        for mut job in jobs {
            if self.owns(&job.id).is_some() {
                continue;
            }
            if job.state == JobState::Active {
                // The process that ran it is gone.
                job.transition(JobState::Queued);
                self.persist(job.clone()).await;
            }
            self.reacquire(&job.id);
            self.pending.push_back(job);
            recovered += 1;
        }
        self.needs_recovery = false;
        Ok(recovered)
    }

    async fn enqueue(
        &mut self,
        mut job: Job,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<Job, JobError> {
        if let Some(existing) = self.owns(&job.id) {
            return Ok(existing.clone());
        }
        let existing = self.store.get(&job.id).await?;
        if let Some(existing) = &existing
            && !existing.state.is_terminal()
        {
            return Ok(existing.clone());
        }

        if self.config.kind == QueueKind::Drop {
            job.transition(JobState::Dropped);
        }
        if existing.is_some() {
            // A finished job with the same name is replaced.
            self.store.update(job.clone()).await?;
        } else {
            self.store.insert(job.clone()).await?;
        }

        if job.state == JobState::Dropped {
            self.stats.dropped += 1;
            self.broadcast(JobEvent::JobDropped {
                job_id: job.id.clone(),
                queue: self.config.name.clone(),
                reason: "queue drops all jobs".into(),
                timestamp: Utc::now(),
            });
            return Ok(job);
        }

        if let Some(permit) = permit {
            self.permits.insert(job.id.clone(), permit);
        }
        self.pending.push_back(job.clone());
        self.broadcast(JobEvent::JobQueued {
            job: job.clone(),
            timestamp: Utc::now(),
        });
        Ok(job)
    }

    /// Position of the next job to hand out, with its consumer.
    fn next_dispatchable(&self) -> Option<(usize, Arc<dyn JobConsumer>)> {
        match self.config.kind {
            QueueKind::Ordered => {
                let head = self.pending.front()?;
                self.consumers.lookup(&head.topic).map(|c| (0, c))
            }
            _ => self
                .pending
                .iter()
                .enumerate()
                .find_map(|(index, job)| self.consumers.lookup(&job.topic).map(|c| (index, c))),
        }
    }

    /// Hand queued jobs to idle workers.
    async fn dispatch(&mut self) {
        if !self.can_dispatch() {
            return;
        }

        while let Some((worker_id, worker)) = self.idle_workers.pop_front() {
            let Some((index, consumer)) = self.next_dispatchable() else {
                self.idle_workers.push_front((worker_id, worker));
                break;
            };
            let Some(mut job) = self.pending.remove(index) else {
                self.idle_workers.push_front((worker_id, worker));
                break;
            };

            job.transition(JobState::Active);
            if let Err(e) = self.store.update(job.clone()).await {
                tracing::warn!("Failed to mark job {} active: {}", job.id, e);
                job.transition(JobState::Queued);
                self.pending.insert(index, job);
                self.idle_workers.push_front((worker_id, worker));
                break;
            }
            self.parked.remove(&job.id);

            let stop = StopSignal::new();
            let sent = worker.send_message(WorkerMessage::ProcessJob {
                job: Box::new(job.clone()),
                consumer,
                stop: stop.clone(),
            });
            if sent.is_err() {
                tracing::warn!("Worker {} is gone, re-queueing job {}", worker_id, job.id);
                job.transition(JobState::Queued);
                self.persist(job.clone()).await;
                self.pending.insert(index, job);
                continue;
            }

            // Dispatched jobs no longer count as pending.
            self.release(&job.id);
            self.broadcast(JobEvent::JobStarted {
                job_id: job.id.clone(),
                queue: self.config.name.clone(),
                worker_id: worker_id.clone(),
                timestamp: Utc::now(),
            });
            self.busy_workers.insert(worker_id.clone(), worker);
            self.active.insert(
                job.id.clone(),
                ActiveJob {
                    job,
                    worker_id,
                    stop,
                },
            );
        }
    }

    fn schedule_retry(&mut self, myself: &ActorRef<QueueMessage>, job: Job) {
        self.reacquire(&job.id);
        if self.config.retry_delay_ms == 0 {
            self.pending.push_back(job);
            return;
        }
        let job_id = job.id.clone();
        self.delayed.insert(job_id.clone(), job);

        let queue = myself.clone();
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = queue.send_message(QueueMessage::RetryDue { job_id });
        });
    }

    /// Apply a worker's verdict to an active job.
    async fn finish(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        job_id: JobId,
        result: JobResult,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let Some(active) = self.active.remove(&job_id) else {
            tracing::debug!("Ignoring result for job {} (no longer active)", job_id);
            return;
        };
        let mut job = active.job;
        let now = Utc::now();

        match result {
            JobResult::Ok => {
                job.transition(JobState::Succeeded);
                self.stats.succeeded += 1;
                self.forget(&job_id).await;
                self.broadcast(JobEvent::JobSucceeded {
                    job_id,
                    queue: self.config.name.clone(),
                    duration_ms,
                    timestamp: now,
                });
            }

            JobResult::Cancel => {
                job.transition(JobState::Dropped);
                self.stats.dropped += 1;
                self.persist(job).await;
                self.broadcast(JobEvent::JobDropped {
                    job_id,
                    queue: self.config.name.clone(),
                    reason: "cancelled by consumer".into(),
                    timestamp: now,
                });
            }

            JobResult::Failed => {
                let error = error.unwrap_or_else(|| "consumer failed".into());
                let will_retry = job.retry_count < self.config.max_retries;
                self.stats.failed_attempts += 1;

                job.transition(JobState::Failed);
                job.last_error = Some(error.clone());
                if will_retry {
                    job.retry_count += 1;
                }
                self.broadcast(JobEvent::JobFailed {
                    job_id: job_id.clone(),
                    queue: self.config.name.clone(),
                    error,
                    retry_count: job.retry_count,
                    will_retry,
                    timestamp: now,
                });

                if will_retry {
                    job.transition(JobState::Queued);
                    self.persist(job.clone()).await;
                    self.schedule_retry(myself, job);
                } else {
                    job.transition(JobState::Dropped);
                    self.stats.dropped += 1;
                    self.persist(job).await;
                    self.broadcast(JobEvent::JobDropped {
                        job_id,
                        queue: self.config.name.clone(),
                        reason: "retries exhausted".into(),
                        timestamp: now,
                    });
                }
            }
        }
    }

    async fn stop_job(&mut self, job_id: &JobId) -> Result<bool, JobError> {
        let Some(owned) = self.take(job_id) else {
            return Ok(false);
        };
        let mut job = owned.job().clone();
        job.transition(JobState::Stopped);
        if let Err(e) = self.store.update(job).await {
            self.restore(owned);
            return Err(e.into());
        }
        self.parked.remove(job_id);

        if let Owned::Active(active) = &owned {
            active.stop.stop();
        }
        self.release(job_id);
        self.stats.stopped += 1;
        self.broadcast(JobEvent::JobStopped {
            job_id: job_id.clone(),
            queue: self.config.name.clone(),
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    async fn remove_job(&mut self, job_id: &JobId) -> Result<bool, JobError> {
        let Some(owned) = self.take(job_id) else {
            return Ok(false);
        };
        if let Err(e) = self.store.delete(job_id).await {
            self.restore(owned);
            return Err(e.into());
        }
        self.parked.remove(job_id);

        self.release(job_id);
        self.broadcast(JobEvent::JobRemoved {
            job_id: job_id.clone(),
            queue: self.config.name.clone(),
            timestamp: Utc::now(),
        });
        Ok(true)
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            queued: (self.pending.len() + self.delayed.len()) as u64,
            active: self.active.len() as u64,
            ..self.stats.clone()
        }
    }

    async fn spawn_worker(&mut self, myself: &ActorRef<QueueMessage>) -> Result<(), ActorProcessingErr> {
        self.worker_counter += 1;
        let worker_id = format!("{}-worker-{}", self.config.name, self.worker_counter);
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            queue: myself.clone(),
            timeout: self.config.timeout_ms.map(Duration::from_millis),
        };

        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

        self.worker_ids.insert(worker.get_id(), worker_id.clone());
        self.idle_workers.push_back((worker_id, worker));
        Ok(())
    }

    /// Drop a dead worker and put its job back at the head of the queue.
    async fn worker_lost(&mut self, actor_id: ActorId) -> Option<String> {
        let worker_id = self.worker_ids.remove(&actor_id)?;
        self.idle_workers.retain(|(id, _)| id != &worker_id);
        self.busy_workers.remove(&worker_id);

        let orphan = self
            .active
            .iter()
            .find(|(_, active)| active.worker_id == worker_id)
            .map(|(id, _)| id.clone());
        if let Some(job_id) = orphan
            && let Some(active) = self.active.remove(&job_id)
        {
            let mut job = active.job;
            job.transition(JobState::Queued);
            self.persist(job.clone()).await;
            self.reacquire(&job.id);
            self.pending.push_front(job);
        }
        Some(worker_id)
    }

    fn stop_workers(&mut self) {
        for (_, worker) in self.idle_workers.drain(..) {
            let _ = worker.send_message(WorkerMessage::Shutdown);
        }
        for (_, worker) in self.busy_workers.drain() {
            let _ = worker.send_message(WorkerMessage::Shutdown);
        }
    }
}

/// Queue actor that manages a single queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor: {} ({}, {} workers)",
            args.config.name,
            args.config.kind,
            args.config.worker_count()
        );

        let tick_interval = args.tick_interval;
        let mut state = QueueActorState::new(args);

        for _ in 0..state.config.worker_count() {
            state.spawn_worker(&myself).await?;
        }

        let recovered = match state.recover().await {
            Ok(recovered) => recovered,
            Err(e) => {
                tracing::warn!("Failed to recover jobs for '{}': {}", state.name(), e);
                state.needs_recovery = true;
                0
            }
        };
        if recovered > 0 {
            tracing::info!("Recovered {} jobs for '{}'", recovered, state.name());
        }
        state.broadcast(JobEvent::QueueStarted {
            queue: state.config.name.clone(),
            recovered,
            timestamp: Utc::now(),
        });

        // Start periodic tick
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                if myself_clone.send_message(QueueMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }

    async fn post_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.dispatch().await;
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.shutting_down = true;
        state.stop_workers();
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { job, permit, reply } => {
                let result = state.enqueue(*job, permit).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    state.dispatch().await;
                }
            }

            QueueMessage::JobFinished {
                job_id,
                worker_id,
                result,
                error,
                duration_ms,
            } => {
                if let Some(worker) = state.busy_workers.remove(&worker_id) {
                    state.idle_workers.push_back((worker_id, worker));
                }
                state
                    .finish(&myself, job_id, result, error, duration_ms)
                    .await;
                state.dispatch().await;
            }

            QueueMessage::RetryDue { job_id } => {
                if let Some(job) = state.delayed.remove(&job_id) {
                    state.pending.push_back(job);
                    state.dispatch().await;
                }
            }

            QueueMessage::Stop { job_id, reply } => {
                let result = state.stop_job(&job_id).await;
                let stopped = matches!(result, Ok(true));
                let _ = reply.send(result);
                if stopped {
                    state.dispatch().await;
                }
            }

            QueueMessage::Remove { job_id, reply } => {
                let result = state.remove_job(&job_id).await;
                let removed = matches!(result, Ok(true));
                let _ = reply.send(result);
                if removed {
                    state.dispatch().await;
                }
            }

            QueueMessage::GetHead { reply } => {
                let _ = reply.send(state.pending.front().cloned());
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::LeadershipChanged { is_leader } => {
                if state.is_leader != is_leader {
                    tracing::info!(
                        "Queue '{}' leadership changed: {}",
                        state.name(),
                        if is_leader { "leader" } else { "follower" }
                    );
                }
                state.is_leader = is_leader;
                state.dispatch().await;
            }

            QueueMessage::ConsumersChanged => {
                state.dispatch().await;
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.name());
                state.shutting_down = true;
                state.stop_workers();
                myself.stop(None);
                return Ok(());
            }

            QueueMessage::Tick => {
                state.flush_parked().await;
                if state.needs_recovery {
                    match state.recover().await {
                        Ok(recovered) => {
                            tracing::info!("Recovered {} jobs for '{}'", recovered, state.name())
                        }
                        Err(e) => tracing::debug!("Recovery of '{}' still failing: {}", state.name(), e),
                    }
                }
                state.dispatch().await;
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                (cell, reason.unwrap_or_else(|| "stopped".into()))
            }
            SupervisionEvent::ActorFailed(cell, err) => (cell, err.to_string()),
            _ => return Ok(()),
        };

        if state.shutting_down {
            return Ok(());
        }
        if let Some(worker_id) = state.worker_lost(cell.get_id()).await {
            tracing::warn!("Worker {} exited ({}); replacing it", worker_id, reason);
            state.spawn_worker(&myself).await?;
            state.dispatch().await;
        }
        Ok(())
    }
}
