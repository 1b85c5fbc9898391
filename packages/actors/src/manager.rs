//! Producer-facing facade over the actor system.

use std::sync::Arc;

use relay_core::{
    Job, JobError, JobEvent, JobId, JobProperties, JobStatus, JobStore, QueueStats,
    TopologyEvent, TopologyEventListener,
};
use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::consumer::{ConsumerHandle, ConsumerRegistry, ConsumerTopicsProvider, JobConsumer};
use crate::messages::{QueueMessage, SupervisorMessage};
use crate::registry::QueueRegistry;
use crate::supervisor::{SupervisorArgs, start_supervisor};

/// Send a request to a queue actor and wait for its reply.
async fn ask<T, F>(actor: &ActorRef<QueueMessage>, build: F) -> Result<T, JobError>
where
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> QueueMessage,
{
    let (tx, rx) = ractor::concurrency::oneshot();
    actor
        .send_message(build(tx.into()))
        .map_err(|_| JobError::ShuttingDown)?;
    rx.await
        .map_err(|_| JobError::Engine("queue actor dropped the request".into()))
}

/// Entry point of the job engine.
///
/// Owns the supervisor and the per-engine registries. Every queue runs in its
/// own actor, so producers of different queues never wait on each other.
pub struct JobManager {
    supervisor: ActorRef<SupervisorMessage>,
    supervisor_handle: JoinHandle<()>,
    registry: Arc<QueueRegistry>,
    consumers: Arc<ConsumerRegistry>,
    store: Arc<dyn JobStore>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobManager {
    /// Start an engine over `store`.
    pub async fn start(config: EngineConfig, store: Arc<dyn JobStore>) -> Result<Self, JobError> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let consumers = Arc::new(ConsumerRegistry::with_filters(
            &config.consumer_whitelist,
            &config.consumer_blacklist,
        ));
        let registry = Arc::new(QueueRegistry::new(
            config.queues.clone(),
            config.main_queue.clone(),
        ));

        let (supervisor, supervisor_handle) = start_supervisor(SupervisorArgs {
            registry: registry.clone(),
            store: store.clone(),
            consumers: consumers.clone(),
            event_tx: event_tx.clone(),
            is_leader: config.assume_leader,
            tick_interval: config.tick_interval(),
        })
        .await
        .map_err(|e| JobError::Engine(format!("failed to start supervisor: {}", e)))?;

        tracing::info!(
            "Job engine started with queues: {}",
            registry.list_queues().join(", ")
        );

        Ok(Self {
            supervisor,
            supervisor_handle,
            registry,
            consumers,
            store,
            event_tx,
        })
    }

    /// Register a consumer for a topic or `prefix/*` pattern and wake the queues.
    pub fn register_consumer<C: JobConsumer>(
        &self,
        pattern: &str,
        consumer: C,
    ) -> Result<ConsumerHandle, JobError> {
        let handle = self.consumers.register(pattern, consumer)?;
        self.wake_queues();
        Ok(handle)
    }

    /// Remove a consumer registration.
    pub fn unregister_consumer(&self, handle: &ConsumerHandle) -> bool {
        let removed = self.consumers.unregister_handle(handle);
        if removed {
            self.wake_queues();
        }
        removed
    }

    pub fn consumers(&self) -> &Arc<ConsumerRegistry> {
        &self.consumers
    }

    /// Property provider advertising this engine's consumer topics.
    pub fn topics_provider(&self) -> ConsumerTopicsProvider {
        ConsumerTopicsProvider::new(self.consumers.clone())
    }

    fn wake_queues(&self) {
        let _ = self
            .supervisor
            .send_message(SupervisorMessage::ConsumersChanged);
    }

    /// Submit a job.
    ///
    /// With a `name`, the job id is the name and submitting it again while
    /// the first one is unfinished returns the existing job. Blocks while the
    /// target queue is at its pending bound.
    pub async fn add(
        &self,
        topic: &str,
        name: Option<&str>,
        properties: JobProperties,
    ) -> Result<Job, JobError> {
        if topic.is_empty() || topic.contains('*') {
            return Err(JobError::InvalidTopic(topic.to_string()));
        }

        let config = self.registry.route(topic);
        let handle = self
            .registry
            .get(&config.name)
            .ok_or_else(|| JobError::Engine(format!("queue '{}' is not running", config.name)))?;

        let permit = match &handle.capacity {
            Some(capacity) => Some(
                capacity
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| JobError::ShuttingDown)?,
            ),
            None => None,
        };

        let id = name.map_or_else(JobId::generate, JobId::named);
        let job = Job::new(id, topic, &handle.config.name, properties);
        ask(&handle.actor, |reply| QueueMessage::Enqueue {
            job: Box::new(job),
            permit,
            reply,
        })
        .await?
    }

    /// Earliest job of a queue that has not been handed to a consumer yet.
    pub async fn get_head(&self, queue: &str) -> Result<Option<Job>, JobError> {
        match self.registry.get(queue) {
            Some(handle) => ask(&handle.actor, |reply| QueueMessage::GetHead { reply }).await,
            None => Ok(None),
        }
    }

    /// Status of a job. Unknown ids are reported as dropped.
    pub async fn get_status(&self, id: &JobId) -> Result<JobStatus, JobError> {
        Ok(self
            .store
            .get(id)
            .await?
            .map_or_else(JobStatus::unknown, |job| job.status()))
    }

    /// The stored job, if any.
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>, JobError> {
        Ok(self.store.get(id).await?)
    }

    /// Remove a job whatever its state. Removing an unknown job succeeds.
    ///
    /// An active consumer is left to finish; its result is ignored.
    pub async fn remove(&self, id: &JobId) -> Result<(), JobError> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(());
        };
        if let Some(handle) = self.registry.get(&job.queue) {
            let owned = ask(&handle.actor, |reply| QueueMessage::Remove {
                job_id: id.clone(),
                reply,
            })
            .await??;
            if owned {
                return Ok(());
            }
        }
        // Terminal record, or a queue that no longer exists.
        self.store.delete(id).await?;
        Ok(())
    }

    /// Stop a queued or active job. Returns whether a job was stopped.
    pub async fn stop(&self, id: &JobId) -> Result<bool, JobError> {
        let Some(job) = self.store.get(id).await? else {
            return Ok(false);
        };
        if job.state.is_terminal() {
            return Ok(false);
        }
        match self.registry.get(&job.queue) {
            Some(handle) => {
                ask(&handle.actor, |reply| QueueMessage::Stop {
                    job_id: id.clone(),
                    reply,
                })
                .await?
            }
            None => Ok(false),
        }
    }

    /// Names of the running queues.
    pub fn queues(&self) -> Vec<String> {
        self.registry.list_queues()
    }

    /// Counters of a queue, `None` for unknown queues.
    pub async fn queue_stats(&self, queue: &str) -> Result<Option<QueueStats>, JobError> {
        match self.registry.get(queue) {
            Some(handle) => ask(&handle.actor, |reply| QueueMessage::GetStats { reply })
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Tell the queues whether the local instance leads its cluster.
    pub fn set_leader(&self, is_leader: bool) {
        let _ = self
            .supervisor
            .send_message(SupervisorMessage::LeadershipChanged { is_leader });
    }

    /// Topology listener feeding leadership changes into this engine.
    pub fn leadership_listener(&self) -> LeadershipListener {
        LeadershipListener {
            supervisor: self.supervisor.clone(),
        }
    }

    /// Stop every queue and wait for the supervisor to exit.
    pub async fn shutdown(self) -> Result<(), JobError> {
        tracing::info!("Shutting down job engine");
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
        self.supervisor_handle
            .await
            .map_err(|e| JobError::Engine(format!("supervisor did not exit cleanly: {}", e)))
    }
}

/// Gates leader-only queues on the local instance's leadership.
///
/// Leadership is only re-evaluated when a new view is known; while the
/// topology is changing the previous answer stays in effect.
#[derive(Clone)]
pub struct LeadershipListener {
    supervisor: ActorRef<SupervisorMessage>,
}

impl TopologyEventListener for LeadershipListener {
    fn handle_topology_event(&self, event: &TopologyEvent) {
        if let Some(view) = event.new_view() {
            let _ = self
                .supervisor
                .send_message(SupervisorMessage::LeadershipChanged {
                    is_leader: view.is_local_leader(),
                });
        }
    }
}
