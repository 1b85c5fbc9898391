//! Supervisor actor for managing all queues.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{JobEvent, JobStore, QueueConfig};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::consumer::ConsumerRegistry;
use crate::messages::{QueueMessage, SupervisorMessage};
use crate::queue_actor::{QueueActor, QueueActorArgs};
use crate::registry::QueueRegistry;

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub registry: Arc<QueueRegistry>,
    pub store: Arc<dyn JobStore>,
    pub consumers: Arc<ConsumerRegistry>,
    pub event_tx: broadcast::Sender<JobEvent>,
    pub is_leader: bool,
    pub tick_interval: Duration,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    registry: Arc<QueueRegistry>,
    store: Arc<dyn JobStore>,
    consumers: Arc<ConsumerRegistry>,
    event_tx: broadcast::Sender<JobEvent>,
    is_leader: bool,
    tick_interval: Duration,
    /// Queue name by actor ID, for supervision events.
    queue_names: HashMap<ActorId, String>,
    shutting_down: bool,
}

async fn spawn_queue_actor(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    config: QueueConfig,
) -> Result<ActorRef<QueueMessage>, ActorProcessingErr> {
    let name = config.name.clone();
    let args = QueueActorArgs {
        capacity: state.registry.capacity(&name),
        config,
        store: state.store.clone(),
        consumers: state.consumers.clone(),
        event_tx: state.event_tx.clone(),
        is_leader: state.is_leader,
        tick_interval: state.tick_interval,
    };

    let (actor, _handle) = Actor::spawn_linked(None, QueueActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue '{}': {}", name, e)))?;

    state.queue_names.insert(actor.get_id(), name.clone());
    state.registry.register_queue(&name, actor.clone());

    Ok(actor)
}

/// Supervisor actor that manages all queues.
///
/// Spawns one queue actor per configured queue (plus the main queue),
/// restarts queue actors that fail and fans out leadership and consumer
/// changes.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");

        let mut state = SupervisorState {
            registry: args.registry,
            store: args.store,
            consumers: args.consumers,
            event_tx: args.event_tx,
            is_leader: args.is_leader,
            tick_interval: args.tick_interval,
            queue_names: HashMap::new(),
            shutting_down: false,
        };

        let configs: Vec<QueueConfig> = state.registry.configs().cloned().collect();
        for config in configs {
            spawn_queue_actor(&myself, &mut state, config).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::LeadershipChanged { is_leader } => {
                state.is_leader = is_leader;
                for queue_ref in state.registry.actors() {
                    let _ = queue_ref.send_message(QueueMessage::LeadershipChanged { is_leader });
                }
            }

            SupervisorMessage::ConsumersChanged => {
                for queue_ref in state.registry.actors() {
                    let _ = queue_ref.send_message(QueueMessage::ConsumersChanged);
                }
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.shutting_down = true;
                state.registry.close();
                for queue_ref in state.registry.actors() {
                    let _ = queue_ref.send_message(QueueMessage::Shutdown);
                }
                myself.stop(None);
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
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(name) = state.queue_names.remove(&cell.get_id()) {
                    tracing::info!("Queue '{}' terminated: {:?}", name, reason);
                    state.registry.unregister_queue(&name);
                }
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                let Some(name) = state.queue_names.remove(&cell.get_id()) else {
                    return Ok(());
                };
                state.registry.unregister_queue(&name);
                if state.shutting_down {
                    return Ok(());
                }

                tracing::warn!("Queue '{}' failed: {}; restarting", name, err);
                let config = state.registry.configs().find(|c| c.name == name).cloned();
                if let Some(config) = config {
                    // Unfinished jobs are recovered from the store.
                    spawn_queue_actor(&myself, state, config).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor and its queue actors.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}
