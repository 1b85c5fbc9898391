//! Queue registry for routing topics and finding queue actors by name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ractor::ActorRef;
use relay_core::QueueConfig;
use tokio::sync::Semaphore;

use crate::messages::QueueMessage;

/// A running queue as seen by producers.
#[derive(Clone)]
pub struct QueueHandle {
    pub config: QueueConfig,
    pub actor: ActorRef<QueueMessage>,
    /// Backpressure bound; `None` for unbounded queues.
    pub capacity: Option<Arc<Semaphore>>,
}

/// Registry of the engine's queues.
///
/// Owned by one engine instance and shared between the supervisor (which
/// registers actors as it spawns or restarts them) and the job manager
/// (which routes producers to them).
pub struct QueueRegistry {
    /// Configured queues in configuration order.
    configs: Vec<QueueConfig>,
    main_queue: QueueConfig,
    capacities: HashMap<String, Arc<Semaphore>>,
    queues: RwLock<HashMap<String, ActorRef<QueueMessage>>>,
}

impl QueueRegistry {
    /// Create a registry for the given queue configurations.
    pub fn new(configs: Vec<QueueConfig>, main_queue: QueueConfig) -> Self {
        let capacities = configs
            .iter()
            .chain(std::iter::once(&main_queue))
            .filter_map(|config| {
                config
                    .max_pending
                    .map(|bound| (config.name.clone(), Arc::new(Semaphore::new(bound))))
            })
            .collect();
        Self {
            configs,
            main_queue,
            capacities,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Every queue configuration, main queue last.
    pub fn configs(&self) -> impl Iterator<Item = &QueueConfig> {
        self.configs.iter().chain(std::iter::once(&self.main_queue))
    }

    /// Configuration of the queue a topic is routed to.
    ///
    /// The highest ranking matching queue wins; on equal ranking the first
    /// configured one does. Unmatched topics go to the main queue.
    pub fn route(&self, topic: &str) -> &QueueConfig {
        let mut selected: Option<&QueueConfig> = None;
        for config in self.configs.iter().filter(|c| c.matches(topic)) {
            if selected.is_none_or(|s| config.ranking > s.ranking) {
                selected = Some(config);
            }
        }
        selected.unwrap_or(&self.main_queue)
    }

    /// Register a queue actor.
    pub fn register_queue(&self, name: &str, queue: ActorRef<QueueMessage>) {
        self.queues.write().insert(name.to_string(), queue);
    }

    /// Unregister a queue actor.
    pub fn unregister_queue(&self, name: &str) {
        self.queues.write().remove(name);
    }

    /// Get a running queue by name.
    pub fn get(&self, name: &str) -> Option<QueueHandle> {
        let actor = self.queues.read().get(name).cloned()?;
        let config = self.configs().find(|c| c.name == name)?.clone();
        Some(QueueHandle {
            capacity: self.capacities.get(name).cloned(),
            config,
            actor,
        })
    }

    /// Backpressure semaphore of a queue.
    pub fn capacity(&self, name: &str) -> Option<Arc<Semaphore>> {
        self.capacities.get(name).cloned()
    }

    /// Every running queue actor.
    pub fn actors(&self) -> Vec<ActorRef<QueueMessage>> {
        self.queues.read().values().cloned().collect()
    }

    /// List all registered queue names.
    pub fn list_queues(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every backpressure semaphore so blocked producers fail fast.
    pub fn close(&self) {
        for capacity in self.capacities.values() {
            capacity.close();
        }
    }
}
