//! Engine configuration.

use std::collections::HashSet;
use std::time::Duration;

use relay_core::{JobError, MAIN_QUEUE, QueueConfig, QueueKind};
use serde::{Deserialize, Serialize};

/// Configuration of a job engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Configured queues, in precedence order for equal rankings.
    pub queues: Vec<QueueConfig>,
    /// Queue receiving topics no configured queue matches.
    pub main_queue: QueueConfig,
    /// Housekeeping interval (milliseconds).
    pub tick_ms: u64,
    /// Capacity of the engine event channel.
    pub event_capacity: usize,
    /// Topic patterns advertised to other instances.
    pub consumer_whitelist: Vec<String>,
    /// Topic patterns never advertised.
    pub consumer_blacklist: Vec<String>,
    /// Leadership assumed until the first topology event arrives.
    pub assume_leader: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            main_queue: QueueConfig::new(MAIN_QUEUE),
            tick_ms: 1000,
            event_capacity: 1024,
            consumer_whitelist: vec!["*".to_string()],
            consumer_blacklist: Vec::new(),
            assume_leader: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a queue.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queues.push(queue);
        self
    }

    /// Replace the main queue configuration.
    pub fn with_main_queue(mut self, main_queue: QueueConfig) -> Self {
        self.main_queue = main_queue;
        self
    }

    pub fn with_tick_ms(mut self, tick_ms: u64) -> Self {
        self.tick_ms = tick_ms;
        self
    }

    pub fn with_assume_leader(mut self, assume_leader: bool) -> Self {
        self.assume_leader = assume_leader;
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Check the configuration before the engine starts.
    pub fn validate(&self) -> Result<(), JobError> {
        let mut names = HashSet::new();
        for queue in self.queues.iter().chain(std::iter::once(&self.main_queue)) {
            if queue.name.is_empty() {
                return Err(JobError::Engine("queue name must not be empty".into()));
            }
            if !names.insert(queue.name.as_str()) {
                return Err(JobError::Engine(format!("duplicate queue '{}'", queue.name)));
            }
            if queue.max_pending == Some(0) {
                return Err(JobError::Engine(format!(
                    "queue '{}' must allow at least one pending job",
                    queue.name
                )));
            }
        }
        if matches!(self.main_queue.kind, QueueKind::Drop | QueueKind::Ignore) {
            tracing::warn!(
                "Main queue '{}' is {}: unmatched topics will never be processed",
                self.main_queue.name,
                self.main_queue.kind
            );
        }
        if self.event_capacity == 0 {
            return Err(JobError::Engine("event capacity must be positive".into()));
        }
        Ok(())
    }
}
