//! Job consumer trait and the per-engine consumer registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use relay_core::{Job, JobError, JobResult, PropertyProvider, TopicPattern};

/// Future type for async job consumers.
pub type ConsumerFuture = BoxFuture<'static, JobResult>;

/// Instance property under which the registered topics are advertised.
pub const CONSUMER_TOPICS_PROPERTY: &str = "relay.jobs.consumer.topics";

/// Cooperative stop flag handed to a consumer with each job.
///
/// The engine raises it when the job is stopped while it is being
/// processed; removing an active job only forgets it. Consumers should check it at convenient points and
/// return early; whatever they return afterwards is discarded.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Trait for job consumers.
///
/// Implement this trait to define how jobs of a topic are processed.
pub trait JobConsumer: Send + Sync + 'static {
    /// Process one attempt of a job.
    fn process(&self, job: Job, stop: StopSignal) -> ConsumerFuture;
}

/// A simple function-based job consumer.
pub struct FnConsumer<F>
where
    F: Fn(Job, StopSignal) -> ConsumerFuture + Send + Sync + 'static,
{
    consumer: F,
}

impl<F> FnConsumer<F>
where
    F: Fn(Job, StopSignal) -> ConsumerFuture + Send + Sync + 'static,
{
    /// Create a new function-based consumer.
    pub fn new(consumer: F) -> Self {
        Self { consumer }
    }
}

impl<F> JobConsumer for FnConsumer<F>
where
    F: Fn(Job, StopSignal) -> ConsumerFuture + Send + Sync + 'static,
{
    fn process(&self, job: Job, stop: StopSignal) -> ConsumerFuture {
        (self.consumer)(job, stop)
    }
}

/// Helper macro for creating job consumers from async blocks.
///
/// ```ignore
/// let consumer = job_consumer!(|job| {
///     tracing::info!("processing {}", job.id);
///     JobResult::Ok
/// });
/// ```
#[macro_export]
macro_rules! job_consumer {
    (|$job:ident| $body:expr) => {
        $crate::FnConsumer::new(|$job: $crate::Job, _stop: $crate::StopSignal| {
            Box::pin(async move { $body })
        })
    };
    (|$job:ident, $stop:ident| $body:expr) => {
        $crate::FnConsumer::new(|$job: $crate::Job, $stop: $crate::StopSignal| {
            Box::pin(async move { $body })
        })
    };
}

/// Handle returned by [`ConsumerRegistry::register`].
///
/// Only the registration the handle was issued for can be removed with it,
/// so a stale handle never unregisters a consumer that replaced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerHandle {
    pattern: String,
    id: u64,
}

impl ConsumerHandle {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

struct Registration {
    id: u64,
    consumer: Arc<dyn JobConsumer>,
}

/// Registry mapping topic patterns to consumers.
///
/// Patterns are either an exact topic, `prefix/*` (any topic below
/// `prefix`) or `*` (every topic). Lookups prefer the exact topic and then
/// the nearest enclosing wildcard.
pub struct ConsumerRegistry {
    consumers: RwLock<HashMap<String, Registration>>,
    next_id: AtomicU64,
    whitelist: Vec<TopicPattern>,
    blacklist: Vec<TopicPattern>,
}

impl ConsumerRegistry {
    /// Create a registry that advertises every registered topic.
    pub fn new() -> Self {
        Self::with_filters(["*"], Vec::<String>::new())
    }

    /// Create a registry whose advertised topics are filtered.
    ///
    /// A topic is advertised when it matches a whitelist pattern and no
    /// blacklist pattern. Filters only affect [`topics`](Self::topics),
    /// never dispatch.
    pub fn with_filters<W, B, S, T>(whitelist: W, blacklist: B) -> Self
    where
        W: IntoIterator<Item = S>,
        B: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            consumers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            whitelist: whitelist
                .into_iter()
                .map(|p| TopicPattern::parse(p.as_ref()))
                .collect(),
            blacklist: blacklist
                .into_iter()
                .map(|p| TopicPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Register a consumer for a topic pattern.
    ///
    /// Registering an exact topic twice fails with [`JobError::Conflict`];
    /// registering a wildcard again replaces the previous consumer.
    pub fn register<C: JobConsumer>(
        &self,
        pattern: &str,
        consumer: C,
    ) -> Result<ConsumerHandle, JobError> {
        self.register_arc(pattern, Arc::new(consumer))
    }

    /// Register an already shared consumer.
    pub fn register_arc(
        &self,
        pattern: &str,
        consumer: Arc<dyn JobConsumer>,
    ) -> Result<ConsumerHandle, JobError> {
        validate_pattern(pattern)?;
        let wildcard = is_wildcard(pattern);

        let mut consumers = self.consumers.write();
        if consumers.contains_key(pattern) {
            if !wildcard {
                return Err(JobError::Conflict(format!(
                    "a consumer is already registered for topic '{}'",
                    pattern
                )));
            }
            tracing::warn!("Replacing consumer registered for '{}'", pattern);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        consumers.insert(pattern.to_string(), Registration { id, consumer });
        tracing::debug!("Registered consumer {} for '{}'", id, pattern);

        Ok(ConsumerHandle {
            pattern: pattern.to_string(),
            id,
        })
    }

    /// Remove whatever consumer is registered for `pattern`.
    pub fn unregister(&self, pattern: &str) -> bool {
        self.consumers.write().remove(pattern).is_some()
    }

    /// Remove the registration `handle` refers to, if it is still current.
    pub fn unregister_handle(&self, handle: &ConsumerHandle) -> bool {
        let mut consumers = self.consumers.write();
        match consumers.get(&handle.pattern) {
            Some(registration) if registration.id == handle.id => {
                consumers.remove(&handle.pattern);
                true
            }
            _ => false,
        }
    }

    /// Find the consumer responsible for a topic.
    pub fn lookup(&self, topic: &str) -> Option<Arc<dyn JobConsumer>> {
        let consumers = self.consumers.read();
        if let Some(registration) = consumers.get(topic) {
            return Some(registration.consumer.clone());
        }

        let mut prefix = topic;
        while let Some(pos) = prefix.rfind('/') {
            prefix = &prefix[..pos];
            if let Some(registration) = consumers.get(&format!("{}/*", prefix)) {
                return Some(registration.consumer.clone());
            }
        }

        consumers.get("*").map(|r| r.consumer.clone())
    }

    /// Check if a consumer exists for a topic.
    pub fn has_consumer(&self, topic: &str) -> bool {
        self.lookup(topic).is_some()
    }

    /// Sorted, comma-separated list of advertised topic patterns.
    pub fn topics(&self) -> String {
        let mut topics: Vec<String> = self
            .consumers
            .read()
            .keys()
            .filter(|pattern| self.is_advertised(pattern))
            .cloned()
            .collect();
        topics.sort();
        topics.join(",")
    }

    fn is_advertised(&self, pattern: &str) -> bool {
        // Wildcards are matched against the category they cover.
        let candidate = pattern.strip_suffix('*').unwrap_or(pattern);
        self.whitelist.iter().any(|p| p.matches(candidate))
            && !self.blacklist.iter().any(|p| p.matches(candidate))
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern == "*" || pattern.ends_with("/*")
}

fn validate_pattern(pattern: &str) -> Result<(), JobError> {
    let body = pattern.strip_suffix("/*").unwrap_or(pattern);
    let valid = pattern == "*"
        || (!body.is_empty()
            && !body.contains('*')
            && !body.starts_with('/')
            && !body.ends_with('/')
            && !body.contains("//"));
    if valid {
        Ok(())
    } else {
        Err(JobError::InvalidTopic(pattern.to_string()))
    }
}

/// Advertises the registry's topics as an instance property.
#[derive(Clone)]
pub struct ConsumerTopicsProvider {
    registry: Arc<ConsumerRegistry>,
}

impl ConsumerTopicsProvider {
    pub fn new(registry: Arc<ConsumerRegistry>) -> Self {
        Self { registry }
    }
}

impl PropertyProvider for ConsumerTopicsProvider {
    fn property(&self, name: &str) -> Option<String> {
        (name == CONSUMER_TOPICS_PROPERTY).then(|| self.registry.topics())
    }
}
