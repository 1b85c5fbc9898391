//! Queue configuration and topic routing.

use serde::{Deserialize, Serialize};

/// Name of the queue that receives topics no configured queue matches.
pub const MAIN_QUEUE: &str = "main";

/// How a queue processes its jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// One job at a time, strictly in enqueue order.
    Ordered,
    /// Up to `max_parallel` jobs at once; order is best effort.
    #[default]
    Unordered,
    /// Jobs are stored but never dispatched.
    Ignore,
    /// Jobs are dropped as soon as they are added.
    Drop,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Ordered => write!(f, "ordered"),
            QueueKind::Unordered => write!(f, "unordered"),
            QueueKind::Ignore => write!(f, "ignore"),
            QueueKind::Drop => write!(f, "drop"),
        }
    }
}

/// A topic pattern as used in queue configuration.
///
/// - `a/b/c` matches exactly that topic
/// - `a/b/.` matches topics one level below `a/b`
/// - `a/b/*` matches topics at any depth below `a/b`
/// - `*` matches every topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    Exact(String),
    Package(String),
    SubPackage(String),
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            return TopicPattern::SubPackage(String::new());
        }
        if let Some(package) = pattern.strip_suffix('.') {
            return TopicPattern::Package(package.trim_end_matches('/').to_string());
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            let prefix = if prefix.ends_with('/') {
                prefix.to_string()
            } else {
                format!("{prefix}/")
            };
            return TopicPattern::SubPackage(prefix);
        }
        TopicPattern::Exact(pattern.to_string())
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Package(package) => topic
                .rfind('/')
                .is_some_and(|pos| &topic[..pos] == package),
            TopicPattern::SubPackage(prefix) => {
                prefix.is_empty()
                    || topic
                        .rfind('/')
                        .is_some_and(|pos| topic[..=pos].starts_with(prefix.as_str()))
            }
        }
    }
}

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name.
    pub name: String,
    /// Processing mode.
    pub kind: QueueKind,
    /// Topic patterns routed to this queue.
    pub topics: Vec<String>,
    /// Failed attempts tolerated before a job is dropped.
    pub max_retries: u32,
    /// Delay before a failed job re-enters the queue (milliseconds).
    pub retry_delay_ms: u64,
    /// Number of jobs processed concurrently (ignored for ordered queues).
    pub max_parallel: usize,
    /// Maximum number of undispatched jobs before `add` blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pending: Option<usize>,
    /// Per-attempt timeout (milliseconds); an expired attempt counts as failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Only dispatch while the local instance leads its cluster.
    pub leader_only: bool,
    /// Higher ranking wins when several queues match a topic.
    pub ranking: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: MAIN_QUEUE.to_string(),
            kind: QueueKind::Unordered,
            topics: Vec::new(),
            max_retries: 10,
            retry_delay_ms: 2000,
            max_parallel: 15,
            max_pending: None,
            timeout_ms: None,
            leader_only: false,
            ranking: 0,
        }
    }
}

impl QueueConfig {
    /// Create a queue configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: QueueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_leader_only(mut self, leader_only: bool) -> Self {
        self.leader_only = leader_only;
        self
    }

    pub fn with_ranking(mut self, ranking: i32) -> Self {
        self.ranking = ranking;
        self
    }

    /// Number of worker slots this queue runs.
    pub fn worker_count(&self) -> usize {
        match self.kind {
            QueueKind::Ordered => 1,
            QueueKind::Unordered => self.max_parallel.max(1),
            QueueKind::Ignore | QueueKind::Drop => 0,
        }
    }

    /// Check whether this queue accepts the given topic.
    pub fn matches(&self, topic: &str) -> bool {
        self.topics
            .iter()
            .any(|pattern| TopicPattern::parse(pattern).matches(topic))
    }
}

/// Counters for a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    /// Jobs waiting for dispatch.
    pub queued: u64,
    /// Jobs handed to consumers.
    pub active: u64,
    /// Jobs that finished successfully.
    pub succeeded: u64,
    /// Failed attempts (including ones that were retried).
    pub failed_attempts: u64,
    /// Jobs dropped (cancelled or retries exhausted).
    pub dropped: u64,
    /// Jobs stopped on request.
    pub stopped: u64,
}

impl QueueStats {
    /// Jobs the queue still owns.
    pub fn pending(&self) -> u64 {
        self.queued + self.active
    }

    /// Jobs that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.dropped + self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_pattern() {
        let p = TopicPattern::parse("a/b/c");
        assert!(p.matches("a/b/c"));
        assert!(!p.matches("a/b/c/d"));
        assert!(!p.matches("a/b"));
    }

    #[test]
    fn package_pattern_matches_one_level() {
        let p = TopicPattern::parse("a/b/.");
        assert!(p.matches("a/b/c"));
        assert!(!p.matches("a/b/c/d"));
        assert!(!p.matches("a/bc"));
    }

    #[test]
    fn sub_package_pattern_matches_any_depth() {
        let p = TopicPattern::parse("a/b/*");
        assert!(p.matches("a/b/c"));
        assert!(p.matches("a/b/c/d"));
        assert!(!p.matches("a/bc/d"));
        assert!(!p.matches("a/b"));
        assert_eq!(TopicPattern::parse("a/b*"), p);
    }

    #[test]
    fn star_matches_everything() {
        let p = TopicPattern::parse("*");
        assert!(p.matches("x"));
        assert!(p.matches("x/y/z"));
    }

    #[test]
    fn ordered_queue_has_one_worker() {
        let config = QueueConfig::new("q")
            .with_kind(QueueKind::Ordered)
            .with_max_parallel(8);
        assert_eq!(config.worker_count(), 1);
        assert_eq!(QueueConfig::new("i").with_kind(QueueKind::Ignore).worker_count(), 0);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"name":"imports","kind":"ordered","topics":["import/*"]}"#)
                .unwrap();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.retry_delay_ms, 2000);
        assert!(config.matches("import/csv"));
    }
}
