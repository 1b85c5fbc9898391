//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Ordered job payload. Insertion order is preserved.
pub type JobProperties = serde_json::Map<String, serde_json::Value>;

/// Unique identifier for a job.
///
/// Generated ids are ULIDs so they sort chronologically; named jobs use the
/// caller-supplied name verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a new unique job ID.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Use a caller-supplied job name as the ID.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Current state of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be dispatched.
    #[default]
    Queued,
    /// Handed to a consumer.
    Active,
    /// Consumer reported success.
    Succeeded,
    /// The last attempt failed; the job is about to be re-queued or dropped.
    Failed,
    /// Cancelled by its consumer, retries exhausted, or not known to the store.
    Dropped,
    /// Stopped on request.
    Stopped,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Dropped | JobState::Stopped
        )
    }

    /// Whether the engine may still pick this job up.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Active)
    }

    /// Get a simple state string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Active => "active",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Dropped => "dropped",
            JobState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome a consumer reports for one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Ok,
    Failed,
    Cancel,
}

/// A job represents a unit of work to be executed by the queue system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Topic used for routing to consumers and queues.
    pub topic: String,
    /// Name of the queue this job was routed to.
    pub queue: String,
    /// Job payload.
    #[serde(default)]
    pub properties: JobProperties,
    /// Current state.
    pub state: JobState,
    /// Number of prior failed attempts.
    #[serde(default)]
    pub retry_count: u32,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Message of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(
        id: JobId,
        topic: impl Into<String>,
        queue: impl Into<String>,
        properties: JobProperties,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            topic: topic.into(),
            queue: queue.into(),
            properties,
            state: JobState::Queued,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
            last_error: None,
        }
    }

    /// Look up a payload property.
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.get(name)
    }

    /// Move the job to `state`, stamping the update (and finish) time.
    ///
    /// Terminal states are sticky: a transition out of one is ignored and
    /// reported as `false`.
    pub fn transition(&mut self, state: JobState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.state = state;
        self.updated_at = now;
        if state.is_terminal() {
            self.finished_at = Some(now);
        }
        true
    }

    /// Snapshot of the status fields reported to callers.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            state: self.state,
            retry_count: self.retry_count,
            created_at: Some(self.created_at),
        }
    }
}

/// Status answer for a job lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub retry_count: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Status reported for ids the store does not know: assume the job is gone.
    pub fn unknown() -> Self {
        Self {
            state: JobState::Dropped,
            retry_count: 0,
            created_at: None,
        }
    }
}
