#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relay_actors::{EngineConfig, FnConsumer, JobConsumer, JobManager, MemoryJobStore};
use relay_core::{JobError, JobEvent, JobId, JobProperties, JobResult, JobState, JobStore, MAIN_QUEUE, QueueConfig};
use tokio::sync::broadcast::{self, error::RecvError};

pub const WAIT: Duration = Duration::from_secs(5);

/// Engine configuration with a fast tick and no retry delay on the main queue.
pub fn fast_config() -> EngineConfig {
    EngineConfig::new()
        .with_tick_ms(20)
        .with_main_queue(QueueConfig::new(MAIN_QUEUE).with_retry_delay_ms(0))
}

pub async fn start_engine(config: EngineConfig) -> Result<(JobManager, Arc<MemoryJobStore>), JobError> {
    let store = Arc::new(MemoryJobStore::new());
    let manager = JobManager::start(config, store.clone() as Arc<dyn JobStore>).await?;
    Ok((manager, store))
}

pub fn props(pairs: &[(&str, &str)]) -> JobProperties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect()
}

/// Consumer that always answers `result` and counts its attempts.
pub fn counting_consumer(result: JobResult) -> (impl JobConsumer, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let consumer = FnConsumer::new(move |_job, _stop| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { result })
    });
    (consumer, attempts)
}

/// Wait for the first event matching `pred`.
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<JobEvent>, mut pred: F) -> JobEvent
where
    F: FnMut(&JobEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll the engine until the job reaches `state`.
pub async fn wait_for_state(manager: &JobManager, id: &JobId, state: JobState) {
    tokio::time::timeout(WAIT, async {
        loop {
            if manager.get_status(id).await.map(|s| s.state).ok() == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {} never reached {}", id, state))
}
