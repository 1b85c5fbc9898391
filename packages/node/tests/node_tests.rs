#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::time::Duration;

use relay_actors::{CONSUMER_TOPICS_PROPERTY, EngineConfig, JobResult, job_consumer};
use relay_core::{JobEvent, JobProperties, QueueConfig};
use relay_node::{Node, NodeConfig, StoreConfig};
use tokio::sync::broadcast::error::RecvError;

const WAIT: Duration = Duration::from_secs(5);

fn advertised_topics(node: &Node) -> Option<String> {
    node.discovery()
        .topology()?
        .local_instance()
        .property(CONSUMER_TOPICS_PROPERTY)
        .map(str::to_string)
}

#[tokio::test]
async fn test_node_advertises_consumer_topics() -> Result<(), Box<dyn Error>> {
    let config = NodeConfig::default()
        .with_sling_id("node-1")
        .with_property("region", "eu");
    let node = Node::start(config).await?;

    let view = node.discovery().topology().ok_or("no topology")?;
    assert_eq!(view.local_instance().sling_id(), "node-1");
    assert_eq!(view.local_instance().property("region"), Some("eu"));
    assert!(view.is_local_leader());

    let handle = node.register_consumer("relay/demo/*", job_consumer!(|job| JobResult::Ok))?;
    let topics = advertised_topics(&node).ok_or("topics not advertised")?;
    assert!(topics.contains("relay/demo/*"));

    assert!(node.unregister_consumer(&handle)?);
    let topics = advertised_topics(&node).unwrap_or_default();
    assert!(!topics.contains("relay/demo/*"));

    node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_standalone_node_runs_leader_only_queues() -> Result<(), Box<dyn Error>> {
    let engine = EngineConfig::new()
        .with_tick_ms(20)
        .with_assume_leader(false)
        .with_queue(
            QueueConfig::new("ops")
                .with_topics(["ops/*"])
                .with_leader_only(true),
        );
    let node = Node::start(NodeConfig::default().with_engine(engine)).await?;
    node.register_consumer("ops/cleanup", job_consumer!(|job| JobResult::Ok))?;

    let mut events = node.manager().subscribe();
    let job = node
        .manager()
        .add("ops/cleanup", None, JobProperties::new())
        .await?;
    assert_eq!(job.queue, "ops");

    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(JobEvent::JobSucceeded { job_id, .. }) if job_id == job.id => return Ok(()),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return Err("event channel closed"),
            }
        }
    })
    .await??;

    node.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_file_store_node_keeps_jobs_across_restart() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = NodeConfig::default()
        .with_sling_id("node-1")
        .with_store(StoreConfig::File {
            path: dir.path().to_path_buf(),
        });

    let node = Node::start(config.clone()).await?;
    let job = node
        .manager()
        .add("relay/demo/late", Some("late-job"), JobProperties::new())
        .await?;
    node.shutdown().await?;

    let node = Node::start(config).await?;
    let head = node
        .manager()
        .get_head("main")
        .await?
        .ok_or("job not recovered")?;
    assert_eq!(head.id, job.id);

    node.shutdown().await?;
    Ok(())
}
