use std::error::Error;
use std::path::PathBuf;

use relay_actors::{JobResult, job_consumer};
use relay_node::{Node, NodeConfig};
use tracing_subscriber::EnvFilter;

/// Topic prefix handled by the built-in logging consumer.
const DEMO_TOPICS: &str = "relay/demo/*";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = NodeConfig::load(config_path.as_deref())?;

    let node = Node::start(config).await?;
    node.register_consumer(
        DEMO_TOPICS,
        job_consumer!(|job| {
            tracing::info!(
                "Processing {} ({}) with {} properties",
                job.id,
                job.topic,
                job.properties.len()
            );
            JobResult::Ok
        }),
    )?;

    tracing::info!("Relay node running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    node.shutdown().await?;
    Ok(())
}
