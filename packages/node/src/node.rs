//! Wiring of the job engine and topology discovery for one instance.

use std::sync::Arc;

use relay_actors::{
    CONSUMER_TOPICS_PROPERTY, ConsumerHandle, FileJobStore, JobConsumer, JobManager,
    MemoryJobStore,
};
use relay_core::{JobError, JobStore, StoreError, TopologyError};
use relay_db::{DbError, SurrealJobStore};
use relay_discovery::StandaloneDiscovery;
use thiserror::Error;

use crate::{NodeConfig, StoreConfig};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A running instance: job engine plus its topology.
///
/// The engine follows the topology's leadership and the topology advertises
/// the engine's consumer topics.
pub struct Node {
    manager: JobManager,
    discovery: Arc<StandaloneDiscovery>,
}

impl Node {
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        let store = open_store(&config.store).await?;
        let manager = JobManager::start(config.engine, store).await?;

        let discovery = Arc::new(
            StandaloneDiscovery::new(config.sling_id).with_properties(config.properties),
        );
        discovery.bind(Arc::new(manager.leadership_listener()));
        discovery.add_provider(
            Arc::new(manager.topics_provider()),
            0,
            vec![CONSUMER_TOPICS_PROPERTY.to_string()],
        )?;
        discovery.start()?;

        tracing::info!("Node {} started", discovery.sling_id());
        Ok(Self { manager, discovery })
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn discovery(&self) -> &Arc<StandaloneDiscovery> {
        &self.discovery
    }

    /// Register a consumer and republish the advertised topics.
    pub fn register_consumer<C: JobConsumer>(
        &self,
        pattern: &str,
        consumer: C,
    ) -> Result<ConsumerHandle, NodeError> {
        let handle = self.manager.register_consumer(pattern, consumer)?;
        self.discovery.refresh_properties()?;
        Ok(handle)
    }

    pub fn unregister_consumer(&self, handle: &ConsumerHandle) -> Result<bool, NodeError> {
        let removed = self.manager.unregister_consumer(handle);
        if removed {
            self.discovery.refresh_properties()?;
        }
        Ok(removed)
    }

    /// Leave the topology, then stop the engine.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        self.discovery.stop();
        self.manager.shutdown().await?;
        Ok(())
    }
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn JobStore>, NodeError> {
    let store: Arc<dyn JobStore> = match config {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory job store; jobs will not survive a restart");
            Arc::new(MemoryJobStore::new())
        }
        StoreConfig::File { path } => {
            let store = FileJobStore::new(path);
            store.init().await?;
            tracing::info!("Using file job store at {}", path.display());
            Arc::new(store)
        }
        StoreConfig::Surreal(db) => {
            let db = relay_db::init(db).await?;
            Arc::new(SurrealJobStore::new(db))
        }
    };
    Ok(store)
}
