//! Discovery for an instance that is not part of any cluster.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{
    ClusterView, InstanceDescription, InstanceProperties, PropertyProvider, TopologyError,
    TopologyEventListener, TopologyView,
};
use ulid::Ulid;

use crate::provider::{PropertyProviders, ProviderHandle};
use crate::view_state::{ListenerHandle, ViewStateManager};

/// Topology of a single instance: one cluster whose only member is the
/// local instance, which is also its leader.
///
/// Instance properties come from the registered [`PropertyProvider`]s;
/// every provider change is announced as TOPOLOGY_PROPERTIES_CHANGED.
pub struct StandaloneDiscovery {
    sling_id: String,
    cluster_id: String,
    base_properties: InstanceProperties,
    providers: Mutex<PropertyProviders>,
    views: ViewStateManager,
}

impl StandaloneDiscovery {
    /// Create a discovery service for `sling_id` with a fresh cluster id.
    pub fn new(sling_id: impl Into<String>) -> Self {
        Self {
            sling_id: sling_id.into(),
            cluster_id: Ulid::new().to_string(),
            base_properties: InstanceProperties::new(),
            providers: Mutex::new(PropertyProviders::new()),
            views: ViewStateManager::new(),
        }
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    /// Properties published regardless of providers. Providers override them.
    pub fn with_properties(mut self, properties: InstanceProperties) -> Self {
        self.base_properties = properties;
        self
    }

    pub fn sling_id(&self) -> &str {
        &self.sling_id
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Activate and publish the initial view.
    pub fn start(&self) -> Result<(), TopologyError> {
        let providers = self.providers.lock();
        self.views.handle_activated();
        let view = self.build_view(&providers)?;
        self.views.handle_new_view(view);
        tracing::info!(
            "Standalone discovery started for {} (cluster {})",
            self.sling_id,
            self.cluster_id
        );
        Ok(())
    }

    /// Deactivate: listeners are dropped and the view is invalidated.
    pub fn stop(&self) {
        let _providers = self.providers.lock();
        self.views.handle_deactivated();
        tracing::info!("Standalone discovery stopped for {}", self.sling_id);
    }

    pub fn bind(&self, listener: Arc<dyn TopologyEventListener>) -> ListenerHandle {
        self.views.bind(listener)
    }

    pub fn unbind(&self, handle: ListenerHandle) -> bool {
        self.views.unbind(handle)
    }

    /// Register a property provider advertising `names` at `rank`.
    pub fn add_provider(
        &self,
        provider: Arc<dyn PropertyProvider>,
        rank: i32,
        names: Vec<String>,
    ) -> Result<ProviderHandle, TopologyError> {
        let mut providers = self.providers.lock();
        let handle = providers.add(provider, rank, names);
        self.publish_properties(&providers)?;
        Ok(handle)
    }

    /// Change a provider's rank or names.
    pub fn update_provider(
        &self,
        handle: ProviderHandle,
        rank: i32,
        names: Vec<String>,
    ) -> Result<bool, TopologyError> {
        let mut providers = self.providers.lock();
        if !providers.update(handle, rank, names) {
            return Ok(false);
        }
        self.publish_properties(&providers)?;
        Ok(true)
    }

    pub fn remove_provider(&self, handle: ProviderHandle) -> Result<bool, TopologyError> {
        let mut providers = self.providers.lock();
        if !providers.remove(handle) {
            return Ok(false);
        }
        self.publish_properties(&providers)?;
        Ok(true)
    }

    /// Re-read provider values after a provider's answers changed.
    pub fn refresh_properties(&self) -> Result<(), TopologyError> {
        let providers = self.providers.lock();
        self.publish_properties(&providers)
    }

    /// The current topology view.
    pub fn topology(&self) -> Option<Arc<TopologyView>> {
        self.views.topology()
    }

    fn publish_properties(&self, providers: &PropertyProviders) -> Result<(), TopologyError> {
        let view = self.build_view(providers)?;
        self.views.handle_properties_update(view);
        Ok(())
    }

    fn build_view(&self, providers: &PropertyProviders) -> Result<TopologyView, TopologyError> {
        let mut properties = self.base_properties.clone();
        properties.extend(providers.collect());

        let local = InstanceDescription::new(self.sling_id.clone())
            .with_leader(true)
            .with_local(true)
            .with_properties(properties);
        TopologyView::new(vec![ClusterView::new(self.cluster_id.clone(), vec![local])?])
    }
}
