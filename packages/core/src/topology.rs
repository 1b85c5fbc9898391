//! Topology model: instances, cluster views, topology snapshots and the
//! events that describe transitions between snapshots.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::TopologyError;

/// Instance metadata advertised to the topology.
pub type InstanceProperties = BTreeMap<String, String>;

/// One running process participating in the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDescription {
    sling_id: String,
    cluster_id: String,
    leader: bool,
    local: bool,
    properties: InstanceProperties,
}

impl InstanceDescription {
    pub fn new(sling_id: impl Into<String>) -> Self {
        Self {
            sling_id: sling_id.into(),
            cluster_id: String::new(),
            leader: false,
            local: false,
            properties: InstanceProperties::new(),
        }
    }

    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_properties(mut self, properties: InstanceProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn sling_id(&self) -> &str {
        &self.sling_id
    }

    /// Id of the cluster view this instance belongs to.
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn properties(&self) -> &InstanceProperties {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// A set of instances that can currently observe each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterView {
    id: String,
    instances: Vec<InstanceDescription>,
    leader: usize,
}

impl ClusterView {
    /// Build a cluster view. Exactly one instance must be leader and sling
    /// ids must be unique; instance order is kept as given.
    pub fn new(
        id: impl Into<String>,
        instances: Vec<InstanceDescription>,
    ) -> Result<Self, TopologyError> {
        let id = id.into();
        if instances.is_empty() {
            return Err(TopologyError::IllegalArgument(
                "cluster view must contain at least one instance",
            ));
        }
        let mut leaders = instances
            .iter()
            .enumerate()
            .filter(|(_, i)| i.leader)
            .map(|(pos, _)| pos);
        let leader = leaders.next().ok_or(TopologyError::IllegalArgument(
            "cluster view must have a leader",
        ))?;
        if leaders.next().is_some() {
            return Err(TopologyError::IllegalArgument(
                "cluster view must have exactly one leader",
            ));
        }
        let mut seen = HashSet::new();
        if !instances.iter().all(|i| seen.insert(i.sling_id.clone())) {
            return Err(TopologyError::IllegalArgument(
                "cluster view contains duplicate instances",
            ));
        }
        let instances = instances
            .into_iter()
            .map(|mut instance| {
                instance.cluster_id = id.clone();
                instance
            })
            .collect();
        Ok(Self {
            id,
            instances,
            leader,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instances(&self) -> &[InstanceDescription] {
        &self.instances
    }

    pub fn leader(&self) -> &InstanceDescription {
        &self.instances[self.leader]
    }

    pub fn find(&self, sling_id: &str) -> Option<&InstanceDescription> {
        self.instances.iter().find(|i| i.sling_id == sling_id)
    }

    fn same_membership(&self, other: &ClusterView) -> bool {
        self.id == other.id
            && self.leader().sling_id == other.leader().sling_id
            && self.instances.len() == other.instances.len()
            && self
                .instances
                .iter()
                .zip(&other.instances)
                .all(|(a, b)| a.sling_id == b.sling_id && a.local == b.local)
    }
}

/// Snapshot of the whole topology at one point in time.
#[derive(Debug)]
pub struct TopologyView {
    current: AtomicBool,
    clusters: Vec<ClusterView>,
    local: (usize, usize),
}

impl TopologyView {
    /// Build a current topology snapshot. Every instance must appear in
    /// exactly one cluster and exactly one instance must be local.
    pub fn new(clusters: Vec<ClusterView>) -> Result<Self, TopologyError> {
        let mut seen = HashSet::new();
        let mut local = None;
        for (c, cluster) in clusters.iter().enumerate() {
            for (i, instance) in cluster.instances.iter().enumerate() {
                if !seen.insert(instance.sling_id.as_str()) {
                    return Err(TopologyError::IllegalArgument(
                        "instance belongs to more than one cluster view",
                    ));
                }
                if instance.local {
                    if local.is_some() {
                        return Err(TopologyError::IllegalArgument(
                            "topology view has more than one local instance",
                        ));
                    }
                    local = Some((c, i));
                }
            }
        }
        let local = local.ok_or(TopologyError::NoLocalInstance)?;
        Ok(Self {
            current: AtomicBool::new(true),
            clusters,
            local,
        })
    }

    /// Whether this snapshot is still the valid one.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire)
    }

    /// Mark the snapshot as outdated. There is no way back.
    pub fn set_not_current(&self) {
        self.current.store(false, Ordering::Release);
    }

    pub fn clusters(&self) -> &[ClusterView] {
        &self.clusters
    }

    pub fn instances(&self) -> impl Iterator<Item = &InstanceDescription> {
        self.clusters.iter().flat_map(|c| c.instances.iter())
    }

    pub fn local_instance(&self) -> &InstanceDescription {
        &self.clusters[self.local.0].instances[self.local.1]
    }

    pub fn local_cluster(&self) -> &ClusterView {
        &self.clusters[self.local.0]
    }

    pub fn is_local_leader(&self) -> bool {
        self.local_instance().leader
    }

    pub fn find_instance(&self, sling_id: &str) -> Option<&InstanceDescription> {
        self.instances().find(|i| i.sling_id == sling_id)
    }

    /// True when both views have the same clusters, members and leaders.
    pub fn same_membership(&self, other: &TopologyView) -> bool {
        self.clusters.len() == other.clusters.len()
            && self
                .clusters
                .iter()
                .zip(&other.clusters)
                .all(|(a, b)| a.same_membership(b))
    }

    /// True when membership is identical but some instance property differs.
    pub fn differs_only_in_properties(&self, other: &TopologyView) -> bool {
        self.same_membership(other) && self.clusters != other.clusters
    }
}

impl PartialEq for TopologyView {
    fn eq(&self, other: &Self) -> bool {
        self.clusters == other.clusters
    }
}

impl Eq for TopologyView {}

/// Kind of topology transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyEventKind {
    TopologyInit,
    TopologyChanging,
    TopologyChanged,
    PropertiesChanged,
}

impl std::fmt::Display for TopologyEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyEventKind::TopologyInit => write!(f, "TOPOLOGY_INIT"),
            TopologyEventKind::TopologyChanging => write!(f, "TOPOLOGY_CHANGING"),
            TopologyEventKind::TopologyChanged => write!(f, "TOPOLOGY_CHANGED"),
            TopologyEventKind::PropertiesChanged => write!(f, "PROPERTIES_CHANGED"),
        }
    }
}

/// Immutable notification of a transition between two snapshots.
#[derive(Debug, Clone)]
pub struct TopologyEvent {
    kind: TopologyEventKind,
    old_view: Option<Arc<TopologyView>>,
    new_view: Option<Arc<TopologyView>>,
}

impl TopologyEvent {
    pub fn new(
        kind: TopologyEventKind,
        old_view: Option<Arc<TopologyView>>,
        new_view: Option<Arc<TopologyView>>,
    ) -> Result<Self, TopologyError> {
        match kind {
            TopologyEventKind::TopologyInit => {
                if old_view.is_some() {
                    return Err(TopologyError::IllegalArgument(
                        "TOPOLOGY_INIT must not have an old view",
                    ));
                }
                if new_view.is_none() {
                    return Err(TopologyError::IllegalArgument(
                        "TOPOLOGY_INIT must have a new view",
                    ));
                }
            }
            TopologyEventKind::TopologyChanging => {
                if old_view.is_none() {
                    return Err(TopologyError::IllegalArgument(
                        "TOPOLOGY_CHANGING must have an old view",
                    ));
                }
                if new_view.is_some() {
                    return Err(TopologyError::IllegalArgument(
                        "TOPOLOGY_CHANGING must not have a new view",
                    ));
                }
            }
            TopologyEventKind::TopologyChanged | TopologyEventKind::PropertiesChanged => {
                if old_view.is_none() || new_view.is_none() {
                    return Err(TopologyError::IllegalArgument(
                        "event requires both an old and a new view",
                    ));
                }
            }
        }
        Ok(Self {
            kind,
            old_view,
            new_view,
        })
    }

    pub fn init(new_view: Arc<TopologyView>) -> Self {
        Self {
            kind: TopologyEventKind::TopologyInit,
            old_view: None,
            new_view: Some(new_view),
        }
    }

    pub fn changing(old_view: Arc<TopologyView>) -> Self {
        Self {
            kind: TopologyEventKind::TopologyChanging,
            old_view: Some(old_view),
            new_view: None,
        }
    }

    pub fn changed(old_view: Arc<TopologyView>, new_view: Arc<TopologyView>) -> Self {
        Self {
            kind: TopologyEventKind::TopologyChanged,
            old_view: Some(old_view),
            new_view: Some(new_view),
        }
    }

    pub fn properties_changed(old_view: Arc<TopologyView>, new_view: Arc<TopologyView>) -> Self {
        Self {
            kind: TopologyEventKind::PropertiesChanged,
            old_view: Some(old_view),
            new_view: Some(new_view),
        }
    }

    pub fn kind(&self) -> TopologyEventKind {
        self.kind
    }

    pub fn old_view(&self) -> Option<&Arc<TopologyView>> {
        self.old_view.as_ref()
    }

    pub fn new_view(&self) -> Option<&Arc<TopologyView>> {
        self.new_view.as_ref()
    }

    /// Instances present in the new view but not in the old one.
    pub fn added_instances(&self) -> Vec<&InstanceDescription> {
        match (&self.old_view, &self.new_view) {
            (Some(old), Some(new)) => new
                .instances()
                .filter(|i| old.find_instance(i.sling_id()).is_none())
                .collect(),
            (None, Some(new)) => new.instances().collect(),
            _ => Vec::new(),
        }
    }

    /// Instances present in the old view but gone from the new one.
    pub fn removed_instances(&self) -> Vec<&InstanceDescription> {
        match (&self.old_view, &self.new_view) {
            (Some(old), Some(new)) => old
                .instances()
                .filter(|i| new.find_instance(i.sling_id()).is_none())
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl std::fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = |v: &Option<Arc<TopologyView>>| v.as_ref().map_or(0, |v| v.instances().count());
        write!(
            f,
            "{} (old: {} instances, new: {} instances)",
            self.kind,
            count(&self.old_view),
            count(&self.new_view)
        )
    }
}

/// Receives topology events. Called synchronously by the view manager; a
/// panicking listener is logged and skipped.
pub trait TopologyEventListener: Send + Sync + 'static {
    fn handle_topology_event(&self, event: &TopologyEvent);
}

/// Supplies values for advertised instance properties.
pub trait PropertyProvider: Send + Sync + 'static {
    fn property(&self, name: &str) -> Option<String>;
}
