#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{
    ClusterView, InstanceDescription, InstanceProperties, TopologyEvent, TopologyEventKind,
    TopologyEventListener, TopologyView,
};

/// Listener keeping every event it receives.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<TopologyEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<TopologyEventKind> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    pub fn events(&self) -> Vec<TopologyEvent> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<TopologyEvent> {
        self.events.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TopologyEventListener for RecordingListener {
    fn handle_topology_event(&self, event: &TopologyEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Listener that panics on every event.
pub struct PanickingListener;

impl TopologyEventListener for PanickingListener {
    fn handle_topology_event(&self, event: &TopologyEvent) {
        panic!("listener blew up on {event}");
    }
}

pub fn properties(pairs: &[(&str, &str)]) -> InstanceProperties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// One cluster, `local` is leader and local, `others` are plain members.
pub fn view(local: &str, others: &[&str], props: &[(&str, &str)]) -> TopologyView {
    let mut members = vec![
        InstanceDescription::new(local)
            .with_leader(true)
            .with_local(true)
            .with_properties(properties(props)),
    ];
    members.extend(others.iter().map(|id| InstanceDescription::new(*id)));
    let cluster = ClusterView::new("cluster-1", members).expect("valid cluster");
    TopologyView::new(vec![cluster]).expect("valid view")
}
