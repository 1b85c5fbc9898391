#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{RecordingListener, properties};
use relay_core::TopologyEventKind::{PropertiesChanged, TopologyInit};
use relay_discovery::{StandaloneDiscovery, StaticProperties};

fn region(value: &str) -> Arc<StaticProperties> {
    Arc::new(StaticProperties::single("region", value))
}

#[test]
fn test_single_instance_topology() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1").with_cluster_id("solo");
    assert!(discovery.topology().is_none());
    discovery.start()?;

    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.clusters().len(), 1);
    assert_eq!(view.instances().count(), 1);

    let local = view.local_instance();
    assert_eq!(local.sling_id(), "node-1");
    assert_eq!(local.cluster_id(), "solo");
    assert!(local.is_leader());
    assert!(local.is_local());
    assert!(view.is_local_leader());
    Ok(())
}

#[test]
fn test_listener_bound_before_start_gets_init() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1");
    let listener = RecordingListener::new();
    discovery.bind(listener.clone());
    assert!(listener.kinds().is_empty());

    discovery.start()?;
    assert_eq!(listener.kinds(), vec![TopologyInit]);
    Ok(())
}

#[test]
fn test_highest_ranked_provider_wins() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1");
    discovery.start()?;
    discovery.add_provider(region("eu"), 5, vec!["region".into()])?;
    discovery.add_provider(region("us"), 1, vec!["region".into()])?;

    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.local_instance().property("region"), Some("eu"));
    Ok(())
}

#[test]
fn test_equal_rank_keeps_first_provider() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1");
    discovery.add_provider(region("eu"), 2, vec!["region".into()])?;
    discovery.add_provider(region("us"), 2, vec!["region".into()])?;
    discovery.start()?;

    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.local_instance().property("region"), Some("eu"));
    Ok(())
}

#[test]
fn test_provider_changes_send_properties_changed() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1")
        .with_properties(properties(&[("region", "default"), ("role", "worker")]));
    discovery.start()?;
    let listener = RecordingListener::new();
    discovery.bind(listener.clone());

    let eu = discovery.add_provider(region("eu"), 5, vec!["region".into()])?;
    // Same values, still announced.
    discovery.add_provider(region("eu"), 1, vec!["region".into()])?;
    assert!(discovery.update_provider(eu, 0, vec!["region".into()])?);
    assert!(discovery.remove_provider(eu)?);
    assert!(!discovery.remove_provider(eu)?);
    discovery.refresh_properties()?;

    assert_eq!(
        listener.kinds(),
        vec![
            TopologyInit,
            PropertiesChanged,
            PropertiesChanged,
            PropertiesChanged,
            PropertiesChanged,
            PropertiesChanged,
        ]
    );

    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.local_instance().property("region"), Some("eu"));
    assert_eq!(view.local_instance().property("role"), Some("worker"));
    Ok(())
}

#[test]
fn test_provider_overrides_base_property() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1")
        .with_properties(properties(&[("region", "default")]));
    discovery.start()?;
    let handle = discovery.add_provider(region("eu"), 0, vec!["region".into()])?;
    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.local_instance().property("region"), Some("eu"));

    discovery.remove_provider(handle)?;
    let view = discovery.topology().ok_or("no view")?;
    assert_eq!(view.local_instance().property("region"), Some("default"));
    Ok(())
}

#[test]
fn test_stop_drops_view_and_listeners() -> Result<(), Box<dyn Error>> {
    let discovery = StandaloneDiscovery::new("node-1");
    let listener = RecordingListener::new();
    let handle = discovery.bind(listener.clone());
    discovery.start()?;
    let view = discovery.topology().ok_or("no view")?;

    discovery.stop();
    assert!(discovery.topology().is_none());
    assert!(!view.is_current());
    assert!(!discovery.unbind(handle));
    Ok(())
}
