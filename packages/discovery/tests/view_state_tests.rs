#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;

use common::{PanickingListener, RecordingListener, view};
use relay_core::TopologyEventKind::{
    PropertiesChanged, TopologyChanged, TopologyChanging, TopologyInit,
};
use relay_discovery::ViewStateManager;

fn active_manager() -> ViewStateManager {
    let manager = ViewStateManager::new();
    manager.handle_activated();
    manager
}

#[test]
fn test_init_is_delayed_until_first_view() -> Result<(), Box<dyn Error>> {
    let manager = ViewStateManager::new();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());

    manager.handle_activated();
    assert!(listener.kinds().is_empty());

    assert!(manager.handle_new_view(view("a", &[], &[])));
    assert_eq!(listener.kinds(), vec![TopologyInit]);

    let event = listener.last().ok_or("no event")?;
    assert!(event.old_view().is_none());
    assert_eq!(event.new_view().map(|v| v.local_instance().sling_id()), Some("a"));
    Ok(())
}

#[test]
fn test_late_listener_gets_init_immediately() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    manager.handle_new_view(view("a", &["b"], &[]));

    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    assert_eq!(listener.kinds(), vec![TopologyInit]);
    Ok(())
}

#[test]
fn test_view_before_activation_is_announced_on_activation() -> Result<(), Box<dyn Error>> {
    let manager = ViewStateManager::new();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());

    assert!(manager.handle_new_view(view("a", &[], &[])));
    assert!(listener.kinds().is_empty());
    assert!(manager.topology().is_some());

    manager.handle_activated();
    assert_eq!(listener.kinds(), vec![TopologyInit]);
    Ok(())
}

#[test]
fn test_membership_change_sends_changing_then_changed() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    manager.handle_new_view(view("a", &[], &[]));
    let first = manager.topology().ok_or("no view")?;

    assert!(manager.handle_new_view(view("a", &["b"], &[])));
    assert_eq!(
        listener.kinds(),
        vec![TopologyInit, TopologyChanging, TopologyChanged]
    );
    assert!(!first.is_current());

    let changed = listener.last().ok_or("no event")?;
    assert!(changed.old_view().is_some_and(|v| Arc::ptr_eq(v, &first)));
    assert_eq!(changed.added_instances().len(), 1);
    assert!(manager.topology().is_some_and(|v| v.is_current()));
    Ok(())
}

#[test]
fn test_changing_is_sent_once() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    manager.handle_new_view(view("a", &[], &[]));

    manager.handle_changing();
    manager.handle_changing();
    assert!(manager.is_changing());
    assert_eq!(listener.kinds(), vec![TopologyInit, TopologyChanging]);

    manager.handle_new_view(view("a", &["b"], &[]));
    assert!(!manager.is_changing());
    assert_eq!(
        listener.kinds(),
        vec![TopologyInit, TopologyChanging, TopologyChanged]
    );
    Ok(())
}

#[test]
fn test_listener_bound_while_changing_gets_init_with_new_view() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let early = RecordingListener::new();
    manager.bind(early.clone());
    manager.handle_new_view(view("a", &[], &[]));
    manager.handle_changing();

    let late = RecordingListener::new();
    manager.bind(late.clone());
    assert!(late.kinds().is_empty());

    manager.handle_new_view(view("a", &["b"], &[]));
    assert_eq!(late.kinds(), vec![TopologyInit]);
    let init = late.last().ok_or("no event")?;
    assert!(init.new_view().is_some_and(|v| v.find_instance("b").is_some()));
    assert_eq!(early.kinds().last(), Some(&TopologyChanged));
    Ok(())
}

#[test]
fn test_property_change_skips_changing() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    manager.handle_new_view(view("a", &["b"], &[("region", "eu")]));

    assert!(manager.handle_new_view(view("a", &["b"], &[("region", "us")])));
    assert_eq!(listener.kinds(), vec![TopologyInit, PropertiesChanged]);

    let event = listener.last().ok_or("no event")?;
    let new_view = event.new_view().ok_or("no new view")?;
    assert_eq!(new_view.local_instance().property("region"), Some("us"));
    Ok(())
}

#[test]
fn test_identical_view_is_ignored() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    manager.handle_new_view(view("a", &["b"], &[("region", "eu")]));
    let first = manager.topology().ok_or("no view")?;

    assert!(!manager.handle_new_view(view("a", &["b"], &[("region", "eu")])));
    assert_eq!(listener.kinds(), vec![TopologyInit]);
    assert!(first.is_current());
    Ok(())
}

#[test]
fn test_outdated_view_starts_a_change() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let listener = RecordingListener::new();
    manager.bind(listener.clone());
    manager.handle_new_view(view("a", &[], &[]));

    let stale = view("a", &["b"], &[]);
    stale.set_not_current();
    assert!(!manager.handle_new_view(stale));
    assert!(manager.is_changing());
    assert_eq!(listener.kinds(), vec![TopologyInit, TopologyChanging]);
    Ok(())
}

#[test]
fn test_panicking_listener_does_not_stop_delivery() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    manager.bind(Arc::new(PanickingListener));
    let listener = RecordingListener::new();
    manager.bind(listener.clone());

    manager.handle_new_view(view("a", &[], &[]));
    manager.handle_new_view(view("a", &["b"], &[]));
    assert_eq!(
        listener.kinds(),
        vec![TopologyInit, TopologyChanging, TopologyChanged]
    );
    assert_eq!(manager.listener_count(), 2);
    Ok(())
}

#[test]
fn test_unbind_and_deactivate() -> Result<(), Box<dyn Error>> {
    let manager = active_manager();
    let kept = RecordingListener::new();
    let dropped = RecordingListener::new();
    manager.bind(kept.clone());
    let handle = manager.bind(dropped.clone());
    manager.handle_new_view(view("a", &[], &[]));

    assert!(manager.unbind(handle));
    assert!(!manager.unbind(handle));
    manager.handle_new_view(view("a", &["b"], &[]));
    assert_eq!(dropped.kinds(), vec![TopologyInit]);
    assert_eq!(kept.kinds().len(), 3);

    let last = manager.topology().ok_or("no view")?;
    manager.handle_deactivated();
    assert_eq!(manager.listener_count(), 0);
    assert!(manager.topology().is_none());
    assert!(!last.is_current());

    kept.clear();
    manager.handle_new_view(view("a", &["c"], &[]));
    assert!(kept.kinds().is_empty());
    Ok(())
}
