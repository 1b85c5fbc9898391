//! Topology view state and listener notification.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use relay_core::{TopologyEvent, TopologyEventKind, TopologyEventListener, TopologyView};

/// Handle returned by [`ViewStateManager::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct BoundListener {
    id: u64,
    listener: Arc<dyn TopologyEventListener>,
    last_kind: Option<TopologyEventKind>,
}

impl BoundListener {
    /// Deliver an event, never sending two consecutive CHANGING events.
    fn deliver(&mut self, event: &TopologyEvent) {
        if event.kind() == TopologyEventKind::TopologyChanging
            && self.last_kind == Some(TopologyEventKind::TopologyChanging)
        {
            tracing::debug!("Listener {} already got TOPOLOGY_CHANGING", self.id);
            return;
        }
        self.last_kind = Some(event.kind());

        let listener = &self.listener;
        if catch_unwind(AssertUnwindSafe(|| listener.handle_topology_event(event))).is_err() {
            tracing::error!("Topology listener {} panicked handling {}", self.id, event);
        }
    }
}

#[derive(Default)]
struct ViewState {
    activated: bool,
    changing: bool,
    previous: Option<Arc<TopologyView>>,
    /// Listeners that received their TOPOLOGY_INIT.
    listeners: Vec<BoundListener>,
    /// Listeners waiting for the first view.
    parked: Vec<BoundListener>,
    next_id: u64,
}

impl ViewState {
    fn send_to_all(&mut self, event: &TopologyEvent) {
        tracing::info!("Sending {} to {} listeners", event, self.listeners.len());
        for listener in &mut self.listeners {
            listener.deliver(event);
        }
    }

    fn init_parked(&mut self, view: &Arc<TopologyView>) {
        if self.parked.is_empty() {
            return;
        }
        let event = TopologyEvent::init(view.clone());
        for mut listener in std::mem::take(&mut self.parked) {
            listener.deliver(&event);
            self.listeners.push(listener);
        }
    }

    fn changing(&mut self) {
        if self.changing {
            return;
        }
        self.changing = true;
        if !self.activated {
            return;
        }
        let Some(previous) = self.previous.clone() else {
            // Nothing announced yet, nothing to retract.
            return;
        };
        previous.set_not_current();
        self.send_to_all(&TopologyEvent::changing(previous));
    }
}

/// Tracks the current topology view and notifies listeners of changes.
///
/// All state transitions and event deliveries are serialized under one
/// lock, so every listener observes events in the same order. Listeners are
/// called synchronously and must not call back into the manager.
/// Reading the current view never takes the lock.
pub struct ViewStateManager {
    current: ArcSwapOption<TopologyView>,
    state: Mutex<ViewState>,
}

impl ViewStateManager {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Register a listener.
    ///
    /// It receives TOPOLOGY_INIT right away when the manager is activated
    /// and a settled view exists; otherwise once the first view settles.
    pub fn bind(&self, listener: Arc<dyn TopologyEventListener>) -> ListenerHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        let mut bound = BoundListener {
            id,
            listener,
            last_kind: None,
        };

        match state.previous.clone() {
            Some(view) if state.activated && !state.changing => {
                bound.deliver(&TopologyEvent::init(view));
                state.listeners.push(bound);
            }
            _ => {
                tracing::debug!("Delaying TOPOLOGY_INIT for listener {}", id);
                state.parked.push(bound);
            }
        }
        ListenerHandle(id)
    }

    /// Remove a listener. Returns whether it was bound.
    pub fn unbind(&self, handle: ListenerHandle) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len() + state.parked.len();
        state.listeners.retain(|l| l.id != handle.0);
        state.parked.retain(|l| l.id != handle.0);
        before != state.listeners.len() + state.parked.len()
    }

    pub fn handle_activated(&self) {
        let mut state = self.state.lock();
        state.activated = true;
        tracing::info!("View state manager activated");
        if let Some(view) = state.previous.clone()
            && !state.changing
        {
            state.init_parked(&view);
        }
    }

    /// Forget the view and every listener.
    pub fn handle_deactivated(&self) {
        let mut state = self.state.lock();
        state.activated = false;
        state.changing = false;
        if let Some(previous) = state.previous.take() {
            previous.set_not_current();
        }
        self.current.store(None);
        state.listeners.clear();
        state.parked.clear();
        tracing::info!("View state manager deactivated");
    }

    /// A topology change started; the current view is no longer valid.
    pub fn handle_changing(&self) {
        self.state.lock().changing();
    }

    /// A new view settled.
    ///
    /// Returns whether the view was taken over (false for a view identical
    /// to the announced one).
    pub fn handle_new_view(&self, view: TopologyView) -> bool {
        self.apply_view(view, false)
    }

    /// Publish a view whose membership is unchanged, announcing
    /// TOPOLOGY_PROPERTIES_CHANGED even if the property values are equal.
    ///
    /// Falls back to [`handle_new_view`](Self::handle_new_view) when the
    /// membership did change or no view was announced yet.
    pub fn handle_properties_update(&self, view: TopologyView) -> bool {
        self.apply_view(view, true)
    }

    fn apply_view(&self, view: TopologyView, force_properties: bool) -> bool {
        let mut state = self.state.lock();
        if !view.is_current() {
            state.changing();
            return false;
        }

        let same_membership = state
            .previous
            .as_ref()
            .is_some_and(|previous| previous.same_membership(&view));
        let properties_only = !state.changing
            && state.previous.as_ref().is_some_and(|previous| {
                previous.differs_only_in_properties(&view)
                    || (force_properties && same_membership)
            });

        if !state.changing {
            if !properties_only
                && state.previous.as_ref().is_some_and(|previous| **previous == view)
            {
                return false;
            }
            if !properties_only {
                state.changing();
            }
        }

        let view = Arc::new(view);
        if !state.activated {
            if let Some(previous) = state.previous.replace(view.clone()) {
                previous.set_not_current();
            }
            state.changing = false;
            self.current.store(Some(view));
            return true;
        }

        if let Some(previous) = state.previous.clone() {
            previous.set_not_current();
            if properties_only {
                tracing::info!("Topology properties changed");
                state.send_to_all(&TopologyEvent::properties_changed(previous, view.clone()));
            } else {
                state.send_to_all(&TopologyEvent::changed(previous, view.clone()));
            }
        }
        state.changing = false;
        state.init_parked(&view);
        state.previous = Some(view.clone());
        self.current.store(Some(view));
        true
    }

    /// The latest announced view. Lock-free.
    pub fn topology(&self) -> Option<Arc<TopologyView>> {
        self.current.load_full()
    }

    pub fn is_changing(&self) -> bool {
        self.state.lock().changing
    }

    /// Number of bound listeners, initialized or not.
    pub fn listener_count(&self) -> usize {
        let state = self.state.lock();
        state.listeners.len() + state.parked.len()
    }
}

impl Default for ViewStateManager {
    fn default() -> Self {
        Self::new()
    }
}
