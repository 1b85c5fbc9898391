//! Topology discovery for relay instances.
//!
//! - `ViewStateManager` turns a stream of views into ordered
//!   INIT / CHANGING / CHANGED / PROPERTIES_CHANGED notifications
//! - `PropertyProviders` merges ranked instance property sources
//! - `elect_leader` / `assemble_cluster` build cluster views with a stable leader
//! - `StandaloneDiscovery` is the single-instance topology

mod election;
mod provider;
mod standalone;
mod view_state;

pub use election::{assemble_cluster, elect_leader};
pub use provider::{PropertyProviders, ProviderHandle, StaticProperties};
pub use standalone::StandaloneDiscovery;
pub use view_state::{ListenerHandle, ViewStateManager};
