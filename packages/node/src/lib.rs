//! Runnable relay node: configuration loading and wiring of the job engine
//! with standalone topology discovery.

mod config;
mod node;

pub use config::{ConfigError, NodeConfig, StoreConfig};
pub use node::{Node, NodeError};
