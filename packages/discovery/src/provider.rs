//! Property providers contributing to the local instance's properties.

use std::sync::Arc;

use relay_core::{InstanceProperties, PropertyProvider};

/// Handle returned when a provider is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderHandle(u64);

struct ProviderEntry {
    id: u64,
    rank: i32,
    names: Vec<String>,
    provider: Arc<dyn PropertyProvider>,
}

/// Ranked set of property providers.
///
/// When several providers supply the same property name, the provider with
/// the highest rank wins; on equal rank the earliest registration wins.
#[derive(Default)]
pub struct PropertyProviders {
    entries: Vec<ProviderEntry>,
    next_id: u64,
}

impl PropertyProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider advertising `names` at `rank`.
    pub fn add(
        &mut self,
        provider: Arc<dyn PropertyProvider>,
        rank: i32,
        names: Vec<String>,
    ) -> ProviderHandle {
        self.next_id += 1;
        self.entries.push(ProviderEntry {
            id: self.next_id,
            rank,
            names,
            provider,
        });
        ProviderHandle(self.next_id)
    }

    /// Change a provider's rank and advertised names.
    pub fn update(&mut self, handle: ProviderHandle, rank: i32, names: Vec<String>) -> bool {
        match self.entries.iter_mut().find(|e| e.id == handle.0) {
            Some(entry) => {
                entry.rank = rank;
                entry.names = names;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, handle: ProviderHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != handle.0);
        before != self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ask every provider for its names and merge the answers.
    pub fn collect(&self) -> InstanceProperties {
        let mut ordered: Vec<&ProviderEntry> = self.entries.iter().collect();
        // Later entries override earlier ones.
        ordered.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| b.id.cmp(&a.id)));

        let mut properties = InstanceProperties::new();
        for entry in ordered {
            for name in &entry.names {
                if let Some(value) = entry.provider.property(name) {
                    properties.insert(name.clone(), value);
                }
            }
        }
        properties
    }
}

/// Provider answering from a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticProperties(InstanceProperties);

impl StaticProperties {
    pub fn new(properties: InstanceProperties) -> Self {
        Self(properties)
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut properties = InstanceProperties::new();
        properties.insert(name.into(), value.into());
        Self(properties)
    }

    /// Names this provider knows.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl PropertyProvider for StaticProperties {
    fn property(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}
