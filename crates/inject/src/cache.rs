//! Per-invocation cache of resolved values

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::ProducerId;
use crate::producer::Producer;
use crate::value::Value;

/// Resolved values keyed by producer identity.
///
/// Lives inside one resolution scope and is dropped with it. Nothing is
/// shared between invocations, not even for the same producer. Each entry
/// holds its producer, so a cached id cannot be reused by another
/// allocation while the cache is alive.
#[derive(Clone, Default)]
pub struct Cache {
    entries: HashMap<ProducerId, (Arc<dyn Producer>, Value)>,
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a value is cached for `id`.
    #[must_use]
    pub fn has(&self, id: ProducerId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The cached value for `id`.
    #[must_use]
    pub fn get(&self, id: ProducerId) -> Option<Value> {
        self.entries.get(&id).map(|(_, value)| Arc::clone(value))
    }

    /// Cache `value` as produced by `producer`.
    pub fn put(&mut self, producer: &Arc<dyn Producer>, value: Value) {
        self.entries
            .insert(ProducerId::of(producer), (Arc::clone(producer), value));
    }

    /// Number of cached producers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").field("len", &self.entries.len()).finish()
    }
}
