//! Per-invocation name → value context

use std::sync::Arc;

use indexmap::IndexMap;

use crate::value::Value;

/// Values known by parameter name during one invocation.
///
/// Seeded with the caller's inputs, then extended every time a dependency
/// resolves, under the name it was declared with. Producers whose parameters
/// carry no descriptor are satisfied from here. Entries are kept in the order
/// they were added and are never removed.
#[derive(Clone, Default)]
pub struct Context {
    values: IndexMap<Arc<str>, Value>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every seed value, in order.
    pub fn seed(&mut self, values: impl IntoIterator<Item = (Arc<str>, Value)>) {
        for (name, value) in values {
            self.set(name, value);
        }
    }

    /// Look up a value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Bind `name` to `value`. A repeated name keeps its position and takes
    /// the new value.
    pub fn set(&mut self, name: Arc<str>, value: Value) {
        self.values.insert(name, value);
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bound names in the order they were first added.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.values.keys().map(ToString::to_string).collect()
    }

    /// Number of bound names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
