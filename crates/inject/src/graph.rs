//! Static dependency graph for pre-flight checks
//!
//! Built from declarations alone, without invoking anything. Used to reject
//! cycles and unbound forward references up front and to report the order in
//! which a cold invocation would first run each producer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::descriptor::ProducerId;
use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::signature::Signature;

/// Dependency graph between producers, keyed by producer identity.
///
/// Edges keep declaration order, so traversals visit dependencies in the
/// same order resolution would.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// producer -> what it depends on, in declaration order
    dependencies: IndexMap<ProducerId, Vec<ProducerId>>,
    /// producer -> what depends on it
    dependents: HashMap<ProducerId, Vec<ProducerId>>,
    /// producer -> name, for diagnostics
    labels: HashMap<ProducerId, Arc<str>>,
    /// top-level dependencies of the signature the graph was built from
    roots: Vec<ProducerId>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph reachable from the dependency parameters of `entry`.
    ///
    /// # Errors
    /// [`Error::UnboundForward`] for a forward reference that was never
    /// bound, [`Error::CircularDependency`] if the declarations form a cycle.
    pub fn from_signature(entry: &Signature) -> Result<Self> {
        let mut graph = Self::new();
        let mut expanded = HashSet::new();
        for descriptor in entry.descriptors() {
            let producer = descriptor.target()?;
            let id = graph.add_node(&producer);
            if !graph.roots.contains(&id) {
                graph.roots.push(id);
            }
            graph.expand(&producer, &mut expanded)?;
        }
        Ok(graph)
    }

    fn expand(
        &mut self,
        producer: &Arc<dyn Producer>,
        expanded: &mut HashSet<ProducerId>,
    ) -> Result<()> {
        let id = ProducerId::of(producer);
        if !expanded.insert(id) {
            return Ok(());
        }
        for descriptor in producer.signature().descriptors() {
            let dependency = descriptor.target()?;
            let dep_id = self.add_node(&dependency);
            self.add_dependency(id, dep_id)?;
            self.expand(&dependency, expanded)?;
        }
        Ok(())
    }

    fn add_node(&mut self, producer: &Arc<dyn Producer>) -> ProducerId {
        let id = ProducerId::of(producer);
        self.labels
            .entry(id)
            .or_insert_with(|| Arc::clone(producer.signature().name_arc()));
        self.dependencies.entry(id).or_default();
        id
    }

    /// Add a dependency relationship: `producer` depends on `depends_on`
    ///
    /// # Errors
    /// Returns error if adding this dependency would create a cycle
    pub fn add_dependency(&mut self, producer: ProducerId, depends_on: ProducerId) -> Result<()> {
        if producer == depends_on {
            let name = self.label(producer);
            return Err(Error::CircularDependency {
                chain: vec![name.clone(), name],
            });
        }

        let deps = self.dependencies.entry(producer).or_default();
        if deps.contains(&depends_on) {
            return Ok(());
        }
        deps.push(depends_on);
        self.dependencies.entry(depends_on).or_default();
        self.dependents.entry(depends_on).or_default().push(producer);

        if let Some(cycle) = self.detect_cycle() {
            self.remove_dependency(producer, depends_on);
            return Err(Error::CircularDependency { chain: cycle });
        }

        Ok(())
    }

    fn remove_dependency(&mut self, producer: ProducerId, depends_on: ProducerId) {
        if let Some(deps) = self.dependencies.get_mut(&producer) {
            deps.retain(|d| *d != depends_on);
        }
        if let Some(deps) = self.dependents.get_mut(&depends_on) {
            deps.retain(|d| *d != producer);
        }
    }

    /// Name of a producer in the graph.
    #[must_use]
    pub fn label(&self, id: ProducerId) -> String {
        self.labels
            .get(&id)
            .map_or_else(|| format!("{id:?}"), ToString::to_string)
    }

    /// Direct dependencies of `producer`, in declaration order.
    #[must_use]
    pub fn get_dependencies(&self, producer: ProducerId) -> Vec<ProducerId> {
        self.dependencies.get(&producer).cloned().unwrap_or_default()
    }

    /// Producers that depend directly on `producer`.
    #[must_use]
    pub fn get_dependents(&self, producer: ProducerId) -> Vec<ProducerId> {
        self.dependents.get(&producer).cloned().unwrap_or_default()
    }

    /// Number of producers in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the graph has no producers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Detect if there's a cycle in the dependency graph
    ///
    /// # Returns
    /// `Some(chain)` of producer names, first name repeated at the end, if
    /// a cycle is detected
    #[must_use]
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_path = Vec::new();

        for &node in self.dependencies.keys() {
            if !visited.contains(&node)
                && let Some(cycle) = self.detect_cycle_dfs(node, &mut visited, &mut on_path)
            {
                return Some(cycle);
            }
        }

        None
    }

    fn detect_cycle_dfs(
        &self,
        node: ProducerId,
        visited: &mut HashSet<ProducerId>,
        on_path: &mut Vec<ProducerId>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        on_path.push(node);

        for &dep in self.dependencies.get(&node).into_iter().flatten() {
            if let Some(start) = on_path.iter().position(|p| *p == dep) {
                let mut chain: Vec<String> =
                    on_path[start..].iter().map(|id| self.label(*id)).collect();
                chain.push(self.label(dep));
                return Some(chain);
            }
            if !visited.contains(&dep)
                && let Some(cycle) = self.detect_cycle_dfs(dep, visited, on_path)
            {
                return Some(cycle);
            }
        }

        on_path.pop();
        None
    }

    /// Producer names in the order a cold invocation first runs them:
    /// dependencies before dependents, siblings in declaration order.
    #[must_use]
    pub fn init_order(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for &root in &self.roots {
            self.build_init_order(root, &mut visited, &mut order);
        }
        order.into_iter().map(|id| self.label(id)).collect()
    }

    fn build_init_order(
        &self,
        node: ProducerId,
        visited: &mut HashSet<ProducerId>,
        order: &mut Vec<ProducerId>,
    ) {
        if !visited.insert(node) {
            return;
        }
        for &dep in self.dependencies.get(&node).into_iter().flatten() {
            self.build_init_order(dep, visited, order);
        }
        order.push(node);
    }

    /// Get all transitive dependencies of a producer
    #[must_use]
    pub fn get_all_dependencies(&self, producer: ProducerId) -> HashSet<ProducerId> {
        let mut all_deps = HashSet::new();
        self.collect_dependencies(producer, &mut all_deps);
        all_deps
    }

    fn collect_dependencies(&self, producer: ProducerId, collected: &mut HashSet<ProducerId>) {
        for &dep in self.dependencies.get(&producer).into_iter().flatten() {
            if collected.insert(dep) {
                self.collect_dependencies(dep, collected);
            }
        }
    }

    /// Check if `producer` depends on `depends_on` (directly or transitively)
    #[must_use]
    pub fn depends_on(&self, producer: ProducerId, depends_on: ProducerId) -> bool {
        self.get_all_dependencies(producer).contains(&depends_on)
    }
}
