//! Resolution scope: everything one invocation owns

use std::sync::Arc;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::cache::Cache;
use crate::cleanup::{CleanupError, CleanupStack};
use crate::config::Config;
use crate::context::Context;
use crate::descriptor::ProducerId;
use crate::error::{Error, Result};
use crate::producer::Producer;
use crate::signature::Signature;
use crate::value::Value;

/// Context, cache, cleanup stack, and in-progress set of one invocation.
///
/// Created fresh for every invocation and never shared, so none of it needs
/// synchronisation.
pub(crate) struct Scope {
    id: Uuid,
    pub(crate) context: Context,
    pub(crate) cache: Cache,
    pub(crate) cleanup: CleanupStack,
    /// Producers currently being resolved, outermost first. Held so their
    /// ids stay unique while they are in progress.
    in_progress: IndexMap<ProducerId, Arc<dyn Producer>>,
    /// Values the caller passed in, by name.
    supplied: IndexMap<Arc<str>, Value>,
    /// Strict ordering: entry dependency parameters not reached yet, with
    /// their position on the entry signature.
    declared_later: IndexMap<Arc<str>, usize>,
    strict: bool,
}

impl Scope {
    pub(crate) fn new(config: &Config, supplied: IndexMap<Arc<str>, Value>) -> Self {
        let mut context = Context::new();
        context.seed(supplied.iter().map(|(k, v)| (Arc::clone(k), Arc::clone(v))));
        Self {
            id: Uuid::new_v4(),
            context,
            cache: Cache::new(),
            cleanup: CleanupStack::new().with_detach_on_drop(config.detach_cleanup_on_drop),
            in_progress: IndexMap::new(),
            supplied,
            declared_later: IndexMap::new(),
            strict: config.strict_ordering,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Mark `producer` as being resolved and return its id.
    ///
    /// Fails if it already is, with the chain of in-progress producers that
    /// led back to it.
    pub(crate) fn enter(&mut self, producer: &Arc<dyn Producer>) -> Result<ProducerId> {
        let id = ProducerId::of(producer);
        if self.in_progress.contains_key(&id) {
            let mut chain: Vec<String> = self.in_progress_names().map(str::to_string).collect();
            chain.push(producer.signature().name().to_string());
            return Err(Error::CircularDependency { chain });
        }
        self.in_progress.insert(id, Arc::clone(producer));
        Ok(id)
    }

    fn in_progress_names(&self) -> impl Iterator<Item = &str> {
        self.in_progress.values().map(|p| p.signature().name())
    }

    pub(crate) fn leave(&mut self, id: ProducerId) {
        self.in_progress.shift_remove(&id);
    }

    /// The value the caller supplied under `name`, if any.
    pub(crate) fn supplied(&self, name: &str) -> Option<Value> {
        self.supplied.get(name).map(Arc::clone)
    }

    /// Record which dependency parameters of `entry` come after `position`.
    ///
    /// Only tracked in strict mode; parameters the caller supplied are
    /// skipped since they are already in the context.
    pub(crate) fn enter_entry_param(&mut self, entry: &Signature, position: usize) {
        self.declared_later.clear();
        if !self.strict {
            return;
        }
        for (at, param) in entry.params().iter().enumerate().skip(position + 1) {
            if param.descriptor().is_some() && !self.supplied.contains_key(param.name()) {
                self.declared_later.insert(Arc::clone(param.name_arc()), at);
            }
        }
    }

    pub(crate) fn leave_entry_params(&mut self) {
        self.declared_later.clear();
    }

    /// Position of the later entry parameter that would have produced
    /// `name`. Always `None` outside strict mode.
    pub(crate) fn declared_later(&self, name: &str) -> Option<usize> {
        self.declared_later.get(name).copied()
    }

    pub(crate) async fn unwind(&mut self) -> std::result::Result<(), CleanupError> {
        self.cleanup.unwind().await
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("cache", &self.cache)
            .field("cleanup", &self.cleanup)
            .field("in_progress", &self.in_progress_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::producer;
    use crate::value::value;

    fn named(name: &'static str) -> Arc<dyn Producer> {
        producer::from_fn(Signature::new(name), |_| Ok::<_, Error>(()))
    }

    #[test]
    fn seeds_context_with_supplied_values() {
        let mut supplied = IndexMap::new();
        supplied.insert(Arc::from("tenant_name"), value("acme"));
        let scope = Scope::new(&Config::default(), supplied);
        assert!(scope.context.contains("tenant_name"));
        assert!(scope.supplied("tenant_name").is_some());
        assert!(scope.supplied("client").is_none());
    }

    #[test]
    fn reentry_reports_chain() {
        let mut scope = Scope::new(&Config::default(), IndexMap::new());
        let a = named("a");
        let b = named("b");
        let a_id = scope.enter(&a).unwrap();
        let b_id = scope.enter(&b).unwrap();
        assert_ne!(a_id, b_id);

        let err = scope.enter(&a).unwrap_err();
        assert!(
            matches!(err, Error::CircularDependency { ref chain } if chain == &["a", "b", "a"])
        );

        scope.leave(b_id);
        scope.leave(a_id);
        assert!(scope.enter(&a).is_ok());
    }

    #[test]
    fn in_progress_producers_keep_distinct_ids() {
        let mut scope = Scope::new(&Config::default(), IndexMap::new());
        let first = scope.enter(&named("first")).unwrap();
        // The first producer's only handle was a temporary; the scope holds it.
        let second = scope.enter(&named("second")).unwrap();
        assert_ne!(first, second);
        scope.leave(second);
        scope.leave(first);
    }

    #[test]
    fn declared_later_only_in_strict_mode() {
        let p = producer::from_fn(Signature::new("p"), |_| Ok::<_, Error>(()));
        let q = producer::from_fn(Signature::new("q"), |_| Ok::<_, Error>(()));
        let entry = Signature::new("entry").inject("first", p).arg("plain").inject("second", q);

        let mut lenient = Scope::new(&Config::default(), IndexMap::new());
        lenient.enter_entry_param(&entry, 0);
        assert_eq!(lenient.declared_later("second"), None);

        let mut strict = Scope::new(&Config::strict(), IndexMap::new());
        strict.enter_entry_param(&entry, 0);
        assert_eq!(strict.declared_later("second"), Some(2));
        assert_eq!(strict.declared_later("plain"), None);
        strict.enter_entry_param(&entry, 2);
        assert_eq!(strict.declared_later("second"), None);
    }
}
