//! Dependency descriptors and producer identity

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::producer::Producer;

/// Identity of a producer: the address of its shared allocation.
///
/// Two descriptors built from clones of the same `Arc` share an identity,
/// and therefore a cache entry. Two separately allocated producers never do,
/// even if they behave identically.
///
/// An id is only meaningful while some `Arc` to the producer is alive: once
/// the allocation is freed its address can be handed to a new producer.
/// Holders that outlive the declarations keep the producer alongside the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProducerId(usize);

impl ProducerId {
    /// Identity of `producer`.
    #[must_use]
    pub fn of(producer: &Arc<dyn Producer>) -> Self {
        Self(Arc::as_ptr(producer).cast::<()>() as usize)
    }
}

/// Whether a descriptor's value is shared within an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Caching {
    /// Resolve once per invocation and reuse the value.
    #[default]
    PerInvocation,
    /// Invoke the producer every time the descriptor is resolved.
    Never,
}

/// Immutable description of one dependency parameter.
///
/// Built once at declaration time and shared by every invocation.
#[derive(Clone)]
pub struct Descriptor {
    producer: Arc<dyn Producer>,
    declared_param: Arc<str>,
    caching: Caching,
}

impl Descriptor {
    /// Describe `declared_param` as produced by `producer`.
    pub fn new(declared_param: impl Into<Arc<str>>, producer: Arc<dyn Producer>) -> Self {
        Self {
            producer,
            declared_param: declared_param.into(),
            caching: Caching::PerInvocation,
        }
    }

    /// Opt this descriptor out of the per-invocation cache.
    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.caching = Caching::Never;
        self
    }

    /// The producer as declared (possibly a forward reference).
    #[must_use]
    pub fn producer(&self) -> &Arc<dyn Producer> {
        &self.producer
    }

    /// The parameter name this descriptor was declared under.
    #[must_use]
    pub fn declared_param(&self) -> &str {
        &self.declared_param
    }

    pub(crate) fn declared_param_arc(&self) -> &Arc<str> {
        &self.declared_param
    }

    /// Caching policy.
    #[must_use]
    pub fn caching(&self) -> Caching {
        self.caching
    }

    /// Name of the declared producer.
    #[must_use]
    pub fn name(&self) -> &str {
        self.producer.signature().name()
    }

    /// Identity of the declared producer.
    #[must_use]
    pub fn id(&self) -> ProducerId {
        ProducerId::of(&self.producer)
    }

    /// Follow forward references to the producer that actually runs.
    ///
    /// # Errors
    /// [`Error::UnboundForward`] if a forward reference on the way is unbound,
    /// [`Error::CircularDependency`] if forward references point at each other.
    pub fn target(&self) -> Result<Arc<dyn Producer>> {
        let mut current = Arc::clone(&self.producer);
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        while current.is_forward() {
            let name = current.signature().name().to_string();
            if !seen.insert(ProducerId::of(&current)) {
                chain.push(name);
                return Err(Error::CircularDependency { chain });
            }
            chain.push(name.clone());
            current = current
                .delegate()
                .ok_or(Error::UnboundForward { name })?;
        }
        Ok(current)
    }

    /// Identity of the producer that actually runs, or of the declared one
    /// if forward references do not resolve.
    fn target_id(&self) -> ProducerId {
        self.target()
            .map_or_else(|_| self.id(), |target| ProducerId::of(&target))
    }
}

/// Descriptors compare by the identity of the producer that runs, not by
/// parameter name. A bound forward equals a direct descriptor of its target.
impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.target_id() == other.target_id()
    }
}

impl Eq for Descriptor {}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({})", self.name())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::producer::{self, Forward};
    use crate::signature::Signature;

    fn base() -> Arc<dyn Producer> {
        producer::from_fn(Signature::new("get_base_value"), |_| Ok::<_, Error>(10_u32))
    }

    #[test]
    fn identity_follows_the_producer_not_the_param() {
        let shared = base();
        let a = Descriptor::new("a", Arc::clone(&shared));
        let b = Descriptor::new("b", shared);
        let other = Descriptor::new("a", base());

        assert_eq!(a, b);
        assert_ne!(a, other);
        assert_eq!(a.declared_param(), "a");
        assert_eq!(b.declared_param(), "b");
    }

    #[test]
    fn renders_producer_name() {
        let descriptor = Descriptor::new("value", base());
        assert_eq!(format!("{descriptor:?}"), "Descriptor(get_base_value)");
        assert_eq!(descriptor.to_string(), "Descriptor(get_base_value)");
    }

    #[test]
    fn uncached_changes_policy_only() {
        let descriptor = Descriptor::new("value", base());
        let uncached = descriptor.clone().uncached();
        assert_eq!(descriptor.caching(), Caching::PerInvocation);
        assert_eq!(uncached.caching(), Caching::Never);
        assert_eq!(descriptor, uncached);
    }

    #[test]
    fn target_follows_bound_forward() {
        let real = base();
        let forward = Forward::new("later");
        assert!(forward.bind(Arc::clone(&real)).is_ok());
        let descriptor = Descriptor::new("value", forward);

        let target = descriptor.target().unwrap();
        assert_eq!(ProducerId::of(&target), ProducerId::of(&real));
    }

    #[test]
    fn bound_forward_equals_its_target() {
        let real = base();
        let forward = Forward::new("later");
        assert!(forward.bind(Arc::clone(&real)).is_ok());

        let through_forward = Descriptor::new("value", forward);
        let direct = Descriptor::new("value", real);
        assert_eq!(through_forward, direct);
        assert_ne!(through_forward.id(), direct.id());

        let unbound = Descriptor::new("value", Forward::new("never_bound"));
        assert_ne!(unbound, direct);
        assert_eq!(unbound, unbound.clone());
    }

    #[test]
    fn target_rejects_unbound_forward() {
        let descriptor = Descriptor::new("value", Forward::new("never_bound"));
        let Err(err) = descriptor.target() else {
            panic!("an unbound forward has no target");
        };
        assert!(matches!(err, Error::UnboundForward { ref name } if name == "never_bound"));
    }
}
