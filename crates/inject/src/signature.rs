//! Parameter declarations for entries and producers
//!
//! A [`Signature`] is the ordered parameter list of a callable, reduced to
//! what resolution needs: each parameter's name, the [`Descriptor`] it is
//! produced by (if any), and its default value (if any). Declaration order
//! is resolution order.

use std::any::Any;
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::producer::Producer;
use crate::value::{Value, value};

/// One declared parameter.
#[derive(Clone)]
pub struct Param {
    name: Arc<str>,
    descriptor: Option<Descriptor>,
    default: Option<Value>,
}

impl Param {
    /// A parameter satisfied from the context by name.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            descriptor: None,
            default: None,
        }
    }

    /// A parameter produced by `producer`.
    pub fn injected(name: impl Into<Arc<str>>, producer: Arc<dyn Producer>) -> Self {
        let name = name.into();
        Self {
            descriptor: Some(Descriptor::new(Arc::clone(&name), producer)),
            name,
            default: None,
        }
    }

    /// A parameter produced by an explicit descriptor.
    pub fn with_descriptor(descriptor: Descriptor) -> Self {
        Self {
            name: Arc::clone(descriptor.declared_param_arc()),
            descriptor: Some(descriptor),
            default: None,
        }
    }

    /// Fall back to `default` when the name is not in the context.
    #[must_use]
    pub fn with_default<T: Any + Send + Sync>(mut self, default: T) -> Self {
        self.default = Some(value(default));
        self
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// The descriptor this parameter is produced by, if any.
    #[must_use]
    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    /// The declared default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Ordered parameter list of a named callable.
#[derive(Debug, Clone)]
pub struct Signature {
    name: Arc<str>,
    params: Vec<Param>,
}

impl Signature {
    /// Start a signature with no parameters.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter.
    ///
    /// # Panics
    /// Panics if a parameter with the same name is already declared.
    #[must_use]
    pub fn push(mut self, param: Param) -> Self {
        assert!(
            self.param(param.name()).is_none(),
            "parameter '{}' declared twice on {}",
            param.name(),
            self.name
        );
        self.params.push(param);
        self
    }

    /// Append a parameter satisfied from the context by name.
    #[must_use]
    pub fn arg(self, name: impl Into<Arc<str>>) -> Self {
        self.push(Param::named(name))
    }

    /// Append a parameter with a default used when the context lacks it.
    #[must_use]
    pub fn arg_or<T: Any + Send + Sync>(self, name: impl Into<Arc<str>>, default: T) -> Self {
        self.push(Param::named(name).with_default(default))
    }

    /// Append a parameter produced by `producer`.
    #[must_use]
    pub fn inject(self, name: impl Into<Arc<str>>, producer: Arc<dyn Producer>) -> Self {
        self.push(Param::injected(name, producer))
    }

    /// Append a parameter produced by `producer` on every resolution.
    #[must_use]
    pub fn inject_uncached(self, name: impl Into<Arc<str>>, producer: Arc<dyn Producer>) -> Self {
        self.push(Param::with_descriptor(Descriptor::new(name, producer).uncached()))
    }

    /// Callable name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Look up a parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name() == name)
    }

    /// Dependency parameters in declaration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.params.iter().filter_map(Param::descriptor)
    }
}
