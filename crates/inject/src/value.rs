//! Dynamically typed values, caller inputs, and resolved argument sets

use std::any::{Any, type_name};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A resolved value. Shared, immutable, and downcast on use.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value.
pub fn value<T: Any + Send + Sync>(value: T) -> Value {
    Arc::new(value)
}

/// Arguments supplied by the caller of an invocation.
///
/// Inputs seed the invocation's context, so producers can consume them by
/// name. An input whose name matches a dependency parameter of the entry
/// replaces that dependency entirely.
#[derive(Clone, Default)]
pub struct Inputs {
    values: IndexMap<Arc<str>, Value>,
    cancellation: Option<CancellationToken>,
}

impl Inputs {
    /// Create an empty set of inputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named input.
    pub fn with<T: Any + Send + Sync>(self, name: impl Into<Arc<str>>, input: T) -> Self {
        self.with_value(name, value(input))
    }

    /// Add a named input that is already a [`Value`].
    pub fn with_value(mut self, name: impl Into<Arc<str>>, input: Value) -> Self {
        self.values.insert(name.into(), input);
        self
    }

    /// Abort the invocation when `token` is cancelled.
    ///
    /// Cleanup handlers registered before cancellation still run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Whether an input with this name was supplied.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The cancellation token, if one was attached.
    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn into_parts(self) -> (IndexMap<Arc<str>, Value>, Option<CancellationToken>) {
        (self.values, self.cancellation)
    }
}

impl std::fmt::Debug for Inputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inputs")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// The completed argument set handed to a producer or an entry body.
///
/// Holds exactly the parameters its owner declares, in declaration order.
#[derive(Clone)]
pub struct Args {
    owner: Arc<str>,
    values: IndexMap<Arc<str>, Value>,
}

impl Args {
    pub(crate) fn new(owner: Arc<str>, values: IndexMap<Arc<str>, Value>) -> Self {
        Self { owner, values }
    }

    /// Get an argument as a shared reference to `T`.
    ///
    /// # Errors
    /// [`Error::ArgumentNotFound`] if the owner declares no such parameter,
    /// [`Error::TypeMismatch`] if the value is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let raw = self.raw(name).ok_or_else(|| Error::ArgumentNotFound {
            owner: self.owner.to_string(),
            param: name.to_string(),
        })?;
        Arc::clone(raw)
            .downcast::<T>()
            .map_err(|_| Error::TypeMismatch {
                owner: self.owner.to_string(),
                param: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Get an owned copy of an argument.
    pub fn cloned<T: Any + Send + Sync + Clone>(&self, name: &str) -> Result<T> {
        self.get::<T>(name).map(|arg| T::clone(&arg))
    }

    /// Get the untyped value of an argument.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Name of the producer or entry these arguments belong to.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Argument names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(AsRef::as_ref)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("owner", &self.owner)
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
