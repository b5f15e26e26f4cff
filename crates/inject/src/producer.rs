//! Producers: the callables that manufacture dependency values
//!
//! A producer declares its own parameters as a [`Signature`] and turns the
//! resolved [`Args`] into a [`Produced`] value. Two-phase producers hand back
//! a [`Cleanup`] alongside the value; the engine runs it when the invocation
//! ends rather than immediately.
//!
//! Closures are adapted with [`from_fn`], [`from_async`], and [`scoped`].
//! Producers that carry their own configuration are ordinary structs that
//! implement [`Producer`].

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt};

use crate::cleanup::Cleanup;
use crate::error::{BoxError, Error};
use crate::signature::Signature;
use crate::value::{Args, Value, value};

/// Outcome of [`Producer::produce`].
pub type ProduceResult = Result<Produced, BoxError>;

/// What a producer hands back for one resolution.
pub enum Produced {
    /// A plain value.
    Value(Value),
    /// A value plus the teardown to run when the invocation ends.
    Scoped {
        /// The resolved value.
        value: Value,
        /// Deferred teardown.
        cleanup: Cleanup,
    },
}

impl Produced {
    /// Wrap a plain value.
    pub fn value<T: Any + Send + Sync>(produced: T) -> Self {
        Self::Value(value(produced))
    }

    /// Wrap a value that needs teardown.
    pub fn scoped<T: Any + Send + Sync>(produced: T, cleanup: Cleanup) -> Self {
        Self::Scoped {
            value: value(produced),
            cleanup,
        }
    }
}

impl std::fmt::Debug for Produced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Produced::Value"),
            Self::Scoped { .. } => f.write_str("Produced::Scoped"),
        }
    }
}

/// A dependency-producing callable.
pub trait Producer: Send + Sync + 'static {
    /// Name and parameters of this producer.
    fn signature(&self) -> &Signature;

    /// Produce a value from resolved arguments.
    fn produce(&self, args: Args) -> BoxFuture<'_, ProduceResult>;

    /// Whether this producer only stands in for another one.
    fn is_forward(&self) -> bool {
        false
    }

    /// The producer this one stands in for, once known.
    fn delegate(&self) -> Option<Arc<dyn Producer>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

struct FnProducer<F, T, E> {
    signature: Signature,
    f: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, T, E> Producer for FnProducer<F, T, E>
where
    F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn produce(&self, args: Args) -> BoxFuture<'_, ProduceResult> {
        let produced: ProduceResult = (self.f)(args).map(Produced::value).map_err(Into::into);
        futures::future::ready(produced).boxed()
    }
}

/// Adapt a synchronous closure.
pub fn from_fn<F, T, E>(signature: Signature, f: F) -> Arc<dyn Producer>
where
    F: Fn(Args) -> Result<T, E> + Send + Sync + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    Arc::new(FnProducer {
        signature,
        f,
        _marker: PhantomData,
    })
}

struct AsyncProducer<F, T, E> {
    signature: Signature,
    f: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, Fut, T, E> Producer for AsyncProducer<F, T, E>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn produce(&self, args: Args) -> BoxFuture<'_, ProduceResult> {
        (self.f)(args)
            .map(|produced| -> ProduceResult { produced.map(Produced::value).map_err(Into::into) })
            .boxed()
    }
}

/// Adapt a suspending closure.
pub fn from_async<F, Fut, T, E>(signature: Signature, f: F) -> Arc<dyn Producer>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    Arc::new(AsyncProducer {
        signature,
        f,
        _marker: PhantomData,
    })
}

struct ScopedProducer<F, T, E> {
    signature: Signature,
    f: F,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<F, Fut, T, E> Producer for ScopedProducer<F, T, E>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(T, Cleanup), E>> + Send + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn produce(&self, args: Args) -> BoxFuture<'_, ProduceResult> {
        (self.f)(args)
            .map(|produced| -> ProduceResult {
                produced
                    .map(|(value, cleanup)| Produced::scoped(value, cleanup))
                    .map_err(Into::into)
            })
            .boxed()
    }
}

/// Adapt a two-phase closure that returns its value together with the
/// [`Cleanup`] to run once the invocation is over.
pub fn scoped<F, Fut, T, E>(signature: Signature, f: F) -> Arc<dyn Producer>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(T, Cleanup), E>> + Send + 'static,
    T: Any + Send + Sync,
    E: Into<BoxError> + 'static,
{
    Arc::new(ScopedProducer {
        signature,
        f,
        _marker: PhantomData,
    })
}

struct Constant {
    signature: Signature,
    value: Value,
}

impl Producer for Constant {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn produce(&self, _args: Args) -> BoxFuture<'_, ProduceResult> {
        futures::future::ready(Ok::<_, BoxError>(Produced::Value(Arc::clone(&self.value)))).boxed()
    }
}

/// A producer that always yields the same value.
pub fn constant<T: Any + Send + Sync>(name: impl Into<Arc<str>>, constant: T) -> Arc<dyn Producer> {
    Arc::new(Constant {
        signature: Signature::new(name),
        value: value(constant),
    })
}

// ---------------------------------------------------------------------------
// Forward
// ---------------------------------------------------------------------------

/// A named placeholder for a producer that is declared later.
///
/// Declarations are immutable, so a producer cannot name a dependent that
/// does not exist yet. A `Forward` can be declared first and bound once the
/// real producer exists; resolution goes straight through it, and identity,
/// caching, and cycle detection all use the bound producer.
pub struct Forward {
    signature: Signature,
    target: OnceLock<Arc<dyn Producer>>,
}

impl Forward {
    /// Create an unbound forward reference.
    pub fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            signature: Signature::new(name),
            target: OnceLock::new(),
        })
    }

    /// Bind the forward reference to its producer.
    ///
    /// # Errors
    /// Hands `target` back if the reference is already bound.
    pub fn bind(&self, target: Arc<dyn Producer>) -> Result<(), Arc<dyn Producer>> {
        self.target.set(target)
    }

    /// Whether [`bind`](Self::bind) has been called.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }
}

impl Producer for Forward {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn produce(&self, _args: Args) -> BoxFuture<'_, ProduceResult> {
        let unbound: BoxError = Box::new(Error::UnboundForward {
            name: self.signature.name().to_string(),
        });
        futures::future::ready(Err::<Produced, _>(unbound)).boxed()
    }

    fn is_forward(&self) -> bool {
        true
    }

    fn delegate(&self) -> Option<Arc<dyn Producer>> {
        self.target.get().cloned()
    }
}

impl std::fmt::Debug for Forward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forward")
            .field("name", &self.signature.name())
            .field("bound", &self.is_bound())
            .finish()
    }
}
