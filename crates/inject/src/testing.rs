//! Testing utilities for ordering assertions
//!
//! Enabled with the `testing` feature.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cleanup::Cleanup;
use crate::error::{BoxError, Error};
use crate::producer::{self, Producer};
use crate::signature::Signature;

/// Shared, ordered record of events such as producer runs and cleanups.
///
/// Clones append to the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn record(&self, event: impl Into<String>) {
        self.entries.lock().push(event.into());
    }

    /// All events so far, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// A producer named `name` without parameters that records `name` each
    /// time it runs and yields a clone of `out`.
    pub fn producer<T>(&self, name: &str, out: T) -> Arc<dyn Producer>
    where
        T: Any + Send + Sync + Clone,
    {
        self.producer_with(Signature::new(name), out)
    }

    /// Like [`producer`](Self::producer) with an explicit signature.
    pub fn producer_with<T>(&self, signature: Signature, out: T) -> Arc<dyn Producer>
    where
        T: Any + Send + Sync + Clone,
    {
        let log = self.clone();
        let name = signature.name().to_string();
        producer::from_fn(signature, move |_| {
            log.record(name.clone());
            Ok::<_, Error>(out.clone())
        })
    }

    /// A two-phase producer that records `name` when it runs and
    /// `"{name}:cleanup"` when its cleanup runs.
    pub fn scoped<T>(&self, signature: Signature, out: T) -> Arc<dyn Producer>
    where
        T: Any + Send + Sync + Clone,
    {
        let log = self.clone();
        let name = signature.name().to_string();
        producer::scoped(signature, move |_| {
            let log = log.clone();
            let name = name.clone();
            let out = out.clone();
            async move {
                log.record(name.clone());
                let cleanup = Cleanup::blocking(move || {
                    log.record(format!("{name}:cleanup"));
                    Ok::<_, BoxError>(())
                });
                Ok::<_, Error>((out, cleanup))
            }
        })
    }
}
