//! Deferred teardown of two-phase producers
//!
//! A two-phase producer hands back a [`Cleanup`] together with its value.
//! The handler is pushed onto the invocation's [`CleanupStack`] and runs when
//! the invocation ends, whether the entry succeeded or failed. Handlers run
//! in reverse registration order, each in isolation: a failing or panicking
//! handler is recorded and the rest still run.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::BoxError;

/// Teardown for one produced value.
///
/// Nothing runs until the owning stack unwinds.
pub struct Cleanup {
    action: BoxFuture<'static, Result<(), BoxError>>,
}

impl Cleanup {
    /// Teardown that awaits `action`.
    pub fn new<F, E>(action: F) -> Self
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            action: action.map(|res| res.map_err(Into::into)).boxed(),
        }
    }

    /// Teardown that calls `action` synchronously.
    pub fn blocking<F, E>(action: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::new(async move { action() })
    }

    /// Teardown that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(futures::future::ready(Ok::<_, BoxError>(())))
    }

    async fn run(self) -> Result<(), BoxError> {
        match AssertUnwindSafe(self.action).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(panic_message(panic.as_ref()).into()),
        }
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cleanup")
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("cleanup panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("cleanup panicked: {msg}")
    } else {
        "cleanup panicked".to_string()
    }
}

struct Entry {
    producer: Arc<str>,
    param: Arc<str>,
    cleanup: Cleanup,
}

/// LIFO stack of pending teardowns for one invocation.
pub struct CleanupStack {
    entries: Vec<Entry>,
    detach_on_drop: bool,
}

impl CleanupStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            detach_on_drop: true,
        }
    }

    /// Whether handlers still pending at drop are spawned onto the current
    /// tokio runtime. When disabled, or when no runtime is available, they
    /// are dropped with a warning.
    #[must_use]
    pub fn with_detach_on_drop(mut self, detach: bool) -> Self {
        self.detach_on_drop = detach;
        self
    }

    /// Register the teardown for the value `producer` produced under `param`.
    pub fn push(&mut self, producer: Arc<str>, param: Arc<str>, cleanup: Cleanup) {
        tracing::trace!(
            producer = %producer,
            param = %param,
            depth = self.entries.len() + 1,
            "Cleanup registered"
        );
        self.entries.push(Entry {
            producer,
            param,
            cleanup,
        });
    }

    /// Number of pending handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every pending handler, most recently registered first.
    ///
    /// The stack is empty afterwards, so a second call is a no-op.
    ///
    /// # Errors
    /// A [`CleanupError`] listing every handler that failed or panicked.
    pub async fn unwind(&mut self) -> Result<(), CleanupError> {
        let mut failures = Vec::new();
        // Handlers not reached yet stay on the stack if this future is dropped.
        while let Some(Entry {
            producer,
            param,
            cleanup,
        }) = self.entries.pop()
        {
            match cleanup.run().await {
                Ok(()) => tracing::trace!(producer = %producer, "Cleanup finished"),
                Err(source) => {
                    tracing::warn!(
                        producer = %producer,
                        param = %param,
                        error = %source,
                        "Cleanup failed"
                    );
                    failures.push(CleanupFailure {
                        producer,
                        param,
                        source,
                    });
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CleanupError::new(failures))
        }
    }
}

impl Default for CleanupStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupStack")
            .field("pending", &self.entries.len())
            .field("detach_on_drop", &self.detach_on_drop)
            .finish()
    }
}

impl Drop for CleanupStack {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        let pending: Vec<String> = entries.iter().rev().map(|e| e.producer.to_string()).collect();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) if self.detach_on_drop => {
                tracing::debug!(?pending, "Scope dropped before unwinding, detaching cleanup");
                let mut detached = Self {
                    entries,
                    detach_on_drop: false,
                };
                drop(handle.spawn(async move {
                    if let Err(e) = detached.unwind().await {
                        tracing::warn!(error = %e, "Detached cleanup failed");
                    }
                }));
            }
            _ => {
                tracing::warn!(
                    ?pending,
                    "Scope dropped with pending cleanup handlers; they will not run"
                );
            }
        }
    }
}

/// One cleanup handler that failed.
#[derive(Debug)]
pub struct CleanupFailure {
    producer: Arc<str>,
    param: Arc<str>,
    source: BoxError,
}

impl CleanupFailure {
    /// Record that the teardown of `producer` (declared as `param`) failed.
    pub fn new(
        producer: impl Into<Arc<str>>,
        param: impl Into<Arc<str>>,
        source: BoxError,
    ) -> Self {
        Self {
            producer: producer.into(),
            param: param.into(),
            source,
        }
    }

    /// Name of the producer whose teardown failed.
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// Parameter the producer's value was declared under.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    /// The handler's error.
    #[must_use]
    pub fn source(&self) -> &BoxError {
        &self.source
    }
}

impl std::fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ('{}'): {}", self.producer, self.param, self.source)
    }
}

/// Every cleanup failure of one unwind, in the order the handlers ran.
#[derive(Debug, thiserror::Error)]
#[error("{} cleanup handler(s) failed: {}", failures.len(), render(failures))]
pub struct CleanupError {
    failures: Vec<CleanupFailure>,
}

fn render(failures: &[CleanupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CleanupError {
    /// Wrap a list of failures.
    #[must_use]
    pub fn new(failures: Vec<CleanupFailure>) -> Self {
        Self { failures }
    }

    /// The failures, in the order the handlers ran.
    #[must_use]
    pub fn failures(&self) -> &[CleanupFailure] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Cleanup {
        let log = Arc::clone(log);
        Cleanup::blocking(move || {
            log.lock().push(name);
            Ok::<_, BoxError>(())
        })
    }

    #[tokio::test]
    async fn unwinds_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        for name in ["first", "second", "third"] {
            stack.push(name.into(), name.into(), recording(&log, name));
        }
        assert_eq!(stack.len(), 3);
        stack.unwind().await.unwrap();
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = CleanupStack::new();
        stack.push("a".into(), "a".into(), recording(&log, "a"));
        stack.push(
            "b".into(),
            "b".into(),
            Cleanup::blocking(|| Err::<(), _>("disk full")),
        );
        stack.push(
            "c".into(),
            "c".into(),
            Cleanup::blocking(|| -> Result<(), BoxError> { panic!("lost connection") }),
        );

        let err = stack.unwind().await.unwrap_err();
        assert_eq!(*log.lock(), vec!["a"]);
        let producers: Vec<_> = err.failures().iter().map(CleanupFailure::producer).collect();
        assert_eq!(producers, vec!["c", "b"]);
        assert!(err.to_string().contains("disk full"));
        assert!(err.to_string().contains("lost connection"));
    }

    #[tokio::test]
    async fn second_unwind_is_a_noop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut stack = CleanupStack::new();
        stack.push(
            "p".into(),
            "p".into(),
            Cleanup::blocking(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }),
        );
        stack.unwind().await.unwrap();
        stack.unwind().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_detaches_pending_handlers() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut stack = CleanupStack::new();
            stack.push(
                "conn".into(),
                "conn".into(),
                Cleanup::blocking(move || {
                    let _ = tx.send(());
                    Ok::<_, BoxError>(())
                }),
            );
        }
        tokio::time::timeout(std::time::Duration::from_secs(1), rx)
            .await
            .expect("detached cleanup should run")
            .unwrap();
    }

    #[test]
    fn drop_without_runtime_does_not_panic() {
        let mut stack = CleanupStack::new();
        stack.push("conn".into(), "conn".into(), Cleanup::noop());
        drop(stack);
    }
}
