//! Invocation wrapper: one scope per call, cleanup on every exit path

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::cleanup::CleanupError;
use crate::config::Config;
use crate::error::{BoxError, Error, Result};
use crate::graph::DependencyGraph;
use crate::resolver;
use crate::scope::Scope;
use crate::signature::Signature;
use crate::value::{Args, Inputs};

/// Runs entry points with their dependencies resolved.
///
/// Holds configuration only. Every invocation builds its own resolution
/// scope, so one `Injector` can be cloned into any number of tasks and
/// invocations never observe each other's values.
#[derive(Debug, Clone, Default)]
pub struct Injector {
    config: Arc<Config>,
}

impl Injector {
    /// Injector with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Injector with an explicit configuration.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the dependencies of `entry`, run `body` with the complete
    /// argument set, then unwind the cleanup stack.
    ///
    /// # Errors
    /// Resolution errors, [`Error::Entry`] for a failing body, and cleanup
    /// failures as described on [`Completion::into_result`].
    pub async fn invoke<T, E, F, Fut>(
        &self,
        entry: &Signature,
        inputs: Inputs,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(Args) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        self.invoke_completion(entry, inputs, body).await.into_result()
    }

    /// Like [`invoke`](Self::invoke), but keeps the outcome of the entry and
    /// the cleanup failures apart.
    ///
    /// Cleanup runs whether resolution, the body, or neither failed, and
    /// also when the invocation is cancelled through [`Inputs::with_cancellation`].
    pub async fn invoke_completion<T, E, F, Fut>(
        &self,
        entry: &Signature,
        inputs: Inputs,
        body: F,
    ) -> Completion<T>
    where
        F: FnOnce(Args) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let (supplied, cancellation) = inputs.into_parts();
        let mut scope = Scope::new(&self.config, supplied);
        let span = tracing::debug_span!(
            "invoke",
            entry = %entry.name(),
            invocation_id = %scope.id()
        );

        async move {
            let result = {
                let invocation = run(&mut scope, entry, body);
                match cancellation {
                    Some(token) => tokio::select! {
                        biased;
                        () = token.cancelled() => {
                            tracing::debug!("Invocation cancelled");
                            Err(Error::Cancelled { entry: entry.name().to_string() })
                        }
                        result = invocation => result,
                    },
                    None => invocation.await,
                }
            };

            let cleanup = scope.unwind().await.err();
            if let Some(failed) = &cleanup {
                tracing::warn!(
                    failures = failed.failures().len(),
                    "Cleanup finished with failures"
                );
            }
            tracing::debug!(ok = result.is_ok(), "Invocation finished");
            Completion { result, cleanup }
        }
        .instrument(span)
        .await
    }

    /// Run an invocation to completion on a private current-thread runtime.
    ///
    /// For synchronous callers. Nothing is resolved when called from within
    /// a tokio runtime.
    ///
    /// # Errors
    /// [`Error::NestedRuntime`] inside a tokio runtime, [`Error::Runtime`] if
    /// the runtime cannot be started, otherwise as [`invoke`](Self::invoke).
    pub fn invoke_blocking<T, E, F, Fut>(
        &self,
        entry: &Signature,
        inputs: Inputs,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(Args) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::NestedRuntime {
                entry: entry.name().to_string(),
            });
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| Error::Runtime { source })?;
        runtime.block_on(self.invoke(entry, inputs, body))
    }

    /// Producer names in the order a cold invocation of `entry` with no
    /// caller inputs would first run them. Nothing is invoked.
    ///
    /// # Errors
    /// [`Error::CircularDependency`] or [`Error::UnboundForward`] if the
    /// declarations can never resolve.
    pub fn plan(&self, entry: &Signature) -> Result<Vec<String>> {
        DependencyGraph::from_signature(entry).map(|graph| graph.init_order())
    }
}

async fn run<T, E, F, Fut>(scope: &mut Scope, entry: &Signature, body: F) -> Result<T>
where
    F: FnOnce(Args) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<BoxError>,
{
    let args = resolver::prepare_entry(scope, entry).await?;
    tracing::debug!(args = args.len(), "Dependencies resolved");
    body(args).await.map_err(|source| Error::Entry {
        entry: entry.name().to_string(),
        source: source.into(),
    })
}

/// Outcome of one invocation: the entry result and any cleanup failures.
#[derive(Debug)]
#[must_use]
pub struct Completion<T> {
    /// Result of resolution and the entry body.
    pub result: Result<T>,
    /// Aggregated cleanup failures, if any handler failed.
    pub cleanup: Option<CleanupError>,
}

impl<T> Completion<T> {
    /// Whether every cleanup handler succeeded.
    #[must_use]
    pub fn cleanup_succeeded(&self) -> bool {
        self.cleanup.is_none()
    }

    /// Fold the cleanup outcome into the result.
    ///
    /// A clean success stays `Ok`. A success with failed cleanup becomes
    /// [`Error::Cleanup`]. A failure keeps its error, wrapped in
    /// [`Error::Unwound`] when cleanup failed too.
    pub fn into_result(self) -> Result<T> {
        match (self.result, self.cleanup) {
            (Ok(value), None) => Ok(value),
            (Ok(_), Some(cleanup)) => Err(Error::Cleanup(cleanup)),
            (Err(primary), None) => Err(primary),
            (Err(primary), Some(cleanup)) => Err(Error::Unwound {
                primary: Box::new(primary),
                cleanup,
            }),
        }
    }
}
