//! Error types for dependency resolution
use thiserror::Error;

use crate::cleanup::{CleanupError, CleanupFailure};

/// Result type for resolution operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by producers, entry bodies, and cleanup handlers.
///
/// Kept boxed rather than converted so callers can `downcast_ref` back to
/// their own error types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for everything an invocation can fail with
#[derive(Error, Debug)]
pub enum Error {
    /// A producer was reached again while it was still being resolved
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency {
        /// Producer names from the outermost in-progress producer to the
        /// one that closed the cycle
        chain: Vec<String>,
    },

    /// An implicit parameter was not found in the context
    #[error("Missing '{param}' for {producer}. Available: {available:?}")]
    MissingDependency {
        /// The parameter that could not be satisfied
        param: String,
        /// The producer (or entry) declaring the parameter
        producer: String,
        /// Names present in the context at the time of the lookup
        available: Vec<String>,
    },

    /// Strict ordering: an implicit parameter is produced by a dependency
    /// declared later on the entry signature
    #[error(
        "'{param}' needed by {producer} is declared later (position {declared_at}) on the entry; \
         declare it before the dependencies that use it"
    )]
    OutOfOrder {
        /// The parameter that was looked up too early
        param: String,
        /// The producer declaring the parameter
        producer: String,
        /// Position of the declaring parameter on the entry signature
        declared_at: usize,
    },

    /// A forward reference was resolved before being bound
    #[error("Forward reference '{name}' was never bound to a producer")]
    UnboundForward {
        /// The forward reference name
        name: String,
    },

    /// A producer raised an error
    #[error("Producer {producer} failed while resolving '{param}': {source}")]
    Producer {
        /// The producer name
        producer: String,
        /// The declared parameter the producer was resolving
        param: String,
        /// The error the producer raised
        #[source]
        source: BoxError,
    },

    /// The entry body raised an error
    #[error("Entry {entry} failed: {source}")]
    Entry {
        /// The entry name
        entry: String,
        /// The error the entry body raised
        #[source]
        source: BoxError,
    },

    /// An argument was requested with the wrong type
    #[error("Argument '{param}' of {owner} is not a {expected}")]
    TypeMismatch {
        /// The callable the arguments belong to
        owner: String,
        /// The argument name
        param: String,
        /// The requested type
        expected: &'static str,
    },

    /// An argument was requested that the callable does not declare
    #[error("{owner} has no argument '{param}'")]
    ArgumentNotFound {
        /// The callable the arguments belong to
        owner: String,
        /// The argument name
        param: String,
    },

    /// One or more cleanup handlers failed after a successful entry
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// The invocation failed and cleanup failed as well
    #[error("{primary}; additionally {cleanup}")]
    Unwound {
        /// The resolution or entry error
        #[source]
        primary: Box<Error>,
        /// The cleanup failures collected while unwinding
        cleanup: CleanupError,
    },

    /// The invocation was cancelled through its cancellation token
    #[error("Invocation of {entry} was cancelled")]
    Cancelled {
        /// The entry name
        entry: String,
    },

    /// A blocking invocation was attempted from inside a tokio runtime
    #[error("Cannot block on {entry} from within a tokio runtime; await invoke instead")]
    NestedRuntime {
        /// The entry name
        entry: String,
    },

    /// The blocking runtime could not be started
    #[error("Failed to start blocking runtime: {source}")]
    Runtime {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether this error comes from the shape of the dependency graph
    /// rather than from user code.
    ///
    /// Graph errors are always raised before the entry body runs.
    #[must_use]
    pub fn is_graph_error(&self) -> bool {
        match self {
            Self::CircularDependency { .. }
            | Self::MissingDependency { .. }
            | Self::OutOfOrder { .. }
            | Self::UnboundForward { .. } => true,
            Self::Unwound { primary, .. } => primary.is_graph_error(),
            _ => false,
        }
    }

    /// Get the producer name associated with this error (if any)
    #[must_use]
    pub fn producer(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { producer, .. }
            | Self::OutOfOrder { producer, .. }
            | Self::Producer { producer, .. } => Some(producer),
            Self::CircularDependency { chain } => chain.last().map(String::as_str),
            Self::Unwound { primary, .. } => primary.producer(),
            _ => None,
        }
    }

    /// Cleanup failures carried by this error, empty if there are none.
    #[must_use]
    pub fn cleanup_failures(&self) -> &[CleanupFailure] {
        match self {
            Self::Cleanup(cleanup) | Self::Unwound { cleanup, .. } => cleanup.failures(),
            _ => &[],
        }
    }

    /// The resolution or entry error, looking through [`Error::Unwound`].
    #[must_use]
    pub fn primary(&self) -> &Self {
        match self {
            Self::Unwound { primary, .. } => primary.primary(),
            other => other,
        }
    }
}
