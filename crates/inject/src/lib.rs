//! # Hatch Inject
//!
//! Per-invocation dependency resolution for async Rust.
//!
//! An entry point declares its parameters as a [`Signature`]. Parameters that
//! carry a [`Descriptor`] are produced by a [`Producer`], whose own parameters
//! are resolved the same way, depth first and strictly in declaration order.
//! Within one invocation every producer runs at most once; two-phase producers
//! register a [`Cleanup`] that runs, last in first out, when the invocation
//! ends.
//!
//! ```rust
//! use hatch_inject::{producer, Injector, Inputs, Signature};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hatch_inject::Result<()> {
//! let base = producer::from_fn(Signature::new("base"), |_| Ok::<_, hatch_inject::Error>(10_u32));
//! let doubled = producer::from_fn(
//!     Signature::new("doubled").inject("base", base),
//!     |args| Ok::<_, hatch_inject::Error>(*args.get::<u32>("base")? * 2),
//! );
//!
//! let entry = Signature::new("handler").inject("value", doubled);
//! let out = Injector::new()
//!     .invoke(&entry, Inputs::new(), |args| async move {
//!         Ok::<_, hatch_inject::Error>(*args.get::<u32>("value")? + 5)
//!     })
//!     .await?;
//! assert_eq!(out, 25);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod injector;
pub mod producer;
pub mod signature;
pub mod value;

mod resolver;
mod scope;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::Cache;
pub use cleanup::{Cleanup, CleanupError, CleanupFailure, CleanupStack};
pub use config::Config;
pub use context::Context;
pub use descriptor::{Caching, Descriptor, ProducerId};
pub use error::{BoxError, Error, Result};
pub use graph::DependencyGraph;
pub use injector::{Completion, Injector};
pub use producer::{Forward, Produced, Producer};
pub use signature::{Param, Signature};
pub use value::{Args, Inputs, Value};
