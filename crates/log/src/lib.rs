//! # Hatch Log
//!
//! Zero-config `tracing` setup for hatch binaries and tests.
//!
//! ```rust,no_run
//! fn main() -> hatch_log::Result<()> {
//!     let _guard = hatch_log::auto_init()?;
//!     tracing::info!(port = 8080, "Server starting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, WriterConfig};

/// Result type for logger operations
pub type Result<T> = anyhow::Result<T>;

/// Error type for logger operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The level filter could not be parsed
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The filter string as configured
        filter: String,
        /// Why parsing failed
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Auto-detect and initialize the best logging configuration
///
/// Environment configuration wins when `HATCH_LOG` or `RUST_LOG` is set;
/// otherwise debug builds get [`Config::development`] and release builds
/// [`Config::production`].
pub fn auto_init() -> Result<LoggerGuard> {
    if std::env::var("HATCH_LOG").is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> Result<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> Result<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests.
///
/// Output goes through the test harness capture. Safe to call from every
/// test; only the first call installs anything, and an already installed
/// subscriber is left alone.
pub fn init_test() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        if !tracing::dispatcher::has_been_set() {
            let _ = init_with(Config::test());
        }
    });
}
