//! Injector configuration

use serde::{Deserialize, Serialize};

/// Behaviour switches shared by every invocation of an [`Injector`](crate::Injector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Report an implicit parameter that a later entry dependency would have
    /// produced as [`Error::OutOfOrder`](crate::Error::OutOfOrder) instead of
    /// a plain missing dependency. Resolution order is never changed.
    pub strict_ordering: bool,

    /// Spawn cleanup handlers still pending when an invocation future is
    /// dropped onto the current tokio runtime.
    pub detach_cleanup_on_drop: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_ordering: false,
            detach_cleanup_on_drop: true,
        }
    }
}

impl Config {
    /// Default configuration with strict ordering diagnostics.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_ordering: true,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(strict) = env_flag("HATCH_STRICT_ORDERING") {
            config.strict_ordering = strict;
        }
        if let Some(detach) = env_flag("HATCH_DETACH_CLEANUP") {
            config.detach_cleanup_on_drop = detach;
        }

        config
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_flag(&v))
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
