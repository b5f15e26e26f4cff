//! Logging configuration and presets

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Level filter (e.g., "info", "debug,hatch_inject=trace")
    pub level: String,

    /// Output format
    pub format: Format,

    /// Output destination
    pub writer: WriterConfig,

    /// Display configuration
    pub display: DisplayConfig,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable with colors and indentation
    Pretty,
    /// Compact single-line output
    Compact,
    /// Structured JSON output
    Json,
}

/// Output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterConfig {
    /// Write to stderr
    #[default]
    Stderr,
    /// Write to stdout
    Stdout,
    /// Write through the test harness so output is captured per test
    Test,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show timestamps
    pub time: bool,
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show target module
    pub target: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Use ANSI colors
    pub colors: bool,
    /// Show span list in JSON
    pub span_list: bool,
    /// Flatten JSON events
    pub flatten: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            writer: WriterConfig::Stderr,
            display: DisplayConfig::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            time: true,
            source: cfg!(debug_assertions),
            target: true,
            thread_ids: false,
            colors: std::io::IsTerminal::is_terminal(&std::io::stderr()),
            span_list: true,
            flatten: true,
        }
    }
}

impl Format {
    /// Parse a format name, falling back to [`Format::Compact`].
    #[must_use]
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

impl DisplayConfig {
    fn parse_env(&mut self) {
        if let Ok(v) = std::env::var("HATCH_LOG_TIME") {
            self.time = flag(&v);
        }
        if let Ok(v) = std::env::var("HATCH_LOG_SOURCE") {
            self.source = flag(&v);
        }
        if let Ok(v) = std::env::var("HATCH_LOG_COLORS") {
            self.colors = flag(&v);
        }
    }
}

fn flag(v: &str) -> bool {
    v != "0" && v != "false"
}

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // HATCH_LOG wins over RUST_LOG
        if let Ok(level) = std::env::var("HATCH_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("HATCH_LOG_FORMAT") {
            config.format = Format::parse_lossy(&format);
        }

        config.display.parse_env();
        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration (captured by the test harness)
    ///
    /// `HATCH_LOG` or `RUST_LOG` still override the level.
    #[must_use]
    pub fn test() -> Self {
        let level = std::env::var("HATCH_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "debug".to_string());
        Self {
            level,
            format: Format::Compact,
            writer: WriterConfig::Test,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
        }
    }
}
