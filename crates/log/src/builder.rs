//! Logger builder implementation

use tracing::Subscriber;
use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

use crate::config::{Config, DisplayConfig, Format, WriterConfig};
use crate::{Error, Result};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful initialization.
///
/// The subscriber is global and stays installed for the life of the
/// process; the guard only records whether this call installed it.
#[derive(Debug)]
#[must_use]
pub struct LoggerGuard {
    installed: bool,
}

impl LoggerGuard {
    /// A guard for a call that installed nothing.
    pub fn noop() -> Self {
        Self { installed: false }
    }

    /// Whether this guard's call installed the global subscriber.
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> Result<LoggerGuard> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|e| Error::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })?;

        Registry::default()
            .with(filter)
            .with(fmt_layer(&self.config))
            .try_init()
            .map_err(|e| Error::Init(e.to_string()))?;

        Ok(LoggerGuard { installed: true })
    }
}

fn make_writer(writer: WriterConfig) -> BoxMakeWriter {
    match writer {
        WriterConfig::Stderr => BoxMakeWriter::new(std::io::stderr),
        WriterConfig::Stdout => BoxMakeWriter::new(std::io::stdout),
        WriterConfig::Test => BoxMakeWriter::new(TestWriter::default()),
    }
}

fn fmt_layer<S>(config: &Config) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let DisplayConfig {
        time,
        source,
        target,
        thread_ids,
        colors,
        span_list,
        flatten,
    } = config.display;

    let base = tracing_subscriber::fmt::layer()
        .with_writer(make_writer(config.writer))
        .with_ansi(colors)
        .with_target(target)
        .with_file(source)
        .with_line_number(source)
        .with_thread_ids(thread_ids);

    match (config.format, time) {
        (Format::Pretty, true) => base.pretty().boxed(),
        (Format::Pretty, false) => base.pretty().without_time().boxed(),
        (Format::Compact, true) => base.compact().boxed(),
        (Format::Compact, false) => base.compact().without_time().boxed(),
        (Format::Json, true) => base
            .json()
            .with_current_span(true)
            .with_span_list(span_list)
            .flatten_event(flatten)
            .boxed(),
        (Format::Json, false) => base
            .json()
            .with_current_span(true)
            .with_span_list(span_list)
            .flatten_event(flatten)
            .without_time()
            .boxed(),
    }
}
