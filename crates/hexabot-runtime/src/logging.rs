//! Tracing subscriber setup.
//!
//! ```rust,ignore
//! // From configuration
//! logging::init_from_config(&config.logging);
//!
//! // By hand
//! LoggingBuilder::new()
//!     .with_level(Level::DEBUG)
//!     .directive("hexabot_framework=trace")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level; directives are
//! added on top.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Span lifecycle events to log. Useful to follow a turn through the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Creation and close only.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Initializes logging from configuration. A second call is a no-op.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    directives: Vec<String>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    max_files: usize,
    with_target: bool,
    with_thread_ids: bool,
    with_file_location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            level: Level::INFO,
            directives: Vec::new(),
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: 5,
            with_target: true,
            with_thread_ids: false,
            with_file_location: false,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new()
            .with_level(config.level.to_tracing_level())
            .format(config.format)
            .output(config.output)
            .span_events(SpanEvents::from(&config.span_events))
            .with_thread_ids(config.thread_ids)
            .with_file_location(config.file_location);
        builder.file_path.clone_from(&config.file_path);
        builder.rotation = config.rotation;
        builder.max_files = config.max_files;

        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));
        for (target, level) in filters {
            builder = builder.directive(&format!("{target}={level}"));
        }
        builder
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Adds an `EnvFilter` directive such as `hexabot_framework=debug`.
    pub fn directive(mut self, directive: &str) -> Self {
        self.directives.push(directive.to_string());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn with_file_location(mut self, enabled: bool) -> Self {
        self.with_file_location = enabled;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let base = self.level.to_string().to_lowercase();
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&base));
        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(err) => eprintln!("Ignoring invalid log directive {directive:?}: {err}"),
            }
        }
        filter
    }

    fn build_writer(&self) -> BoxMakeWriter {
        match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => match self.file_appender() {
                Some(appender) => BoxMakeWriter::new(appender),
                None => BoxMakeWriter::new(std::io::stderr),
            },
        }
    }

    /// Opens the rolling file appender; `None` falls back to stderr.
    fn file_appender(&self) -> Option<RollingFileAppender> {
        let Some(path) = &self.file_path else {
            eprintln!("File logging requested without a file path, logging to stderr");
            return None;
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().unwrap_or_else(|| OsStr::new("hexabot.log"));

        let rotation = match self.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };

        RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(file_name.to_string_lossy().into_owned())
            .max_log_files(self.max_files.max(1))
            .build(dir)
            .map_err(|err| eprintln!("Unable to open log file {}: {err}", path.display()))
            .ok()
    }

    fn build_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let writer = self.build_writer();
        let span_events = self.span_events.to_fmt_span();
        let base = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(self.with_target)
            .with_thread_ids(self.with_thread_ids)
            .with_file(self.with_file_location)
            .with_line_number(self.with_file_location);

        match self.format {
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Full => base.boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => base.json().boxed(),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("JSON logging needs the `json-log` feature, using the full format");
                base.boxed()
            }
        }
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the global subscriber; fails if one is already set.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        tracing_subscriber::registry()
            .with(self.build_layer())
            .with(filter)
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, SpanEventConfig};
    use std::collections::HashMap;

    #[test]
    fn test_span_event_flags() {
        assert_eq!(SpanEvents::NONE.to_fmt_span(), FmtSpan::NONE);
        assert_eq!(
            SpanEvents::LIFECYCLE.to_fmt_span(),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(SpanEvents::FULL.to_fmt_span(), FmtSpan::FULL);
    }

    #[test]
    fn test_from_config() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            filters: HashMap::from([
                ("hexabot_runtime".to_string(), LogLevel::Trace),
                ("hexabot_core".to_string(), LogLevel::Warn),
            ]),
            span_events: SpanEventConfig {
                new: true,
                close: true,
                ..SpanEventConfig::default()
            },
            ..LoggingConfig::default()
        };

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Pretty);
        assert_eq!(builder.span_events, SpanEvents::LIFECYCLE);
        assert_eq!(
            builder.directives,
            vec![
                "hexabot_core=warn".to_string(),
                "hexabot_runtime=trace".to_string()
            ]
        );
    }

    #[test]
    fn test_second_init_is_rejected() {
        let _ = LoggingBuilder::new().output(LogOutput::Stderr).try_init();
        assert!(LoggingBuilder::new().try_init().is_err());
    }
}
