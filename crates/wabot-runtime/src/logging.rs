//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! The runtime calls [`init_from_config`] with the `[logging]` section during
//! [`RuntimeBuilder::build`](crate::RuntimeBuilder::build). Embedders that
//! skip the runtime's logging can install their own subscriber, or use the
//! builder directly:
//!
//! ```rust,ignore
//! use wabot_runtime::config::SpanEventConfig;
//! use wabot_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::new()
//!     .directive("wabot_framework=debug")
//!     .span_events(SpanEventConfig::LIFECYCLE)
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level; per-module
//! directives are added on top either way.

use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

impl SpanEventConfig {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Span creation and close. Shows each `connection` attempt and each
    /// `dispatch` as a bracketed pair.
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
        .fold(FmtSpan::NONE, |acc, (_, span)| acc | span)
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builds a subscriber on top of a [`LoggingConfig`].
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    directives: Vec<String>,
    with_target: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::from_config(&LoggingConfig::default())
    }

    /// Starts from a config section; its `filters` become directives.
    pub fn from_config(config: &LoggingConfig) -> Self {
        // Sorted so the resulting filter does not depend on map order.
        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));

        Self {
            directives: filters
                .into_iter()
                .map(|(target, level)| format!("{target}={level}"))
                .collect(),
            config: config.clone(),
            with_target: true,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Adds a filter directive such as `wabot_runtime=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: SpanEventConfig) -> Self {
        self.config.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Writes to a rolling file at `path` instead of a standard stream.
    pub fn file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.into());
        self.config.rotation = rotation;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));

        for directive in &self.directives {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => warn!(directive = %directive, error = %e, "Ignoring invalid log directive"),
            }
        }

        filter
    }

    fn file_appender(&self, path: &Path) -> Option<RollingFileAppender> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("wabot");

        let mut builder = RollingFileAppender::builder()
            .rotation(self.config.rotation.into())
            .filename_prefix(stem);
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            builder = builder.filename_suffix(ext);
        }
        if self.config.max_files > 0 {
            builder = builder.max_log_files(self.config.max_files);
        }

        match builder.build(dir) {
            Ok(appender) => Some(appender),
            Err(e) => {
                // No subscriber is installed yet.
                eprintln!("wabot: cannot open log file {}: {e}", path.display());
                None
            }
        }
    }

    /// Installs the subscriber, ignoring failure.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let filter = self.build_filter();
        let spans = self.config.span_events.to_fmt_span();
        let location = self.config.file_location;

        macro_rules! install {
            ($writer:expr) => {{
                let layer = fmt::layer()
                    .with_span_events(spans.clone())
                    .with_target(self.with_target)
                    .with_thread_ids(self.config.thread_ids)
                    .with_file(location)
                    .with_line_number(location)
                    .with_writer($writer);
                let registry = tracing_subscriber::registry().with(filter);
                match self.config.format {
                    #[cfg(feature = "json-log")]
                    LogFormat::Json => registry.with(layer.json()).try_init(),
                    #[cfg(not(feature = "json-log"))]
                    LogFormat::Json => registry.with(layer.compact()).try_init(),
                    LogFormat::Compact => registry.with(layer.compact()).try_init(),
                    LogFormat::Full => registry.with(layer).try_init(),
                    LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
                }
            }};
        }

        match self.config.output {
            LogOutput::Stdout => install!(std::io::stdout),
            LogOutput::Stderr => install!(std::io::stderr),
            LogOutput::File => {
                match self.config.file_path.as_deref().and_then(|p| self.file_appender(p)) {
                    Some(appender) => install!(appender),
                    None => {
                        let result = install!(std::io::stdout);
                        warn!("File output unavailable, logging to stdout");
                        result
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            file_location: true,
            ..Default::default()
        };
        config.filters.insert("wabot_runtime".into(), LogLevel::Trace);
        config.filters.insert("reqwest".into(), LogLevel::Warn);
        config.span_events.close = true;

        let builder = LoggingBuilder::from_config(&config).directive("hyper=off");
        assert_eq!(builder.config.level.as_str(), "debug");
        assert_eq!(
            builder.directives,
            ["reqwest=warn", "wabot_runtime=trace", "hyper=off"]
        );
        assert_eq!(
            builder.config.span_events,
            SpanEventConfig {
                close: true,
                ..SpanEventConfig::NONE
            }
        );
    }

    #[test]
    fn test_span_event_presets() {
        assert_eq!(SpanEventConfig::NONE.to_fmt_span(), FmtSpan::NONE);
        assert_eq!(
            SpanEventConfig::LIFECYCLE.to_fmt_span(),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(SpanEventConfig::FULL.to_fmt_span(), FmtSpan::FULL);
    }

    #[test]
    fn test_file_appender_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("wabot.log");

        let builder = LoggingBuilder::new().file(&path, LogRotation::Daily);
        assert_eq!(builder.config.output, LogOutput::File);
        assert!(builder.file_appender(&path).is_some());
        assert!(dir.path().join("logs").exists());
    }
}
