//! Logging utilities and configuration for stageline.
//!
//! The runtime logs through `tracing`. Row-level detail (every violation,
//! every dropped row) is gated behind [`LogConfig::log_row_details`] because
//! a single staging reload can touch millions of rows.

/// Logging configuration for the pipeline contracts.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to log each rule violation and dropped row individually
    pub log_row_details: bool,
    /// Whether to log per-batch progress
    pub log_batch_progress: bool,
    /// Maximum length for logged field values (to prevent huge logs)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_row_details: true,
            log_batch_progress: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            log_row_details: true,
            log_batch_progress: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration for production with lowest overhead.
    pub fn production() -> Self {
        Self {
            log_row_details: false,
            log_batch_progress: false,
            max_field_length: 128,
        }
    }

    /// Creates a balanced configuration suitable for most use cases.
    pub fn balanced() -> Self {
        Self::default()
    }
}

/// Macro for row-level logging that is skipped entirely when row details
/// are disabled.
///
/// The first argument is a [`LogConfig`], the second a `tracing` level
/// macro name (`info`, `warn`, ...).
#[macro_export]
macro_rules! log_row_detail {
    ($config:expr, $level:ident, $($arg:tt)*) => {
        if $config.log_row_details {
            tracing::$level!($($arg)*);
        }
    };
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let mut cut = max_length;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &value[..cut])
}

/// Global subscriber installation for binaries and examples.
pub mod setup {
    use std::str::FromStr;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    use crate::config::ENV_PREFIX;
    use crate::error::{EtlError, Result};

    /// Output shape of log lines.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum LogFormat {
        /// Multi-line, human oriented
        Pretty,
        /// One line per event
        #[default]
        Compact,
        /// One JSON object per event, for log shippers
        Json,
    }

    impl FromStr for LogFormat {
        type Err = EtlError;

        fn from_str(s: &str) -> Result<Self> {
            match s.trim().to_ascii_lowercase().as_str() {
                "pretty" => Ok(LogFormat::Pretty),
                "compact" | "text" => Ok(LogFormat::Compact),
                "json" => Ok(LogFormat::Json),
                other => Err(EtlError::Configuration(format!(
                    "unknown log format '{other}', expected pretty, compact or json"
                ))),
            }
        }
    }

    /// Subscriber settings. Filter directives use `EnvFilter` syntax.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Directives applied when neither `STAGELINE_LOG` nor `RUST_LOG` is set
        pub directives: Vec<String>,
        /// Line format
        pub format: LogFormat,
        /// Print span enter/close events (timings of instrumented store calls)
        pub span_events: bool,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                directives: vec!["warn".to_string(), "stageline=info".to_string()],
                format: LogFormat::Compact,
                span_events: false,
            }
        }
    }

    impl LoggingConfig {
        /// JSON lines, stageline at info.
        pub fn production() -> Self {
            Self {
                format: LogFormat::Json,
                ..Self::default()
            }
        }

        /// Pretty output, stageline at debug with span timings.
        pub fn development() -> Self {
            Self {
                directives: vec!["info".to_string(), "stageline=debug".to_string()],
                format: LogFormat::Pretty,
                span_events: true,
            }
        }

        /// Adds a filter directive such as `stageline::load=trace`.
        pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
            self.directives.push(directive.into());
            self
        }

        /// Sets the line format.
        pub fn with_format(mut self, format: LogFormat) -> Self {
            self.format = format;
            self
        }

        /// Joined directive string.
        pub fn filter(&self) -> String {
            self.directives.join(",")
        }

        fn env_filter(&self) -> Result<EnvFilter> {
            let from_env = std::env::var(format!("{ENV_PREFIX}LOG"))
                .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
                .ok()
                .filter(|v| !v.trim().is_empty());
            let directives = from_env.unwrap_or_else(|| self.filter());
            EnvFilter::try_new(&directives).map_err(|e| {
                EtlError::Configuration(format!("invalid log filter '{directives}': {e}"))
            })
        }
    }

    /// Installs the global `tracing` subscriber.
    ///
    /// `STAGELINE_LOG`, then `RUST_LOG`, override the configured directives.
    /// Fails when a subscriber is already installed.
    ///
    /// ```rust,no_run
    /// use stageline::logging::setup::{init_logging, LogFormat, LoggingConfig};
    ///
    /// # fn main() -> stageline::error::Result<()> {
    /// init_logging(LoggingConfig::default().with_format(LogFormat::Json))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        use tracing_subscriber::fmt::format::FmtSpan;

        let spans = if config.span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = tracing_subscriber::fmt::layer().with_span_events(spans);
        let layer = match config.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        };

        tracing_subscriber::registry()
            .with(config.env_filter()?)
            .with(layer)
            .try_init()
            .map_err(|e| EtlError::Configuration(format!("logging already initialized: {e}")))
    }
}
