//! Logging setup shared by the cwall binary and tests
//!
//! Output always goes to stderr so that command output on stdout (quota
//! numbers, status tables) stays pipeable.
//!
//! ```no_run
//! use libcwall::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// * `format` - Log output format (text, json, or pretty)
    /// * `level` - Minimum log level (error, warn, info, debug, trace)
    /// * `verbose` - If true, defaults to debug level
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Install the global subscriber. `RUST_LOG` takes precedence over the
    /// configured level.
    ///
    /// # Panics
    ///
    /// Panics if a subscriber has already been installed
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let level = if self.verbose { "debug" } else { self.level.as_str() };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_target(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Text => {
                // Mirrors the classic "time - LEVEL - message" line
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .init();
            }
        }
    }
}

/// Build a logging configuration from `CWALL_LOG_FORMAT` and
/// `CWALL_LOG_LEVEL`, letting an explicit format (from the command line) win.
/// Falls back to text format at info level.
pub fn from_env(format: Option<LogFormat>, verbose: bool) -> LoggingConfig {
    let format = format
        .or_else(|| {
            std::env::var("CWALL_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("CWALL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    LoggingConfig::new(format, level, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_from_str_invalid() {
        let result = "xml".parse::<LogFormat>();
        assert!(result.unwrap_err().contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display_round_trips_through_parse() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_prefers_explicit_format() {
        std::env::set_var("CWALL_LOG_FORMAT", "json");
        std::env::set_var("CWALL_LOG_LEVEL", "warn");

        let from_env_only = from_env(None, false);
        let explicit = from_env(Some(LogFormat::Pretty), true);

        std::env::remove_var("CWALL_LOG_FORMAT");
        std::env::remove_var("CWALL_LOG_LEVEL");

        assert_eq!(from_env_only.format, LogFormat::Json);
        assert_eq!(from_env_only.level, "warn");
        assert_eq!(explicit.format, LogFormat::Pretty);
        assert!(explicit.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::remove_var("CWALL_LOG_FORMAT");
        std::env::remove_var("CWALL_LOG_LEVEL");

        let config = from_env(None, false);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
        assert!(!config.verbose);
    }
}
