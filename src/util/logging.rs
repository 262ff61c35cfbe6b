//! Structured logging setup for healbox
//!
//! Initializes a `tracing` subscriber once per process. Output is human
//! readable by default and switches to JSON lines for machine consumption.
//!
//! # Example
//!
//! ```no_run
//! use healbox::util::logging;
//!
//! logging::init_from_env(None);
//! tracing::info!(attempt = 1, "Building candidate image");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Controls level, format, and metadata of emitted log lines
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,

    /// JSON lines instead of pretty console output
    pub use_json: bool,

    /// Include the module target (e.g. healbox::heal) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    /// Reads `HEALBOX_LOG_LEVEL` and `HEALBOX_LOG_JSON`; `level` wins over the variable
    pub fn from_env(level: Option<Level>) -> Self {
        let level = level.unwrap_or_else(|| {
            env::var("HEALBOX_LOG_LEVEL")
                .map(|v| parse_level(&v))
                .unwrap_or(Level::INFO)
        });
        let use_json = env::var("HEALBOX_LOG_JSON")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level,
            use_json,
            ..Default::default()
        }
    }
}

/// Parses a log level, falling back to INFO on unknown input
///
/// ```
/// use healbox::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("nonsense"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("healbox={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    // Quiet the HTTP and Docker client stacks unless RUST_LOG asks for them
    if env::var("RUST_LOG").is_err() {
        for noisy in ["h2=warn", "hyper=warn", "hyper_util=warn", "reqwest=warn", "bollard=warn"] {
            if let Ok(directive) = noisy.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

/// Installs the subscriber configured by [`LoggingConfig::from_env`]
pub fn init_from_env(level: Option<Level>) {
    init_logging(LoggingConfig::from_env(level));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.include_target);
        assert!(!config.include_location);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_variables() {
        env::set_var("HEALBOX_LOG_LEVEL", "warn");
        env::set_var("HEALBOX_LOG_JSON", "true");

        let config = LoggingConfig::from_env(None);

        env::remove_var("HEALBOX_LOG_LEVEL");
        env::remove_var("HEALBOX_LOG_JSON");
        assert_eq!(config.level, Level::WARN);
        assert!(config.use_json);
    }

    #[test]
    #[serial]
    fn test_flag_level_overrides_env() {
        env::set_var("HEALBOX_LOG_LEVEL", "trace");

        let config = LoggingConfig::from_env(Some(Level::ERROR));

        env::remove_var("HEALBOX_LOG_LEVEL");
        assert_eq!(config.level, Level::ERROR);
        assert!(!config.use_json);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        env::remove_var("HEALBOX_LOG_LEVEL");
        env::remove_var("HEALBOX_LOG_JSON");

        let config = LoggingConfig::from_env(None);
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
    }

    #[test]
    fn test_filter_builds_for_every_level() {
        for level in [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR] {
            let filter = build_filter(level);
            assert!(format!("{}", filter).contains("healbox"));
        }
    }
}
