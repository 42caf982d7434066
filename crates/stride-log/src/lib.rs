//! Structured logging for stride.
//!
//! Console output with uptime timestamps and module paths, filtered by
//! `RUST_LOG` or the configured log level. Debug builds can additionally
//! write a JSON log file for inspecting a sync session afterwards.

use std::path::Path;

use stride_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info,stride_modifiers=info";

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "stride.log";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.debug.log_level`, which takes
/// precedence over [`DEFAULT_FILTER`]. When `debug_build` is set and
/// `log_dir` is writable, a JSON layer is added writing to
/// `log_dir/stride.log`.
///
/// # Examples
///
/// ```no_run
/// use stride_config::Config;
/// use stride_log::init_logging;
///
/// let config = Config::default();
/// init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    // RUST_LOG first, then the configured level
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    // Console layer: human-readable, uptime timestamps
    let console_layer = fmt::layer()
        .with_target(true) // Module path, e.g. stride_modifiers::protocol
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime()); // Time since session start

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    // Debug builds also write JSON to a file for replaying a session's log
    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false) // No color codes in the file
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json(); // One JSON object per event

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter directives from the config, falling back to [`DEFAULT_FILTER`]
/// when absent or blank.
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// An `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        let filter_str = format!("{}", default_env_filter());
        assert!(filter_str.contains("stride_modifiers=info"));
        assert!(filter_str.contains("info"));
    }

    #[test]
    fn test_config_level_wins_over_default() {
        let mut config = Config::default();
        config.debug.log_level = "stride_modifiers=trace".to_string();
        assert_eq!(filter_directives(Some(&config)), "stride_modifiers=trace");
    }

    #[test]
    fn test_blank_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directives(Some(&config)), DEFAULT_FILTER);
        assert_eq!(filter_directives(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_subsystem_filter_parses() {
        for directives in ["info,stride_modifiers=debug", "warn", "stride_sim=trace"] {
            assert!(
                EnvFilter::try_new(directives).is_ok(),
                "failed to parse filter: {directives}"
            );
        }
    }

    #[test]
    fn test_log_file_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_file_path = temp_dir.path().join(LOG_FILE_NAME);
        assert_eq!(log_file_path.file_name().unwrap(), "stride.log");
    }
}
