/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::SyncConfig;
use crate::error::{RelayError, Result};

/// Initialize structured logging based on configuration. `--verbose` forces
/// DEBUG, `--quiet` forces ERROR-only, otherwise INFO (only those two
/// booleans are exposed, not a leveled `--log-level`).
pub fn init_logging(config: &SyncConfig) -> Result<()> {
    let log_level = if config.verbose {
        Level::DEBUG
    } else if config.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("relay={}", log_level)))
        .map_err(|e| RelayError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_stdout_logging(env_filter);
    }

    Ok(())
}

/// Initialize logging to stdout/stderr
fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize logging to a file
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| RelayError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false) // No ANSI colors in file
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn verbose_and_quiet_are_independent_of_log_file() {
        let config = SyncConfig {
            log_file: None,
            verbose: false,
            quiet: false,
            ..Default::default()
        };
        assert!(!config.verbose);
        assert!(!config.quiet);
    }

    #[test]
    fn log_file_path_round_trips_through_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let log_path = temp_file.path().to_path_buf();

        let config = SyncConfig {
            log_file: Some(log_path.clone()),
            verbose: false,
            ..Default::default()
        };

        assert_eq!(config.log_file, Some(log_path));
    }

    #[test]
    fn verbose_takes_precedence_over_quiet() {
        let config = SyncConfig {
            verbose: true,
            quiet: true,
            ..Default::default()
        };
        assert!(config.verbose);
    }
}
