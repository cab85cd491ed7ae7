//! Logging setup
//!
//! Console output plus an optional plain-text file under the configured
//! log directory. `RUST_LOG` takes precedence over the configured level.

use crate::config::LoggingConfig;
use crate::error::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the file writer flushing; drop it last
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl LogGuard {
    /// Whether this guard owns a file writer
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber
///
/// A second call leaves the first subscriber in place and returns a guard
/// that owns nothing.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = config.console.then(|| fmt::layer().with_target(false));

    let installed = tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    match installed {
        Ok(()) => {
            if let Some(dir) = &config.log_dir {
                tracing::debug!("Logging to {}", dir.join(&config.file_name).display());
            }
            Ok(LogGuard { file: guard })
        }
        Err(_) => Ok(LogGuard::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_returns_empty_guard() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".to_string(),
            log_dir: Some(dir.path().join("logs")),
            file_name: "test.log".to_string(),
            console: false,
        };

        // Another test may already have installed a subscriber
        let _first = init(&config).unwrap();
        let second = init(&config).unwrap();
        assert!(!second.has_file());
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_invalid_level_falls_back() {
        // Must not panic on a bad directive
        let _ = build_filter("not a [valid filter");
    }
}
