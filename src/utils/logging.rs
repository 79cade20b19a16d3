//! Logging initialization for Doppel.
//!
//! Two formats:
//! - `pretty`: compact human-readable output for interactive runs
//! - `json`: structured JSON lines for log aggregators, optionally
//!   appended to a file

use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match cfg.format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .compact()
                .init();
        }
        LogFormat::Json => init_json(filter, cfg.file.as_deref()),
    }
}

fn init_json(filter: EnvFilter, file: Option<&str>) {
    let builder = tracing_subscriber::fmt().json().with_env_filter(filter);
    match file.map(|path| (path, open_log_file(path))) {
        Some((_, Ok(file))) => builder.with_writer(Mutex::new(file)).init(),
        Some((path, Err(e))) => {
            // a bad log path must not kill the process; fall back to stderr
            builder.init();
            tracing::warn!(path, error = %e, "Could not open log file, logging to stderr");
        }
        None => builder.init(),
    }
}

fn open_log_file(path: &str) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_logging_config_roundtrip() {
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            file: Some("/tmp/doppel.log".to_string()),
            level: "debug".to_string(),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: LoggingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.format, LogFormat::Json);
        assert_eq!(restored.file.as_deref(), Some("/tmp/doppel.log"));
        assert_eq!(restored.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_open_log_file_appends() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doppel.log");
        let path = path.to_str().unwrap();
        writeln!(super::open_log_file(path).unwrap(), "one").unwrap();
        writeln!(super::open_log_file(path).unwrap(), "two").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_open_log_file_rejects_bad_path() {
        assert!(super::open_log_file("/nonexistent/dir/doppel.log").is_err());
    }
}
