//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with environment-based filtering
//! via `RUST_LOG`. Events always go to stderr; when a log file is
//! configured, a second plain-text layer appends to it. Deployments
//! conventionally point every node at one shared file, so each event
//! carries the node identity in its fields.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// Call this exactly once, early in `main()`. Subsequent calls will panic.
///
/// # Arguments
///
/// * `default_level` - The default filter when `RUST_LOG` is not set.
///   Typical values: `"info"`, `"murmur_node=debug,murmur_protocol=info"`.
/// * `log_file` - Optional shared log file, opened in append mode.
///
/// # Environment
///
/// The `RUST_LOG` environment variable overrides `default_level` when set,
/// using the usual `tracing_subscriber::EnvFilter` directive syntax.
pub fn init_logging(default_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    tracing::info!("logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_log_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad_path = dir.path().join("no-such-dir").join("out.log");

        // OpenOptions fails before any subscriber is installed, so this
        // is safe to probe even though init_logging is once-only.
        let file = OpenOptions::new().create(true).append(true).open(&bad_path);
        assert!(file.is_err());
    }

    #[test]
    fn append_mode_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.log");
        std::fs::write(&path, "existing line\n").unwrap();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        use std::io::Write;
        writeln!(&file, "appended line").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing line\n"));
        assert!(content.contains("appended line"));
    }
}
