//! Structured logging setup.
//!
//! Every log line carries an `event` field of the form
//! `<crate>.<area>.<what>` (e.g. `core.store.upsert_applied`).

use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install a JSON subscriber on stderr.
///
/// `RUST_LOG` wins when set. Otherwise `quiet` turns logging off entirely
/// (user-facing output only), and verbose mode shows `info` and up.
pub fn init_logging(quiet: bool) {
    let default_directive = if quiet { "off" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false);

    // try_init: a second call (tests, embedding apps) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

/// Install a JSON subscriber appending to `log_path` at `debug` level.
///
/// Used by long-running watches so stderr stays readable. Falls back to
/// [`init_logging`] if the file cannot be opened.
pub fn init_file_logging(log_path: &Path, quiet: bool) {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
    {
        Ok(file) => file,
        Err(e) => {
            init_logging(quiet);
            tracing::warn!(
                event = "core.logging.file_open_failed",
                path = %log_path.display(),
                error = %e,
            );
            return;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let layer = fmt::layer()
        .json()
        .with_writer(std::sync::Mutex::new(file))
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}
