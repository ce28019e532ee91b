// SPDX-License-Identifier: MIT

//! Log setup (grounded on the teacher's `setup_logging`/`rotate_log_if_needed`
//! in `daemon/src/main.rs`): a non-blocking file appender plus an
//! `EnvFilter`, with simple size-based rotation run once at startup rather
//! than mid-process.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;

/// Rename `log_path` -> `log_path.1` -> ... -> `log_path.MAX_ROTATED_LOGS`
/// if the current log has grown past [`MAX_LOG_SIZE`]. Best-effort: a
/// failed rename just means logging continues appending to the big file.
pub fn rotate_log_if_needed(log_path: &Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

/// Initialize the global tracing subscriber writing to `log_path`,
/// honoring `RUST_LOG` (falling back to `info`, or `debug` when
/// [`crate::config::Config::debug`] is set by the caller).
pub fn setup_logging(log_path: &Path, debug: bool) -> std::io::Result<WorkerGuard> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = log_path.parent().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no parent"))?;
    let name = log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "log path has no file name"))?;
    let appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}
