// SPDX-License-Identifier: MIT

//! Ignored-directory bookkeeping (spec §4.C "Ignored directories").
//!
//! Files under a configured ignored-directory prefix are skipped entirely
//! in dependency walks and pattern matching. To avoid re-stat'ing every
//! file under (say) `/usr/include` on every staleness check, each ignored
//! directory's own mtime is cached at startup; only if that directory's
//! mtime changes do we pay the cost of a full re-evaluation of files
//! beneath it (and print a warning, per spec).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

/// Parses `SMAK_IGNORE_DIRS` (colon-separated absolute paths, spec §6) and
/// tracks each directory's mtime so a change can be detected cheaply.
#[derive(Debug, Default, Clone)]
pub struct IgnoreConfig {
    dirs: Vec<PathBuf>,
    dir_mtimes: HashMap<PathBuf, SystemTime>,
}

impl IgnoreConfig {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        let dir_mtimes = dirs
            .iter()
            .filter_map(|d| std::fs::metadata(d).ok().and_then(|m| m.modified().ok()).map(|mt| (d.clone(), mt)))
            .collect();
        Self { dirs, dir_mtimes }
    }

    /// Parse from the `SMAK_IGNORE_DIRS` environment variable (spec §6).
    pub fn from_env() -> Self {
        let dirs = std::env::var("SMAK_IGNORE_DIRS")
            .ok()
            .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();
        Self::new(dirs)
    }

    /// Is `path` beneath one of the configured ignored directories?
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.dirs.iter().any(|d| path.starts_with(d))
    }

    /// Should a staleness check for `path` (known to be under an ignored
    /// directory) be skipped? True unless the owning directory's mtime has
    /// drifted from what was cached at startup, in which case a warning is
    /// printed once and the caller should fall back to a real check.
    pub fn should_skip(&self, path: &Path) -> bool {
        let Some(dir) = self.dirs.iter().find(|d| path.starts_with(d)) else {
            return false;
        };
        let current = std::fs::metadata(dir).ok().and_then(|m| m.modified().ok());
        match (self.dir_mtimes.get(dir), current) {
            (Some(cached), Some(current)) if *cached == current => true,
            (Some(_), Some(_)) => {
                warn!(dir = %dir.display(), "ignored directory mtime changed, forcing full re-evaluation");
                false
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "ignore_tests.rs"]
mod tests;
