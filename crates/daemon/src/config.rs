// SPDX-License-Identifier: MIT

//! Daemon configuration (spec §6 "Environment variables consumed"),
//! grounded in the teacher's `Config::load()` fixed-paths-under-a-state-dir
//! idiom, scaled down to smak's per-project (not per-user) daemon: every
//! `smakd` is keyed off one recipe file, so its log/WAL/port-file all live
//! next to the cache directory that file resolves to.

use crate::error::DaemonError;
use smak_engine::IgnoreConfig;
use smak_storage::CacheDir;
use std::path::{Path, PathBuf};

/// `SMAK_VERBOSE` (spec §6): `1` for plain verbose logging, `w` for a
/// spinner-style progress indicator in the CLI. The daemon itself only
/// needs to know whether to emit extra progress lines; the spinner
/// rendering is the CLI's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Verbose,
    Spinner,
}

/// Resolved configuration for one `smakd` instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub recipe_file: PathBuf,
    pub cwd: PathBuf,
    pub cache_dir: CacheDir,
    pub ignore: IgnoreConfig,
    pub debug: bool,
    pub verbosity: Verbosity,
    pub log_path: PathBuf,
    pub wal_path: PathBuf,
}

impl Config {
    /// Resolve a daemon's configuration from the environment for a given
    /// recipe file and working directory (spec §6's env vars; `-C DIR`/
    /// `-f FILE` have already been applied by the CLI by the time this
    /// runs, so they arrive here as plain paths, not flags).
    pub fn load(recipe_file: &Path, cwd: &Path) -> Result<Self, DaemonError> {
        let cache_dir = CacheDir::resolve(cwd);
        let debug = std::env::var("SMAK_DEBUG").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        let verbosity = match std::env::var("SMAK_VERBOSE").as_deref() {
            Ok("w") => Verbosity::Spinner,
            Ok("1") => Verbosity::Verbose,
            _ => Verbosity::Quiet,
        };
        let ignore = IgnoreConfig::from_env();

        let state_dir = match &cache_dir {
            CacheDir::Disabled => std::env::temp_dir().join("smak-state"),
            CacheDir::Path(dir) => dir.clone(),
        };

        Ok(Self {
            recipe_file: recipe_file.to_path_buf(),
            cwd: cwd.to_path_buf(),
            log_path: state_dir.join("smakd.log"),
            wal_path: state_dir.join("master.wal"),
            cache_dir,
            ignore,
            debug,
            verbosity,
        })
    }
}
