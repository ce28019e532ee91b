// SPDX-License-Identifier: MIT

//! The state cache (spec §4.D): a parsed [`RuleDatabase`] plus the mtimes of
//! every input file that fed the parse, persisted atomically so the next
//! invocation can skip re-parsing the recipe file when nothing it read has
//! changed.
//!
//! Grounded in the teacher's `storage::snapshot::Snapshot` atomic
//! write-to-tmp-then-rename and corrupt-file `.bak` rotation; this crate's
//! cache skips the teacher's WAL-sequence/`created_at` bookkeeping since
//! spec §4.D has no notion of incremental replay for the recipe database
//! itself (that only applies to the job master's event log, see [`crate::wal`]).

use serde::{Deserialize, Serialize};
use smak_core::{DatabaseSnapshot, VarBinding};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;

/// Bumped whenever [`CachedState`]'s shape changes incompatibly; a cache
/// file written by an older version is treated as absent rather than
/// partially trusted.
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rule database reconstruction failed: {0}")]
    Database(#[from] smak_core::CoreError),
}

/// Everything persisted by [`Cache::save`]: the flattened rule database, the
/// variable table it was parsed alongside, and the mtime of every file that
/// was read to produce it (the recipe file and everything it transitively
/// `include`s), keyed by path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedState {
    version: u32,
    database: DatabaseSnapshot,
    variables: HashMap<String, VarBinding>,
    input_mtimes: HashMap<PathBuf, SystemTime>,
}

/// Resolves where cache files live, honoring `SMAK_CACHE_DIR` (spec §4.D:
/// "`SMAK_CACHE_DIR` env var overrides the cache directory; value `\"off\"`
/// disables caching entirely").
#[derive(Debug, Clone)]
pub enum CacheDir {
    /// Cache reads/writes are no-ops.
    Disabled,
    Path(PathBuf),
}

impl CacheDir {
    /// Resolve from the environment, falling back to `default_dir` (the
    /// caller typically passes the recipe file's own directory, e.g.
    /// `.smak-cache/` next to the Makefile, matching make-like tools'
    /// convention of keeping derived state beside the project).
    pub fn resolve(default_dir: &Path) -> Self {
        match std::env::var("SMAK_CACHE_DIR") {
            Ok(v) if v == "off" => CacheDir::Disabled,
            Ok(v) if !v.is_empty() => CacheDir::Path(PathBuf::from(v)),
            _ => CacheDir::Path(default_dir.join(".smak-cache")),
        }
    }

    pub fn cache_file_path(&self, recipe_file: &Path) -> Option<PathBuf> {
        match self {
            CacheDir::Disabled => None,
            CacheDir::Path(dir) => {
                let name = recipe_file
                    .file_name()
                    .map(|n| format!("{}.json", n.to_string_lossy()))
                    .unwrap_or_else(|| "recipe.json".to_string());
                Some(dir.join(name))
            }
        }
    }
}

/// The state cache itself. Stateless beyond the filesystem — every call
/// re-reads or re-writes the backing file, matching the teacher's
/// `Snapshot::save`/`Snapshot::load` free-function style rather than
/// threading a long-lived handle through the daemon.
pub struct Cache;

impl Cache {
    /// Persist `database` and the `input_mtimes` map used to validate it
    /// later, atomically (write to `.tmp`, `sync_all`, rename over `path`).
    /// A no-op if `dir` is [`CacheDir::Disabled`].
    pub fn save(
        dir: &CacheDir,
        recipe_file: &Path,
        database: &smak_core::RuleDatabase,
        variables: &HashMap<String, VarBinding>,
        input_mtimes: &HashMap<PathBuf, SystemTime>,
    ) -> Result<(), StorageError> {
        let Some(path) = dir.cache_file_path(recipe_file) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let state = CachedState {
            version: CACHE_VERSION,
            database: database.snapshot(),
            variables: variables.clone(),
            input_mtimes: input_mtimes.clone(),
        };

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &state)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Load a cached database, returning `Ok(None)` when there is no cache,
    /// the version doesn't match, any `input_mtimes` entry has changed (spec
    /// §4.D: the cache is invalidated wholesale, not per-target, when any
    /// input it was built from has a newer mtime than recorded), or the file
    /// is corrupt — corrupt files are rotated to `.bak` (keeping up to 3)
    /// rather than surfaced as an error, matching the teacher's recovery
    /// posture of preferring a fresh rebuild over a hard failure.
    pub fn load(
        dir: &CacheDir,
        recipe_file: &Path,
    ) -> Result<Option<(smak_core::RuleDatabase, HashMap<String, VarBinding>, HashMap<PathBuf, SystemTime>)>, StorageError> {
        let Some(path) = dir.cache_file_path(recipe_file) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let state: CachedState = match serde_json::from_reader(reader) {
            Ok(state) => state,
            Err(e) => {
                let bak_path = rotate_bak_path(&path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak_path.display(),
                    "corrupt state cache, rotating to .bak and rebuilding from scratch",
                );
                fs::rename(&path, &bak_path)?;
                return Ok(None);
            }
        };

        if state.version != CACHE_VERSION {
            return Ok(None);
        }

        for (input_path, cached_mtime) in &state.input_mtimes {
            let current_mtime = match fs::metadata(input_path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(_) => return Ok(None),
            };
            if current_mtime != *cached_mtime {
                return Ok(None);
            }
        }

        let database = smak_core::RuleDatabase::from_snapshot(state.database)?;
        Ok(Some((database, state.variables, state.input_mtimes)))
    }
}

const MAX_BAK_FILES: u32 = 3;

fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }
    bak(1)
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
