// SPDX-License-Identifier: MIT

//! The staleness engine (spec §4.C, component C): `needs_rebuild` plus
//! `vpath` resolution.

use crate::ignore::IgnoreConfig;
use smak_core::{RuleDatabase, TargetId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Resolve a prerequisite name to an on-disk path, per spec §4.C "vpath
/// resolution": if `name` exists relative to `cwd`, that wins outright.
/// Otherwise scan `vpath` entries whose pattern matches `name`; the first
/// directory in the first matching entry that actually contains the file
/// wins. Resolution is skipped for ignored-directory names and inactive
/// patterns, returning `name` unresolved (the caller's existence/mtime
/// checks on the unresolved path will simply observe "doesn't exist",
/// which is the correct fail-safe per spec §7).
pub fn resolve_vpath(name: &str, cwd: &Path, db: &RuleDatabase, ignore: &IgnoreConfig) -> PathBuf {
    let direct = cwd.join(name);
    if direct.exists() {
        return direct;
    }
    if ignore.is_ignored(&direct) {
        return direct;
    }

    for entry in &db.vpath {
        let Ok(pattern) = glob::Pattern::new(&entry.pattern) else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }
        for dir in &entry.dirs {
            let candidate = dir.join(name);
            if candidate.exists() {
                return candidate;
            }
        }
    }

    direct
}

/// Implements spec §4.C's four-step algorithm, including transitive
/// dirtiness propagation through prerequisites-of-prerequisites. `dirty`
/// holds target ids marked via `MARK_DIRTY`/`touch`/the FS-change stream
/// (spec §3 "Dirty set"). A `visited` guard prevents infinite recursion on
/// a dependency cycle — a cycle is treated as "not stale" once re-entered,
/// matching the fail-safe-toward-rebuild posture only at first visit (spec
/// §7: "errors in staleness are treated as needs-rebuild", but a cycle
/// isn't an error, it's a structural property the recursion-depth guard in
/// the job master is responsible for catching separately).
pub fn needs_rebuild(target: TargetId, cwd: &Path, db: &RuleDatabase, dirty: &HashSet<TargetId>, ignore: &IgnoreConfig) -> bool {
    let mut visited = HashSet::new();
    needs_rebuild_inner(target, cwd, db, dirty, ignore, &mut visited)
}

fn needs_rebuild_inner(
    target: TargetId,
    cwd: &Path,
    db: &RuleDatabase,
    dirty: &HashSet<TargetId>,
    ignore: &IgnoreConfig,
    visited: &mut HashSet<TargetId>,
) -> bool {
    if !visited.insert(target) {
        return false;
    }

    if dirty.contains(&target) {
        return true;
    }

    let Some(name) = db.interner.resolve_target(target) else {
        return true;
    };
    let target_path = resolve_vpath(&name, cwd, db, ignore);
    let target_mtime = std::fs::metadata(&target_path).and_then(|m| m.modified()).ok();
    let Some(target_mtime) = target_mtime else {
        return true;
    };

    let file = db_file_of(db, target);
    let Some(rule) = db.lookup(file, target) else {
        return false;
    };

    for &prereq in &rule.prerequisites {
        if db.inactive_patterns.contains(&prereq) {
            continue;
        }
        let Some(prereq_name) = db.interner.resolve_target(prereq) else {
            continue;
        };
        let prereq_path = resolve_vpath(&prereq_name, cwd, db, ignore);
        if ignore.is_ignored(&prereq_path) && ignore.should_skip(&prereq_path) {
            continue;
        }

        if dirty.contains(&prereq) {
            return true;
        }

        if let Ok(meta) = std::fs::metadata(&prereq_path) {
            if let Ok(prereq_mtime) = meta.modified() {
                if prereq_mtime > target_mtime {
                    return true;
                }
            }
        }

        if needs_rebuild_inner(prereq, cwd, db, dirty, ignore, visited) {
            return true;
        }
    }

    false
}

/// Any rule lookup in this module is keyed by `(file, target)`, but the
/// staleness engine only ever has a bare `TargetId` in hand (the job
/// master already resolved which file declared it during queuing); since a
/// target belongs to at most one file's rule tables in practice for a
/// single top-level parse, we look it up by scanning `all_rules` once. This
/// avoids threading a `FileId` through every staleness call for what is, in
/// a single-recipe-file build, always the same file.
fn db_file_of(db: &RuleDatabase, target: TargetId) -> smak_core::FileId {
    db.all_rules()
        .find(|r| r.target == target)
        .map(|r| r.source.file.to_string_lossy().into_owned())
        .map(|path| db.interner.intern_file(&path))
        .unwrap_or_else(|| db.interner.intern_file(""))
}

#[cfg(test)]
#[path = "staleness_tests.rs"]
mod tests;
