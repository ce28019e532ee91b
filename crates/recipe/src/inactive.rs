// SPDX-License-Identifier: MIT

//! RCS/SCCS inactive-pattern detection (spec §4.B, "pattern activation").
//!
//! A pattern rule's implicit prerequisite directory may be under version
//! control in a way that makes the pattern inapplicable until checked out
//! (the classic `RCS/%,v` / `SCCS/s.%` pairing). At load time we walk the
//! recipe file's directory looking for `RCS/` and `SCCS/` subdirectories;
//! patterns whose implicit prerequisite would resolve into one of those and
//! for which no working-copy file already exists are recorded as inactive,
//! so the staleness engine can skip them rather than mis-stale a target with
//! a prerequisite that doesn't really exist yet.

use std::path::Path;
use walkdir::WalkDir;

/// Version-control shadow directories whose presence marks the patterns
/// that reference them as provisionally inactive.
const SHADOW_DIRS: &[&str] = &["RCS", "SCCS"];

pub fn detect_inactive_dirs(root: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).max_depth(4).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if SHADOW_DIRS.contains(&name) {
                found.push(entry.path().to_path_buf());
            }
        }
    }
    found
}

/// A pattern target is inactive if its prerequisite would resolve under one
/// of the discovered shadow directories and no working-copy file of that
/// name already exists alongside it.
pub fn is_pattern_inactive(target_path: &Path, shadow_dirs: &[std::path::PathBuf]) -> bool {
    let Some(parent) = target_path.parent() else {
        return false;
    };
    let under_shadow = shadow_dirs.iter().any(|d| d == parent || parent.starts_with(d));
    under_shadow && !target_path.exists()
}

#[cfg(test)]
#[path = "inactive_tests.rs"]
mod tests;
