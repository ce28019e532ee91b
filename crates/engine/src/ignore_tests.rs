// SPDX-License-Identifier: MIT

use super::*;
use tempfile::tempdir;

#[test]
fn not_ignored_when_no_dirs_configured() {
    let cfg = IgnoreConfig::new(Vec::new());
    assert!(!cfg.is_ignored(Path::new("/usr/include/stdio.h")));
}

#[test]
fn ignored_when_under_configured_prefix() {
    let cfg = IgnoreConfig::new(vec![PathBuf::from("/usr/include")]);
    assert!(cfg.is_ignored(Path::new("/usr/include/stdio.h")));
    assert!(!cfg.is_ignored(Path::new("/usr/local/include/stdio.h")));
}

#[test]
fn should_skip_when_dir_mtime_unchanged() {
    let dir = tempdir().expect("tempdir");
    let cfg = IgnoreConfig::new(vec![dir.path().to_path_buf()]);
    let file = dir.path().join("header.h");
    std::fs::write(&file, "x").expect("write");
    assert!(cfg.should_skip(&file));
}

#[test]
fn forces_reevaluation_when_dir_mtime_changed() {
    let dir = tempdir().expect("tempdir");
    let cfg = IgnoreConfig::new(vec![dir.path().to_path_buf()]);
    let file = dir.path().join("header.h");
    std::fs::write(&file, "x").expect("write");

    // Touch the directory itself to move its mtime forward.
    std::fs::write(dir.path().join("new_file"), "y").expect("write");

    assert!(!cfg.should_skip(&file));
}
