// SPDX-License-Identifier: MIT

use super::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn finds_rcs_and_sccs_directories() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("RCS")).unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::create_dir(dir.path().join("sub/SCCS")).unwrap();

    let found = detect_inactive_dirs(dir.path());
    assert_eq!(found.len(), 2);
}

#[test]
fn pattern_under_shadow_dir_without_working_copy_is_inactive() {
    let dir = tempdir().unwrap();
    let rcs = dir.path().join("RCS");
    fs::create_dir(&rcs).unwrap();
    let target = rcs.join("foo.c,v");
    assert!(is_pattern_inactive(&target, &[rcs]));
}

#[test]
fn existing_working_copy_is_not_inactive() {
    let dir = tempdir().unwrap();
    let rcs = dir.path().join("RCS");
    fs::create_dir(&rcs).unwrap();
    let target = rcs.join("foo.c,v");
    fs::write(&target, b"").unwrap();
    assert!(!is_pattern_inactive(&target, &[rcs]));
}
