// SPDX-License-Identifier: MIT

use super::*;
use smak_core::{RecipeLine, Rule, RuleKind, SourceLoc};
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, RuleDatabase) {
    let dir = tempdir().expect("tempdir");
    let db = RuleDatabase::new();
    (dir, db)
}

fn add_rule(db: &mut RuleDatabase, cwd: &Path, target: &str, deps: &[&str]) -> TargetId {
    let file = db.interner.intern_file(&cwd.join("Makefile").to_string_lossy().into_owned());
    let target_id = db.interner.intern_target(target);
    let mut rule = Rule::new(RuleKind::classify(target), target_id, SourceLoc::new(cwd.join("Makefile"), 1));
    rule.prerequisites = deps.iter().map(|d| db.interner.intern_target(d)).collect();
    rule.recipe.push(RecipeLine::parse(&format!("touch {target}")));
    db.insert_rule(file, rule).expect("insert");
    target_id
}

#[test]
fn missing_target_file_is_stale() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    let target = add_rule(&mut db, dir.path(), "out", &[]);
    assert!(needs_rebuild(target, dir.path(), &db, &HashSet::new(), &ignore));
}

#[test]
fn up_to_date_target_is_not_stale() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    let dep = add_rule(&mut db, dir.path(), "dep", &[]);
    let target = add_rule(&mut db, dir.path(), "out", &["dep"]);
    let _ = dep;

    std::fs::write(dir.path().join("dep"), "x").expect("write dep");
    sleep(Duration::from_millis(10));
    std::fs::write(dir.path().join("out"), "y").expect("write out");

    assert!(!needs_rebuild(target, dir.path(), &db, &HashSet::new(), &ignore));
}

#[test]
fn newer_prerequisite_forces_rebuild() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    add_rule(&mut db, dir.path(), "dep", &[]);
    let target = add_rule(&mut db, dir.path(), "out", &["dep"]);

    std::fs::write(dir.path().join("out"), "y").expect("write out");
    sleep(Duration::from_millis(10));
    std::fs::write(dir.path().join("dep"), "x").expect("write dep (newer)");

    assert!(needs_rebuild(target, dir.path(), &db, &HashSet::new(), &ignore));
}

#[test]
fn dirty_mark_forces_rebuild_even_if_up_to_date() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    let target = add_rule(&mut db, dir.path(), "out", &[]);
    std::fs::write(dir.path().join("out"), "y").expect("write out");

    let mut dirty = HashSet::new();
    dirty.insert(target);
    assert!(needs_rebuild(target, dir.path(), &db, &dirty, &ignore));
}

#[test]
fn transitive_dirtiness_propagates_through_prerequisite_chain() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    let grandparent_dep = add_rule(&mut db, dir.path(), "root", &[]);
    add_rule(&mut db, dir.path(), "mid", &["root"]);
    let target = add_rule(&mut db, dir.path(), "out", &["mid"]);

    std::fs::write(dir.path().join("root"), "x").expect("write");
    std::fs::write(dir.path().join("mid"), "x").expect("write");
    std::fs::write(dir.path().join("out"), "x").expect("write");

    let mut dirty = HashSet::new();
    dirty.insert(grandparent_dep);
    assert!(needs_rebuild(target, dir.path(), &db, &dirty, &ignore));
}

#[test]
fn vpath_resolves_prerequisite_from_search_directory() {
    let (dir, mut db) = setup();
    let ignore = IgnoreConfig::new(Vec::new());
    let vendor_dir = dir.path().join("vendor");
    std::fs::create_dir_all(&vendor_dir).expect("mkdir");
    std::fs::write(vendor_dir.join("dep.c"), "x").expect("write");

    db.vpath.push(smak_core::VpathEntry {
        pattern: "*.c".to_string(),
        dirs: vec![vendor_dir.clone()],
    });

    let resolved = resolve_vpath("dep.c", dir.path(), &db, &ignore);
    assert_eq!(resolved, vendor_dir.join("dep.c"));
}

#[test]
fn ignored_directory_is_skipped_when_mtime_unchanged() {
    let dir = tempdir().expect("tempdir");
    let ignored_dir = dir.path().join("sysinclude");
    std::fs::create_dir_all(&ignored_dir).expect("mkdir");
    std::fs::write(ignored_dir.join("stdio.h"), "x").expect("write");

    let ignore = IgnoreConfig::new(vec![ignored_dir.clone()]);
    let path = ignored_dir.join("stdio.h");
    assert!(ignore.is_ignored(&path));
    assert!(ignore.should_skip(&path));
}
