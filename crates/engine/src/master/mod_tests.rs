// SPDX-License-Identifier: MIT

use super::*;
use smak_core::{RecipeLine, Rule, RuleKind, SourceLoc};
use smak_recipe::parser::VariableTable;
use tempfile::TempDir;

fn build_master() -> (TempDir, Master) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = RuleDatabase::new();
    let file = db.interner.intern_file(&dir.path().join("Makefile").to_string_lossy().into_owned());
    let master = Master::new(db, file, VariableTable::new(), dir.path().to_path_buf());
    (dir, master)
}

fn add_rule(master: &mut Master, target: &str, deps: &[&str]) -> TargetId {
    let target_id = master.db.interner.intern_target(target);
    let mut rule = Rule::new(RuleKind::classify(target), target_id, SourceLoc::new(master.cwd.join("Makefile"), 1));
    rule.prerequisites = deps.iter().map(|d| master.db.interner.intern_target(d)).collect();
    rule.recipe.push(RecipeLine::parse(&format!("touch {target}")));
    master.db.insert_rule(master.recipe_file, rule).expect("insert rule");
    target_id
}

#[test]
fn fail_target_emits_job_complete_for_the_originating_client() {
    let (_dir, mut master) = build_master();
    let target = add_rule(&mut master, "out", &[]);
    let client = ClientId::new("c1");
    master.submit_origin.entry(target).or_default().push(client.clone());

    let actions = master.fail_target(target, 2);
    assert!(actions.iter().any(|a| matches!(
        a,
        MasterAction::JobComplete { client: c, target: t, exit_code: 2 } if c == &client && t == "out"
    )));
    assert_eq!(master.failed.get(&target), Some(&2));
}

#[test]
fn fail_target_is_idempotent() {
    let (_dir, mut master) = build_master();
    let target = add_rule(&mut master, "out", &[]);
    let client = ClientId::new("c1");
    master.submit_origin.entry(target).or_default().push(client);

    let first = master.fail_target(target, 1);
    let second = master.fail_target(target, 1);
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
}

#[test]
fn cascade_composite_failure_fails_every_dependent_composite_exactly_once() {
    let (_dir, mut master) = build_master();
    let leaf = add_rule(&mut master, "leaf", &[]);
    let composite = add_rule(&mut master, "all", &["leaf"]);

    let mut remaining = HashSet::new();
    remaining.insert(leaf);
    master.composite_pending.insert(composite, CompositeEntry::new(remaining, ClientId::new("internal")));
    master.submit_origin.entry(composite).or_default().push(ClientId::new("c1"));

    let actions = master.fail_target(leaf, 1);
    assert!(master.failed.contains_key(&composite));
    let complete_count = actions
        .iter()
        .filter(|a| matches!(a, MasterAction::JobComplete { target, .. } if target == "all"))
        .count();
    assert_eq!(complete_count, 1);
}

#[test]
fn resolve_composites_on_success_completes_a_fully_satisfied_composite() {
    let (_dir, mut master) = build_master();
    let leaf = add_rule(&mut master, "leaf", &[]);
    let composite = add_rule(&mut master, "all", &["leaf"]);

    let mut remaining = HashSet::new();
    remaining.insert(leaf);
    master.composite_pending.insert(composite, CompositeEntry::new(remaining, ClientId::new("internal")));
    master.submit_origin.entry(composite).or_default().push(ClientId::new("c1"));

    master.complete_target(leaf);
    let actions = master.resolve_composites_on_success(leaf);
    assert!(master.completed.contains(&composite));
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { target, exit_code: 0, .. } if target == "all")));
}

#[test]
fn reset_clears_progress_but_keeps_the_parsed_database() {
    let (_dir, mut master) = build_master();
    let target = add_rule(&mut master, "out", &[]);
    master.complete_target(target);
    master.dirty.insert(target);

    master.reset();

    assert!(master.completed.is_empty());
    assert!(master.dirty.is_empty());
    assert!(master.db.lookup(master.recipe_file, target).is_some());
}

#[test]
fn apply_wal_events_reconstructs_completed_and_failed_sets() {
    let (_dir, mut master) = build_master();
    let done = add_rule(&mut master, "done", &[]);
    let failed = add_rule(&mut master, "failed", &[]);

    master.apply_wal_events(vec![
        smak_storage::MasterEvent::TargetDone(done),
        smak_storage::MasterEvent::TargetFailed(failed, 2),
    ]);

    assert!(master.completed.contains(&done));
    assert_eq!(master.failed.get(&failed), Some(&2));
}

#[test]
fn assume_marks_complete_without_recipe() {
    let (_dir, mut master) = build_master();
    let target = add_rule(&mut master, "out", &[]);
    master.assume("out");
    assert!(master.assumed.contains(&target));
    assert!(master.completed.contains(&target));
}
