// SPDX-License-Identifier: MIT

use super::*;
use crate::master::dispatch;
use crate::retry::RetryPolicy;
use smak_core::{ClientId, RecipeLine, Rule, RuleDatabase, RuleKind, SourceLoc, TargetId};
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

fn dispatch_one(master: &mut Master, target_name: &str) -> (WorkerId, TaskId) {
    add_rule(master, target_name, &[]);
    master.submit_job(target_name, ClientId::new("c1"));
    master.add_worker(WorkerId::new("w1"));
    let actions = dispatch(master);
    let MasterAction::Dispatch { worker, task_id, .. } = &actions[0] else {
        unreachable!("expected a Dispatch action")
    };
    (worker.clone(), *task_id)
}

#[test]
fn on_task_end_with_exit_zero_and_file_present_completes_the_target() {
    let (dir, mut master) = build_master();
    let (worker, task_id) = dispatch_one(&mut master, "out.o");
    std::fs::write(dir.path().join("out.o"), "built").expect("write");

    let actions = on_task_end(&mut master, worker.clone(), task_id, 0, "");
    assert!(master.completed.len() == 1);
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 0, .. })));
    assert_eq!(master.workers.get(&worker), Some(&WorkerState::Idle));
}

#[test]
fn on_task_end_with_missing_output_is_treated_as_a_failure() {
    let (_dir, mut master) = build_master();
    let (worker, task_id) = dispatch_one(&mut master, "out.o");

    let actions = on_task_end(&mut master, worker, task_id, 0, "");
    assert!(master.failed.len() == 1);
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 1, .. })));
}

#[test]
fn on_task_end_with_nonzero_exit_fails_the_target() {
    let (_dir, mut master) = build_master();
    let (worker, task_id) = dispatch_one(&mut master, "out.o");

    let actions = on_task_end(&mut master, worker, task_id, 2, "compile error");
    assert!(master.failed.contains_key(&master.db.interner.intern_target("out.o")));
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 2, .. })));
}

#[test]
fn on_task_end_retries_once_when_captured_output_matches_the_retry_policy() {
    let (_dir, mut master) = build_master();
    master.retry_policy = RetryPolicy::new(vec!["*transient*".to_string()], Vec::new());
    let (worker, task_id) = dispatch_one(&mut master, "out.o");
    let flaky_output = "linker: transient failure, try again";

    let actions = on_task_end(&mut master, worker.clone(), task_id, 1, flaky_output);
    assert!(actions.is_empty(), "a retry produces no JOB_COMPLETE yet");
    assert!(master.failed.is_empty());
    assert_eq!(master.queue.len(), 1, "the retried task is re-queued");
    assert_eq!(master.workers.get(&worker), Some(&WorkerState::Idle));
}

#[test]
fn on_task_end_does_not_retry_a_second_time() {
    let (_dir, mut master) = build_master();
    master.retry_policy = RetryPolicy::new(vec!["*transient*".to_string()], Vec::new());
    let (worker, task_id) = dispatch_one(&mut master, "out.o");
    let flaky_output = "linker: transient failure, try again";

    on_task_end(&mut master, worker.clone(), task_id, 1, flaky_output);
    let actions = dispatch(&mut master);
    let MasterAction::Dispatch { worker: worker2, task_id: retried_id, .. } = &actions[0] else {
        unreachable!("expected the retried task to be redispatched")
    };

    let actions = on_task_end(&mut master, worker2.clone(), *retried_id, 1, flaky_output);
    assert!(master.failed.len() == 1);
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 1, .. })));
}

#[test]
fn on_task_end_skips_output_verification_for_a_bare_action_name() {
    // "check" isn't declared under `.PHONY`, doesn't contain a `/`, and has
    // no extension, so it doesn't "look like a file" (spec §4.F step 1);
    // it also happens to be a common conventional phony name. Its recipe
    // never creates a file named "check", but a zero exit still completes it.
    let (_dir, mut master) = build_master();
    let (worker, task_id) = dispatch_one(&mut master, "check");

    let actions = on_task_end(&mut master, worker.clone(), task_id, 0, "");
    assert!(master.completed.len() == 1);
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 0, .. })));
}

#[test]
fn on_task_end_skips_output_verification_for_an_undeclared_bare_name_not_in_the_allowlist() {
    // "build" isn't in the common-phony allowlist, but it still doesn't
    // "look like a file" (no extension, no `/`), so verification is
    // skipped the same way.
    let (_dir, mut master) = build_master();
    let (worker, task_id) = dispatch_one(&mut master, "build");

    let actions = on_task_end(&mut master, worker.clone(), task_id, 0, "");
    assert!(master.completed.len() == 1);
    assert!(actions.iter().any(|a| matches!(a, MasterAction::JobComplete { exit_code: 0, .. })));
}
