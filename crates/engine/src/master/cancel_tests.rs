// SPDX-License-Identifier: MIT

use super::*;
use smak_core::{ClientId, RecipeLine, Rule, RuleDatabase, RuleKind, SourceLoc, TargetId, WorkerId};
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
fn kill_workers_shuts_down_every_registered_worker() {
    let (_dir, mut master) = build_master();
    master.add_worker(WorkerId::new("w1"));
    master.add_worker(WorkerId::new("w2"));

    let actions = kill_workers(&mut master);
    let shutdown_count = actions.iter().filter(|a| matches!(a, MasterAction::ShutdownWorker(_))).count();
    assert_eq!(shutdown_count, 2);
    assert!(master.workers.values().all(|w| *w == WorkerState::Idle));
}

#[test]
fn kill_workers_drains_the_queue_and_forgets_queued_targets() {
    let (_dir, mut master) = build_master();
    let target = add_rule(&mut master, "out", &[]);
    master.submit_job("out", ClientId::new("c1"));
    assert_eq!(master.queue.len(), 1);

    kill_workers(&mut master);

    assert!(master.queue.is_empty());
    assert!(!master.in_progress.contains_key(&target));
}

#[test]
fn kill_workers_preserves_completed_and_failed_state() {
    let (_dir, mut master) = build_master();
    let done = add_rule(&mut master, "done", &[]);
    let failed = add_rule(&mut master, "failed", &[]);
    master.complete_target(done);
    master.fail_target(failed, 1);

    kill_workers(&mut master);

    assert!(master.completed.contains(&done));
    assert!(master.failed.contains_key(&failed));
}
