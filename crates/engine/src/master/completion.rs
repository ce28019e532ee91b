// SPDX-License-Identifier: MIT

//! `TASK_END` handling (spec §4.F "Completion handling", the four-step
//! algorithm run once per task a worker reports finished): verify the
//! recipe actually produced what it claimed to, then succeed, retry, or
//! fail the target.

use super::{DispatchedTask, Master, MasterAction, WorkerState};
use smak_core::{TaskId, WorkerId};
use tracing::warn;

/// `TASK_END task-id exit-code` (spec §4.H), with `captured_output` being
/// everything the worker streamed back via `OUTPUT`/`ERROR` for this task
/// (used for auto-retry race-pattern matching, spec §4.F step 3).
pub fn on_task_end(master: &mut Master, worker: WorkerId, task_id: TaskId, exit_code: i32, captured_output: &str) -> Vec<MasterAction> {
    let mut actions = Vec::new();

    master.workers.insert(worker, WorkerState::Idle);
    let Some(target) = master.task_target.remove(&task_id) else {
        warn!(?task_id, "TASK_END for an unknown task, ignoring");
        return actions;
    };
    let Some(dispatched) = master.task_dispatch.remove(&task_id) else {
        warn!(?task_id, "TASK_END for a task with no dispatch record, ignoring");
        return actions;
    };

    if exit_code != 0 {
        actions.extend(handle_failure(master, target, exit_code, &dispatched, captured_output));
        return actions;
    }

    if !recipe_output_materialized(master, target) {
        warn!(
            target = %master.db.interner.resolve_target(target).unwrap_or_default(),
            "recipe reported success but its target is still missing, treating as a failure"
        );
        actions.extend(handle_failure(master, target, 1, &dispatched, captured_output));
        return actions;
    }

    master.complete_target(target);
    actions.extend(master.emit_job_complete(target, 0));
    actions.extend(master.resolve_composites_on_success(target));
    actions
}

fn handle_failure(master: &mut Master, target: smak_core::TargetId, exit_code: i32, dispatched: &DispatchedTask, captured_output: &str) -> Vec<MasterAction> {
    let target_name = master.db.interner.resolve_target(target).unwrap_or_default();
    if dispatched.retry_count == 0 && master.retry_policy.should_retry(&target_name, captured_output) {
        return retry(master, target, dispatched);
    }
    master.fail_target(target, exit_code)
}

/// Re-enqueue the exact same command as a fresh task, bumping
/// `retry_count` so a second failure no longer qualifies (spec §4.F step 3:
/// "retried at most once").
fn retry(master: &mut Master, target: smak_core::TargetId, dispatched: &DispatchedTask) -> Vec<MasterAction> {
    let task_id = master.task_ids.next();
    let task = smak_core::Task {
        id: task_id,
        target,
        dir: dispatched.dir.clone(),
        command: dispatched.command.clone(),
        output: smak_core::OutputBuffer::new(),
        retry_count: dispatched.retry_count + 1,
    };
    warn!(target = %master.db.interner.resolve_target(target).unwrap_or_default(), "retrying task after a likely filesystem race");
    master.task_echo.insert(task_id, dispatched.echo_lines.clone());
    master.queue.push_back(task);
    master.in_progress.insert(target, smak_core::TargetStatus::Queued);
    Vec::new()
}

/// Number of verification attempts for a recipe's claimed output (spec
/// §4.F completion step 1: "up-to-3 retries plus directory-fsync hints to
/// absorb buffering delays").
const MAX_OUTPUT_VERIFY_ATTEMPTS: u32 = 3;

/// Common phony-ish target names that are conventionally declared without
/// a recipe-producing file of the same name, whether or not the recipe
/// file bothers to list them under `.PHONY` (spec §4.F completion step 1:
/// "is not a common phony name (`all`, `clean`, `install`, …)").
const COMMON_PHONY_NAMES: &[&str] = &[
    "all", "clean", "distclean", "mostlyclean", "maintainer-clean", "install", "uninstall", "test", "check", "dist",
    "tags", "TAGS", "depend", "help", "default", "doc", "docs", "lint", "fmt", "format", "run",
];

/// Step 1 of completion handling: verification only applies to targets
/// that look like files — spec §4.F completion step 1: "the target name
/// looks like a file (has an extension, contains `/`, or matches known
/// library patterns) AND is not a common phony name". Everything else
/// (a `.PHONY`-declared target, or a bare name like `check`/`clean` that
/// isn't declared phony but plainly doesn't produce a same-named file) is
/// assumed satisfied by a zero exit and skips the disk check entirely.
fn recipe_output_materialized(master: &Master, target: smak_core::TargetId) -> bool {
    if master.db.is_phony(target) {
        return true;
    }
    let Some(name) = master.db.interner.resolve_target(target) else {
        return true;
    };
    if !looks_like_file(&name) || COMMON_PHONY_NAMES.contains(&name.as_str()) {
        return true;
    }
    verify_file_materialized(master, &name)
}

/// NFS-backed and some FUSE filesystems can report a writer's exit before
/// a reader in a different process sees the new dentry, so a single
/// failed `exists()` is nudged with a directory fsync and retried a
/// couple of times before giving up.
fn verify_file_materialized(master: &Master, name: &str) -> bool {
    let path = crate::staleness::resolve_vpath(name, &master.cwd, &master.db, &master.ignore);
    if path.exists() {
        return true;
    }
    for attempt in 1..MAX_OUTPUT_VERIFY_ATTEMPTS {
        fsync_parent_dir(&path);
        std::thread::sleep(std::time::Duration::from_millis(5 * attempt as u64));
        if path.exists() {
            return true;
        }
    }
    false
}

/// Whether `name` looks like it names a file rather than a bare
/// conventional action name: it has a file extension, it's a path
/// (contains `/`), or it matches a versioned-library naming pattern
/// (e.g. `libfoo.so.2`) that the plain extension check alone would miss.
fn looks_like_file(name: &str) -> bool {
    name.contains('/') || has_extension(name) || matches_library_pattern(name)
}

fn has_extension(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.rfind('.') {
        Some(idx) => idx > 0 && idx < file_name.len() - 1,
        None => false,
    }
}

/// Versioned shared-library names like `libfoo.so.2.1` or archive members
/// like `libfoo.a` — `has_extension` already catches the common case, but
/// a name ending in a bare numeric version component after `.so` (with no
/// further suffix) needs its own check.
fn matches_library_pattern(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    (file_name.starts_with("lib") && (file_name.contains(".so") || file_name.ends_with(".a")))
        || LIBRARY_VERSION_SUFFIX.is_match(file_name)
}

#[allow(clippy::expect_used)]
static LIBRARY_VERSION_SUFFIX: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"^lib[\w+-]+\.so(\.\d+)+$").expect("constant regex pattern is valid"));

/// Best-effort hint to flush a directory's entries to whatever is backing
/// it. Failures are ignored — this is a nudge for buffered/networked
/// filesystems, not a correctness requirement on local ones.
fn fsync_parent_dir(path: &std::path::Path) {
    let Some(parent) = path.parent() else { return };
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
