// SPDX-License-Identifier: MIT

//! The dispatch loop (spec §4.F "Dispatch loop", spec §5 "FIFO within a
//! ready-set"): while an idle worker exists and some queued task's
//! prerequisites are all satisfied, bind it to that worker.

use super::{DispatchedTask, Master, MasterAction, WorkerState, DEADLOCK_LOG_THRESHOLD};
use smak_core::{TargetId, TargetStatus, WorkerId};
use tracing::warn;

/// What the readiness scan found for one queued task's prerequisites.
enum Readiness {
    /// Every prerequisite is satisfied; dispatch this task.
    Ready,
    /// A prerequisite has already failed (spec step 2).
    PrereqFailed,
    /// A prerequisite has no rule and no file on disk (spec step 3).
    PrereqMissing,
    /// Still waiting on at least one prerequisite.
    NotReady,
}

/// Run one dispatch pass to exhaustion: repeatedly bind ready tasks to idle
/// workers until either the queue is empty or no idle worker remains or no
/// queued task has satisfied prerequisites (spec §4.F step 4, logged once
/// idle iterations cross [`DEADLOCK_LOG_THRESHOLD`]).
pub fn dispatch(master: &mut Master) -> Vec<MasterAction> {
    let mut actions = Vec::new();

    loop {
        if master.queue.is_empty() {
            master.idle_iterations = 0;
            break;
        }
        let Some(worker) = first_idle_worker(master) else {
            break;
        };

        match scan_for_ready(master) {
            Some((idx, Readiness::Ready)) => {
                master.idle_iterations = 0;
                let Some(task) = master.queue.remove(idx) else { break };
                actions.extend(bind_to_worker(master, worker, task));
            }
            Some((idx, Readiness::PrereqFailed)) | Some((idx, Readiness::PrereqMissing)) => {
                master.idle_iterations = 0;
                let Some(task) = master.queue.remove(idx) else { break };
                forget_task_metadata(master, task.id);
                actions.extend(master.fail_target(task.target, 1));
            }
            Some((_, Readiness::NotReady)) | None => {
                master.idle_iterations += 1;
                if master.idle_iterations == DEADLOCK_LOG_THRESHOLD {
                    warn!(
                        queued = master.queue.len(),
                        idle_iterations = master.idle_iterations,
                        "dispatch loop idle for several iterations, possible deadlock"
                    );
                }
                break;
            }
        }
    }

    actions
}

fn first_idle_worker(master: &Master) -> Option<WorkerId> {
    master
        .workers
        .iter()
        .find(|(_, state)| **state == WorkerState::Idle)
        .map(|(id, _)| id.clone())
}

/// Scan the queue front-to-back (spec §5 FIFO-within-ready-set) for the
/// first task whose readiness is decidable — either dispatchable or
/// failable. Tasks that are merely still waiting are skipped over so a
/// later, already-satisfied task can still be dispatched out of order, but
/// the *first* decidable task wins ties, matching spec §4.F step 1 "the
/// first task whose every prerequisite is...".
fn scan_for_ready(master: &Master) -> Option<(usize, Readiness)> {
    for (idx, task) in master.queue.iter().enumerate() {
        let prereqs = master.task_prereqs.get(&task.id).cloned().unwrap_or_default();
        match readiness_of(master, &prereqs) {
            Readiness::NotReady => continue,
            other => return Some((idx, other)),
        }
    }
    None
}

fn readiness_of(master: &Master, prereqs: &[TargetId]) -> Readiness {
    let mut any_not_ready = false;
    for &prereq in prereqs {
        match prereq_state(master, prereq) {
            Readiness::Ready => continue,
            Readiness::PrereqFailed => return Readiness::PrereqFailed,
            Readiness::PrereqMissing => return Readiness::PrereqMissing,
            Readiness::NotReady => any_not_ready = true,
        }
    }
    if any_not_ready {
        Readiness::NotReady
    } else {
        Readiness::Ready
    }
}

fn prereq_state(master: &Master, prereq: TargetId) -> Readiness {
    if let Some(&code) = master.failed.get(&prereq) {
        let _ = code;
        return Readiness::PrereqFailed;
    }
    if master.completed.contains(&prereq) {
        return Readiness::Ready;
    }
    match master.in_progress.get(&prereq) {
        Some(TargetStatus::Queued) | Some(TargetStatus::Pending) | Some(TargetStatus::Dispatched(_)) => {
            Readiness::NotReady
        }
        Some(TargetStatus::Done) => Readiness::Ready,
        Some(TargetStatus::Failed(_)) => Readiness::PrereqFailed,
        None => {
            if master.db.is_known_target(prereq) {
                // Known but not yet tracked by in-progress — still being
                // queued elsewhere in this same recursive submit.
                Readiness::NotReady
            } else {
                let name = master.db.interner.resolve_target(prereq).unwrap_or_default();
                let path = crate::staleness::resolve_vpath(&name, &master.cwd, &master.db, &master.ignore);
                if path.exists() {
                    Readiness::Ready
                } else {
                    Readiness::PrereqMissing
                }
            }
        }
    }
}

fn bind_to_worker(master: &mut Master, worker: WorkerId, task: smak_core::Task) -> Vec<MasterAction> {
    let echo_lines = master.task_echo.remove(&task.id).unwrap_or_default();
    forget_task_metadata(master, task.id);
    master.in_progress.insert(task.target, TargetStatus::Dispatched(worker.clone()));
    master.workers.insert(worker.clone(), WorkerState::Busy(task.id));
    master.task_target.insert(task.id, task.target);
    master.task_dispatch.insert(
        task.id,
        DispatchedTask {
            dir: task.dir.clone(),
            command: task.command.clone(),
            echo_lines: echo_lines.clone(),
            retry_count: task.retry_count,
        },
    );
    vec![MasterAction::Dispatch {
        worker,
        task_id: task.id,
        dir: task.dir,
        command: task.command,
        echo_lines,
    }]
}

fn forget_task_metadata(master: &mut Master, task_id: smak_core::TaskId) {
    master.task_prereqs.remove(&task_id);
    master.task_stems.remove(&task_id);
    master.task_echo.remove(&task_id);
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
