// SPDX-License-Identifier: MIT

//! Cancellation (spec §4.F "Cancellation", spec §5 "Cancellation
//! semantics"): `KILL_WORKERS` tears down every registered worker and
//! drains the queue without discarding anything already completed, so a
//! resumed build picks up from where it stopped rather than redoing
//! finished work.

use super::{Master, MasterAction, WorkerState};
use smak_core::TargetStatus;
use tracing::info;

/// Shut down every worker and drop all in-flight/queued work. `completed`,
/// `failed`, and `dirty` are left untouched — a subsequent `submit_job`
/// re-queues only what was still pending (composite-pending entries are
/// left as-is too, since their remaining prerequisites get re-queued the
/// same way).
pub fn kill_workers(master: &mut Master) -> Vec<MasterAction> {
    info!(workers = master.workers.len(), queued = master.queue.len(), "killing all workers");

    let actions: Vec<MasterAction> = master.workers.keys().cloned().map(MasterAction::ShutdownWorker).collect();

    let busy_tasks: Vec<_> = master
        .workers
        .values()
        .filter_map(|state| match state {
            WorkerState::Busy(task_id) => Some(*task_id),
            WorkerState::Idle => None,
        })
        .collect();
    for task_id in busy_tasks {
        master.task_target.remove(&task_id);
        master.task_dispatch.remove(&task_id);
    }

    for worker in master.workers.values_mut() {
        *worker = WorkerState::Idle;
    }

    for task in master.queue.drain(..) {
        master.task_prereqs.remove(&task.id);
        master.task_stems.remove(&task.id);
        master.task_echo.remove(&task.id);
    }

    // Anything still `Queued` or `Dispatched` was just discarded above, so
    // it needs to look unseen to `submit_job`'s step 1 "already tracked"
    // check. `Done`/`Failed`/`Pending` (composite waiting on its deps) are
    // left untouched.
    master
        .in_progress
        .retain(|_, status| !matches!(status, TargetStatus::Queued | TargetStatus::Dispatched(_)));

    actions
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
