// SPDX-License-Identifier: MIT

//! The job master (spec §4.F, component F) — the orchestrator's core.
//!
//! `Master` owns the parsed [`RuleDatabase`], the job queue, the
//! in-progress map, the composite-pending table, and the completed/failed/
//! dirty sets, exactly as spec §3/§4.F describe them (spec §9's redesign
//! flag: "package [global mutable state] into a `State` struct owned by
//! the master's event loop"). Every public method here runs to completion
//! synchronously and returns the list of [`MasterAction`]s the caller (the
//! async daemon event loop, spec §5 "suspension points") must carry out —
//! sending bytes down a worker socket, broadcasting to observers, and so
//! on. `Master` itself never touches a socket; that keeps it trivially
//! unit-testable without a runtime.

mod cancel;
mod completion;
mod dispatch;
mod queue;

use crate::automatic::AutomaticVars;
use crate::ignore::IgnoreConfig;
use crate::retry::RetryPolicy;
use smak_core::{
    ClientId, CompositeEntry, FileId, RuleDatabase, TargetId, TargetStatus, Task, TaskId, TaskIdGen, WorkerId,
};
use smak_recipe::parser::VariableTable;
use smak_storage::MasterWal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{info, warn};

/// Default recursion-depth bound for recursive dependency queuing (spec
/// §4.F: "Recursion depth is bounded (e.g., 20)").
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Number of consecutive idle dispatch iterations before a deadlock is
/// logged (spec §4.F step 4: "the deadlock check happens after several
/// idle iterations and is logged").
pub const DEADLOCK_LOG_THRESHOLD: u32 = 5;

/// A worker's scheduling state, as tracked by the master (not the worker
/// process itself — spec §3 "Worker handle": "the job master exclusively
/// owns the handle").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy(TaskId),
}

/// A side effect the caller must carry out after a `Master` method
/// returns — sending bytes to a worker or client socket. `Master` never
/// performs I/O itself.
#[derive(Debug, Clone)]
pub enum MasterAction {
    /// Send `TASK/DIR/CMD` to `worker` for `task_id`. `echo_lines` are the
    /// non-`@`-silenced recipe lines, for the daemon to print/broadcast
    /// before dispatch (spec §7 "every recipe's stdout and stderr are
    /// forwarded verbatim").
    Dispatch {
        worker: WorkerId,
        task_id: TaskId,
        dir: PathBuf,
        command: String,
        echo_lines: Vec<String>,
    },
    /// Send `SHUTDOWN` to `worker`.
    ShutdownWorker(WorkerId),
    /// Broadcast `ENV name=value` to every connected worker.
    BroadcastEnv(String, String),
    /// Emit `JOB_COMPLETE target exit-code` to `client` (spec §3
    /// "Exactly-once completion notification").
    JobComplete {
        client: ClientId,
        target: String,
        exit_code: i32,
    },
    /// Forward a `WATCH:path` notification to a watching client (spec §4.G).
    Watch { client: ClientId, path: String },
}

/// Enough of a dispatched task's shape to re-issue it on auto-retry,
/// without keeping the whole [`Task`] (whose `output` buffer belongs to
/// the caller streaming it in, not to `Master`).
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub dir: PathBuf,
    pub command: String,
    pub echo_lines: Vec<String>,
    pub retry_count: u32,
}

/// A recursion-depth overflow during queuing (spec §4.F: "bounded...with a
/// traceback on overflow; this catches pathological or cyclic dependency
/// chains"). Carries the chain of targets from the root submit down to the
/// point of overflow, for the traceback the caller logs.
#[derive(Debug, Clone)]
pub struct DepthOverflow {
    pub chain: Vec<String>,
}

/// The job master. See module docs.
pub struct Master {
    pub(crate) db: RuleDatabase,
    /// The top-level recipe file every rule is indexed under (spec §4.B:
    /// included files are indexed under their includer's top-level id).
    pub(crate) recipe_file: FileId,
    pub(crate) variables: VariableTable,
    pub(crate) cwd: PathBuf,
    pub(crate) ignore: IgnoreConfig,
    pub(crate) retry_policy: RetryPolicy,

    pub(crate) queue: VecDeque<Task>,
    /// Resolved (stem-substituted) prerequisite ids for each queued task,
    /// used by the dispatch loop's readiness scan (spec §4.F dispatch
    /// step 1) without re-deriving pattern substitution every scan.
    pub(crate) task_prereqs: HashMap<TaskId, Vec<TargetId>>,
    pub(crate) task_stems: HashMap<TaskId, Option<String>>,
    pub(crate) task_echo: HashMap<TaskId, Vec<String>>,

    pub(crate) in_progress: HashMap<TargetId, TargetStatus>,
    pub(crate) composite_pending: HashMap<TargetId, CompositeEntry>,
    pub(crate) completed: HashSet<TargetId>,
    pub(crate) failed: HashMap<TargetId, i32>,
    pub(crate) dirty: HashSet<TargetId>,
    /// Targets marked via `assume` — "mark complete without building"
    /// (spec §9 open question, resolved as stated).
    pub(crate) assumed: HashSet<TargetId>,
    pub(crate) assume_warned: bool,

    pub(crate) workers: HashMap<WorkerId, WorkerState>,
    pub(crate) task_ids: TaskIdGen,
    pub(crate) env: HashMap<String, String>,
    pub(crate) watchers: HashSet<ClientId>,

    /// Which target a dispatched task belongs to, and enough of its
    /// dispatch to re-issue it on auto-retry (spec §4.F completion
    /// handling step 3), indexed by task id since a task is no longer in
    /// `queue` once the dispatch loop binds it to a worker.
    pub(crate) task_target: HashMap<TaskId, TargetId>,
    pub(crate) task_dispatch: HashMap<TaskId, DispatchedTask>,

    /// Latches true on the first `submit_job`; spec §4.F: "the master no
    /// longer exits on idle until the originating client disconnects."
    pub(crate) jobs_received: bool,
    pub(crate) idle_iterations: u32,
    pub(crate) max_depth: u32,
    pub(crate) wal: Option<MasterWal>,

    /// Which client originated each top-level submit, so `JOB_COMPLETE`
    /// is routed back correctly even when the target is also a shared
    /// prerequisite of other in-flight submits.
    pub(crate) submit_origin: HashMap<TargetId, Vec<ClientId>>,
}

impl Master {
    pub fn new(db: RuleDatabase, recipe_file: FileId, variables: VariableTable, cwd: PathBuf) -> Self {
        Self {
            db,
            recipe_file,
            variables,
            cwd,
            ignore: IgnoreConfig::from_env(),
            retry_policy: RetryPolicy::default(),
            queue: VecDeque::new(),
            task_prereqs: HashMap::new(),
            task_stems: HashMap::new(),
            task_echo: HashMap::new(),
            in_progress: HashMap::new(),
            composite_pending: HashMap::new(),
            completed: HashSet::new(),
            failed: HashMap::new(),
            dirty: HashSet::new(),
            assumed: HashSet::new(),
            assume_warned: false,
            workers: HashMap::new(),
            task_ids: TaskIdGen::new(),
            env: HashMap::new(),
            watchers: HashSet::new(),
            task_target: HashMap::new(),
            task_dispatch: HashMap::new(),
            jobs_received: false,
            idle_iterations: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            wal: None,
            submit_origin: HashMap::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_wal(mut self, wal: MasterWal) -> Self {
        self.wal = Some(wal);
        self
    }

    /// Reconstructs completed/failed/dirty state from a prior session's WAL
    /// (ambient durability addition, SPEC_FULL.md's `smak-storage` section).
    /// Pure state replay: does not re-append the replayed events, so a
    /// daemon restart doesn't grow the log on every boot.
    pub fn apply_wal_events(&mut self, events: Vec<smak_storage::MasterEvent>) {
        for event in events {
            match event {
                smak_storage::MasterEvent::TargetDone(target) => {
                    self.completed.insert(target);
                    self.in_progress.insert(target, TargetStatus::Done);
                    self.dirty.remove(&target);
                }
                smak_storage::MasterEvent::TargetFailed(target, code) => {
                    self.failed.insert(target, code);
                    self.in_progress.insert(target, TargetStatus::Failed(code));
                }
                smak_storage::MasterEvent::TargetDirty(target) => {
                    self.dirty.insert(target);
                }
                smak_storage::MasterEvent::TargetReset(target) => {
                    self.completed.remove(&target);
                    self.failed.remove(&target);
                    self.in_progress.remove(&target);
                }
            }
        }
    }

    pub fn database(&self) -> &RuleDatabase {
        &self.db
    }

    pub fn jobs_received(&self) -> bool {
        self.jobs_received
    }

    /// The recipe file's first eligible rule (spec §3 "default goal"), for
    /// a `SUBMIT_JOB` with no target named — `smak` invoked with no target
    /// positional argument per spec §6.
    pub fn default_goal_name(&self) -> Option<String> {
        self.db.default_goal.and_then(|t| self.db.interner.resolve_target(t))
    }

    /// Idempotent single-report failure marking (spec §9 open question:
    /// "FAIL propagation... may produce duplicate log lines... ensure each
    /// failure is reported once"). A no-op (empty return) if `target` was
    /// already failed, so callers never need to guard against double
    /// reporting themselves. Returns the `JOB_COMPLETE` actions for this
    /// target and for every composite transitively failed by the cascade
    /// (spec §4.F step 2: "cascade this failure to any composite-pending
    /// entry that lists this task as a dep").
    pub(crate) fn fail_target(&mut self, target: TargetId, code: i32) -> Vec<MasterAction> {
        if self.failed.contains_key(&target) {
            return Vec::new();
        }
        self.failed.insert(target, code);
        self.in_progress.insert(target, TargetStatus::Failed(code));
        if let Some(mut wal) = self.wal.take() {
            if let Err(e) = wal.append(&smak_storage::MasterEvent::TargetFailed(target, code)) {
                warn!(error = %e, "failed to append to master WAL");
            }
            self.wal = Some(wal);
        }
        let mut actions = self.emit_job_complete(target, code);
        actions.extend(self.cascade_composite_failure(target));
        actions
    }

    /// Idempotent single-report completion marking.
    pub(crate) fn complete_target(&mut self, target: TargetId) {
        if self.completed.contains(&target) {
            return;
        }
        self.completed.insert(target);
        self.in_progress.insert(target, TargetStatus::Done);
        self.dirty.remove(&target);
        if let Some(mut wal) = self.wal.take() {
            if let Err(e) = wal.append(&smak_storage::MasterEvent::TargetDone(target)) {
                warn!(error = %e, "failed to append to master WAL");
            }
            self.wal = Some(wal);
        }
    }

    /// Remove `target` from every composite-pending entry's remaining set;
    /// if an entry becomes empty, mark it complete and emit `JOB_COMPLETE`.
    /// Called on both success and (transitively, via [`Self::cascade_composite_failure`])
    /// failure, so a composite's own completion/failure is driven entirely
    /// by its prerequisites.
    pub(crate) fn resolve_composites_on_success(&mut self, target: TargetId) -> Vec<MasterAction> {
        let mut actions = Vec::new();
        let satisfied: Vec<TargetId> = self
            .composite_pending
            .iter_mut()
            .filter_map(|(&composite, entry)| {
                entry.satisfy(target);
                entry.is_satisfied().then_some(composite)
            })
            .collect();

        for composite in satisfied {
            if let Some(entry) = self.composite_pending.remove(&composite) {
                self.complete_target(composite);
                actions.extend(self.emit_job_complete(composite, 0));
                let _ = entry;
            }
        }
        actions
    }

    /// Fail every composite-pending entry that (transitively) depends on
    /// `target`, per spec §4.F step 2/3 "cascade this failure to any
    /// composite-pending entry that lists this task as a dep". Recurses
    /// through [`Self::fail_target`], so a composite-of-composites chain
    /// fails all the way up, each reported exactly once.
    pub(crate) fn cascade_composite_failure(&mut self, target: TargetId) -> Vec<MasterAction> {
        let dependents: Vec<TargetId> = self
            .composite_pending
            .iter()
            .filter(|(_, entry)| entry.remaining.contains(&target))
            .map(|(&composite, _)| composite)
            .collect();

        let mut actions = Vec::new();
        for composite in dependents {
            self.composite_pending.remove(&composite);
            actions.extend(self.fail_target(composite, 1));
        }
        actions
    }

    pub(crate) fn emit_job_complete(&mut self, target: TargetId, exit_code: i32) -> Vec<MasterAction> {
        let Some(name) = self.db.interner.resolve_target(target) else {
            return Vec::new();
        };
        let clients = self.submit_origin.remove(&target).unwrap_or_default();
        clients
            .into_iter()
            .map(|client| MasterAction::JobComplete {
                client,
                target: name.clone(),
                exit_code,
            })
            .collect()
    }

    pub(crate) fn automatic_vars_for(&self, target: TargetId, prereqs: &[TargetId], stem: Option<&str>) -> AutomaticVars {
        let target_name = self.db.interner.resolve_target(target).unwrap_or_default();
        let prereq_names: Vec<String> = prereqs.iter().filter_map(|&p| self.db.interner.resolve_target(p)).collect();
        AutomaticVars::new(&target_name, &prereq_names, stem)
    }

    // ---- Public status/query contract (spec §4.F, §4.H) ----

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            queued: self.queue.len(),
            in_progress: self.in_progress.iter().filter(|(_, s)| s.is_in_progress()).count(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            workers_idle: self.workers.values().filter(|w| **w == WorkerState::Idle).count(),
            workers_busy: self.workers.values().filter(|w| matches!(w, WorkerState::Busy(_))).count(),
        }
    }

    pub fn list_tasks(&self) -> Vec<String> {
        self.queue
            .iter()
            .filter_map(|t| self.db.interner.resolve_target(t.target))
            .collect()
    }

    /// `-n` dry-run support (spec §4.I): the queued recipe commands in
    /// dispatch order, without ever sending one to a worker.
    pub fn dry_run_plan(&self) -> Vec<(String, String)> {
        self.queue
            .iter()
            .map(|t| (self.db.interner.resolve_target(t.target).unwrap_or_default(), t.command.clone()))
            .collect()
    }

    pub fn list_files(&self) -> Vec<String> {
        self.completed.iter().filter_map(|&t| self.db.interner.resolve_target(t)).collect()
    }

    pub fn list_stale(&self) -> Vec<String> {
        self.db
            .all_rules()
            .filter(|r| crate::staleness::needs_rebuild(r.target, &self.cwd, &self.db, &self.dirty, &self.ignore))
            .filter_map(|r| self.db.interner.resolve_target(r.target))
            .collect()
    }

    /// `MARK_DIRTY:file` (spec §4.H) / the FS-change monitor's dirty-set
    /// update (spec §4.G).
    pub fn mark_dirty(&mut self, target_name: &str) {
        let target = self.db.interner.intern_target(target_name);
        self.dirty.insert(target);
    }

    /// `assume <target>` — mark complete without building (spec §9 open
    /// question 2, resolved as stated, with a once-per-session warning
    /// about the side-effect risk this raises for recipes with
    /// side-effectful commands).
    pub fn assume(&mut self, target_name: &str) {
        if !self.assume_warned {
            warn!("`assume` marks a target complete without running its recipe; side effects the recipe would have produced will not happen");
            self.assume_warned = true;
        }
        let target = self.db.interner.intern_target(target_name);
        self.assumed.insert(target);
        self.complete_target(target);
    }

    /// `RESET` (spec §4.H): clears completed/failed/dirty/in-progress state
    /// so a subsequent build starts from scratch. The parsed rule database
    /// itself is untouched (spec §3 "Parse-once").
    pub fn reset(&mut self) {
        self.completed.clear();
        self.failed.clear();
        self.dirty.clear();
        self.in_progress.clear();
        self.composite_pending.clear();
        self.queue.clear();
        self.task_prereqs.clear();
        self.task_stems.clear();
        self.task_echo.clear();
        self.assumed.clear();
        self.task_target.clear();
        self.task_dispatch.clear();
        if let Some(wal) = self.wal.as_mut() {
            wal.clear();
        }
        info!("master state reset");
    }

    /// `RESCAN[--auto]` (spec §4.F): walk completed targets and remove any
    /// that `needs_rebuild` now reports stale, so a subsequent submit will
    /// redo them. `auto` is a marker for the caller (the daemon schedules
    /// this periodically when true); the sweep logic is identical either
    /// way.
    pub fn rescan(&mut self) {
        let stale: Vec<TargetId> = self
            .completed
            .iter()
            .copied()
            .filter(|&t| crate::staleness::needs_rebuild(t, &self.cwd, &self.db, &self.dirty, &self.ignore))
            .collect();
        for target in stale {
            self.completed.remove(&target);
            self.in_progress.remove(&target);
        }
    }

    pub fn watch_start(&mut self, client: ClientId) {
        self.watchers.insert(client);
    }

    pub fn watch_stop(&mut self, client: ClientId) {
        self.watchers.remove(&client);
    }

    pub fn is_watching(&self, client: ClientId) -> bool {
        self.watchers.contains(&client)
    }

    /// `ENV K=V` (spec §4.F): updates the master's shared environment and
    /// returns the broadcast action for every connected worker.
    pub fn set_env(&mut self, name: impl Into<String>, value: impl Into<String>) -> MasterAction {
        let name = name.into();
        let value = value.into();
        self.env.insert(name.clone(), value.clone());
        MasterAction::BroadcastEnv(name, value)
    }

    pub fn add_worker(&mut self, worker: WorkerId) {
        self.workers.insert(worker, WorkerState::Idle);
    }

    pub fn remove_worker(&mut self, worker: &WorkerId) -> Option<WorkerState> {
        self.workers.remove(worker)
    }

    /// Mark a worker idle again without touching whatever task it was
    /// bound to (spec §4.E step 5: a `TASK_RETURN`/`TASK_DECOMPOSE` frees
    /// the worker even though the task itself is re-queued rather than
    /// completed).
    pub fn free_worker(&mut self, worker: WorkerId) {
        self.workers.insert(worker, WorkerState::Idle);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// A point-in-time snapshot for `STATUS` (spec §4.H).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub queued: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub workers_idle: usize,
    pub workers_busy: usize,
}

pub use cancel::kill_workers;
pub use completion::on_task_end;
pub use dispatch::dispatch;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
