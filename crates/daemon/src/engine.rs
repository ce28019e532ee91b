// SPDX-License-Identifier: MIT

//! The engine loop (spec §5: "there is only one thread of control
//! touching the graph"): the single task that owns the [`Master`] and
//! turns [`Event`]s from [`crate::listener`] into method calls, executing
//! every [`MasterAction`] those calls return by writing to the right
//! socket. Matches the teacher's "Listener task does socket I/O and emits
//! events onto an `EventBus`; engine loop processes them sequentially"
//! split, scaled down from the teacher's durable `EventBus`-over-`Wal` to
//! a plain `mpsc` channel — `Master`'s own completion-event
//! [`smak_storage::MasterWal`] is the only durability this system needs
//! (see `smak-storage`), so the transport-level event stream itself
//! doesn't have to survive a crash.

use crate::listener::Event;
use crate::protocol::CliCommand;
use smak_adapters::{WorkerInboundLine, WorkerOutboundLine};
use smak_core::{ClientId, TaskId, WorkerId};
use smak_engine::{dispatch, kill_workers, on_task_end, Master, MasterAction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tracing::{info, warn};

/// How often the loop wakes up with nothing else to do, to drive
/// `RESCAN --auto` (spec §4.F).
const TICK_INTERVAL: Duration = Duration::from_secs(5);

pub struct EngineOptions {
    pub auto_rescan: bool,
}

/// A worker's position in the two-`READY` handshake (spec §4.E steps 1-2):
/// environment bindings are sent after the *first* `READY`, and the
/// worker is only handed tasks after its *second*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerStage {
    JustConnected,
    EnvSent,
}

/// Everything the engine loop remembers about live connections that
/// `Master` itself deliberately doesn't (it never touches a socket) —
/// grouped so the event-handling functions below don't drown in
/// parameters.
struct Transport {
    control_clients: HashMap<ClientId, UnboundedSender<String>>,
    observer_clients: HashMap<ClientId, UnboundedSender<String>>,
    cli_owner: Option<ClientId>,
    workers: HashMap<WorkerId, UnboundedSender<WorkerInboundLine>>,
    worker_stage: HashMap<WorkerId, WorkerStage>,
    worker_task: HashMap<WorkerId, TaskId>,
    task_worker: HashMap<TaskId, WorkerId>,
    /// Accumulated `OUTPUT`/`ERROR` text per in-flight task, consulted by
    /// the auto-retry race-pattern match (spec §4.F completion step 3).
    task_output: HashMap<TaskId, String>,
    /// Mirrors every `ENV K=V` applied so far, so a newly connected
    /// worker can be caught up (`Master`'s own `env` map is private to
    /// `smak-engine`, by design — it only needs to broadcast deltas).
    env: HashMap<String, String>,
}

impl Transport {
    fn new() -> Self {
        Self {
            control_clients: HashMap::new(),
            observer_clients: HashMap::new(),
            cli_owner: None,
            workers: HashMap::new(),
            worker_stage: HashMap::new(),
            worker_task: HashMap::new(),
            task_worker: HashMap::new(),
            task_output: HashMap::new(),
            env: HashMap::new(),
        }
    }

    fn reply(&self, client: &ClientId, line: impl Into<String>) {
        let line = line.into();
        if let Some(tx) = self.control_clients.get(client) {
            let _ = tx.send(line);
        }
    }

    fn broadcast_to_attached(&self, line: impl Into<String>) {
        let line = line.into();
        for tx in self.control_clients.values() {
            let _ = tx.send(line.clone());
        }
        for tx in self.observer_clients.values() {
            let _ = tx.send(line.clone());
        }
    }

    fn broadcast_watch(&self, master: &Master, path: &str) {
        let line = format!("WATCH:{path}");
        for client in self.control_clients.keys() {
            if master.is_watching(client.clone()) {
                self.reply(client, line.clone());
            }
        }
        for client in self.observer_clients.keys() {
            if master.is_watching(client.clone()) {
                if let Some(tx) = self.observer_clients.get(client) {
                    let _ = tx.send(line.clone());
                }
            }
        }
    }

    /// Carry out every side effect a `Master` method handed back. This is
    /// the only place worker/client sockets are written to in response to
    /// graph state changes.
    fn execute(&mut self, actions: Vec<MasterAction>) {
        for action in actions {
            match action {
                MasterAction::Dispatch { worker, task_id, dir, command, echo_lines } => {
                    let Some(tx) = self.workers.get(&worker) else {
                        warn!(%worker, %task_id, "dispatch to a worker with no open socket, dropping");
                        continue;
                    };
                    let _ = tx.send(WorkerInboundLine::Task { task_id });
                    let _ = tx.send(WorkerInboundLine::Dir { path: dir.to_string_lossy().into_owned() });
                    let _ = tx.send(WorkerInboundLine::Cmd { command });
                    self.worker_task.insert(worker.clone(), task_id);
                    self.task_worker.insert(task_id, worker);
                    for line in echo_lines {
                        self.broadcast_to_attached(line);
                    }
                }
                MasterAction::ShutdownWorker(worker) => {
                    if let Some(tx) = self.workers.get(&worker) {
                        let _ = tx.send(WorkerInboundLine::Shutdown);
                    }
                }
                MasterAction::BroadcastEnv(name, value) => {
                    self.env.insert(name.clone(), value.clone());
                    for tx in self.workers.values() {
                        let _ = tx.send(WorkerInboundLine::Env { key: name.clone(), value: value.clone() });
                    }
                }
                MasterAction::JobComplete { client, target, exit_code } => {
                    self.reply(&client, format!("JOB_COMPLETE {target} {exit_code}"));
                }
                MasterAction::Watch { client, path } => {
                    self.reply(&client, format!("WATCH:{path}"));
                }
            }
        }
    }

    fn forget_task(&mut self, task_id: TaskId) -> (Option<WorkerId>, String) {
        let worker = self.task_worker.remove(&task_id);
        if let Some(w) = &worker {
            self.worker_task.remove(w);
        }
        (worker, self.task_output.remove(&task_id).unwrap_or_default())
    }
}

/// Run the engine loop to completion. Returns once `SHUTDOWN` is issued
/// or the shared `shutdown` signal fires (SIGTERM/SIGINT, see `main.rs`).
pub async fn run(mut master: Master, mut events: UnboundedReceiver<Event>, shutdown: Arc<Notify>, options: EngineOptions) {
    let mut transport = Transport::new();
    let mut tick = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("shutdown signal received, killing workers and exiting");
                let actions = kill_workers(&mut master);
                transport.execute(actions);
                break;
            }
            _ = tick.tick() => {
                if options.auto_rescan {
                    master.rescan();
                }
                let actions = dispatch(&mut master);
                transport.execute(actions);
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if !handle_event(&mut master, &mut transport, event) {
                    break;
                }
            }
        }
    }
}

/// Handle one [`Event`]. Returns `false` when the loop should exit
/// (a `SHUTDOWN` verb was processed).
fn handle_event(master: &mut Master, transport: &mut Transport, event: Event) -> bool {
    match event {
        Event::ControlConnected { client, tx } => {
            transport.control_clients.insert(client, tx);
        }
        Event::ControlDisconnected { client } => {
            transport.control_clients.remove(&client);
            master.watch_stop(client.clone());
            if transport.cli_owner.as_ref() == Some(&client) {
                transport.cli_owner = None;
            }
        }
        Event::ControlMalformed { client, error } => {
            transport.reply(&client, format!("ERROR {error}"));
        }
        Event::ControlLine { client, command } => {
            if matches!(command, CliCommand::Shutdown) {
                transport.reply(&client, "SHUTDOWN_ACK");
                let actions = kill_workers(master);
                transport.execute(actions);
                return false;
            }
            handle_control_command(master, transport, client, command);
        }
        Event::ObserverConnected { client, tx } => {
            transport.observer_clients.insert(client, tx);
        }
        Event::ObserverDisconnected { client } => {
            transport.observer_clients.remove(&client);
            master.watch_stop(client);
        }
        Event::WorkerConnected { worker, tx } => {
            transport.workers.insert(worker.clone(), tx);
            transport.worker_stage.insert(worker, WorkerStage::JustConnected);
        }
        Event::WorkerDisconnected { worker } => {
            transport.workers.remove(&worker);
            transport.worker_stage.remove(&worker);
            master.remove_worker(&worker);
            if let Some(task_id) = transport.worker_task.remove(&worker) {
                transport.task_worker.remove(&task_id);
                let captured = transport.task_output.remove(&task_id).unwrap_or_default();
                warn!(%worker, %task_id, "worker socket closed mid-task, treating as a failure");
                let actions = on_task_end(master, worker, task_id, 1, &captured);
                transport.execute(actions);
                let actions = dispatch(master);
                transport.execute(actions);
            }
        }
        Event::WorkerFrame { worker, frame } => handle_worker_frame(master, transport, worker, frame),
        Event::FsChange { path } => {
            master.mark_dirty(&path);
            transport.broadcast_watch(master, &path);
        }
        Event::Tick => {}
    }
    true
}

fn handle_control_command(master: &mut Master, transport: &mut Transport, client: ClientId, command: CliCommand) {
    match command {
        CliCommand::SubmitJob { target, dir: _, command: _ } => {
            let resolved = if target.is_empty() { master.default_goal_name() } else { Some(target) };
            match resolved {
                Some(target) => {
                    let actions = master.submit_job(&target, client);
                    transport.execute(actions);
                    let actions = dispatch(master);
                    transport.execute(actions);
                }
                None => transport.reply(&client, "JOB_COMPLETE  1"),
            }
        }
        CliCommand::Status => {
            let status = master.status();
            transport.reply(
                &client,
                format!(
                    "queued={} in_progress={} completed={} failed={} workers_idle={} workers_busy={}",
                    status.queued, status.in_progress, status.completed, status.failed, status.workers_idle, status.workers_busy
                ),
            );
            transport.reply(&client, "STATUS_END");
        }
        CliCommand::ListTasks => {
            for task in master.list_tasks() {
                transport.reply(&client, task);
            }
            transport.reply(&client, "TASKS_END");
        }
        CliCommand::ListStale => {
            for target in master.list_stale() {
                transport.reply(&client, format!("STALE:{target}"));
            }
            transport.reply(&client, "STALE_END");
        }
        CliCommand::ListFiles => {
            for file in master.list_files() {
                transport.reply(&client, file);
            }
            transport.reply(&client, "FILES_END");
        }
        CliCommand::Needs(file) => {
            for target in targets_needing(master, &file) {
                transport.reply(&client, format!("NEEDS:{target}"));
            }
            transport.reply(&client, "NEEDS_END");
        }
        CliCommand::MarkDirty(file) => {
            master.mark_dirty(&file);
        }
        CliCommand::Assume(target) => {
            master.assume(&target);
            transport.reply(&client, "ASSUME_OK");
        }
        CliCommand::WatchStart => {
            master.watch_start(client.clone());
            transport.reply(&client, "WATCH_STARTED");
        }
        CliCommand::WatchStop => {
            master.watch_stop(client);
        }
        CliCommand::KillWorkers => {
            let actions = kill_workers(master);
            transport.execute(actions);
            transport.reply(&client, "WORKERS_KILLED");
        }
        CliCommand::AddWorker(_) => {
            // Actual process spawning is the CLI/daemon-launch concern
            // (`ssh`/local `smak-worker` invocation); the engine loop only
            // ever learns about a worker by accepting its connection.
            transport.reply(&client, "ADD_WORKER_REQUESTED");
        }
        CliCommand::RemoveWorker(n) => {
            let victims: Vec<WorkerId> = transport.workers.keys().take(n).cloned().collect();
            let mut actions = Vec::new();
            for worker in victims {
                actions.push(MasterAction::ShutdownWorker(worker));
            }
            transport.execute(actions);
            transport.reply(&client, "WORKERS_REMOVED");
        }
        CliCommand::RestartWorkers(_) => {
            let actions = kill_workers(master);
            transport.execute(actions);
            transport.reply(&client, "WORKERS_RESTART_REQUESTED");
        }
        CliCommand::Reset => {
            master.reset();
            transport.reply(&client, "RESET_OK");
        }
        CliCommand::Shutdown => unreachable!("handled by the caller before dispatch"),
        CliCommand::ClientOwner(_pid) => {
            // spec §4.H: "lets only one interactive client at a time own
            // stdout/stderr for the tty". Workers never see this verb —
            // their wire protocol (spec §4.E) has no frame for it, so
            // "broadcast to workers" in the response column is read as
            // "nothing workers need to react to", not a literal frame.
            transport.cli_owner = Some(client);
        }
        CliCommand::Env { name, value } => {
            let action = master.set_env(name, value);
            transport.execute(vec![action]);
        }
    }
}

fn handle_worker_frame(master: &mut Master, transport: &mut Transport, worker: WorkerId, frame: WorkerOutboundLine) {
    match frame {
        WorkerOutboundLine::Ready => handle_worker_ready(master, transport, worker),
        WorkerOutboundLine::Output(line) => record_and_forward(transport, &worker, "OUTPUT", line),
        WorkerOutboundLine::Error(line) => record_and_forward(transport, &worker, "ERROR", line),
        WorkerOutboundLine::TaskEnd { task_id, exit_code } => {
            let (recorded_worker, captured) = transport.forget_task(task_id);
            if recorded_worker.as_ref().is_some_and(|w| *w != worker) {
                warn!(%worker, %task_id, "TASK_END from a worker that isn't the one this task was dispatched to");
            }
            let actions = on_task_end(master, worker, task_id, exit_code, &captured);
            transport.execute(actions);
            let actions = dispatch(master);
            transport.execute(actions);
        }
        WorkerOutboundLine::TaskReturn { task_id, reason } => {
            transport.forget_task(task_id);
            master.free_worker(worker);
            let actions = master.task_return(task_id, &reason);
            transport.execute(actions);
            let actions = dispatch(master);
            transport.execute(actions);
        }
        WorkerOutboundLine::TaskDecompose { task_id, subtargets } => {
            transport.forget_task(task_id);
            master.free_worker(worker);
            let actions = master.task_decompose(task_id, subtargets);
            transport.execute(actions);
            let actions = dispatch(master);
            transport.execute(actions);
        }
    }
}

fn handle_worker_ready(master: &mut Master, transport: &mut Transport, worker: WorkerId) {
    match transport.worker_stage.get(&worker).copied() {
        Some(WorkerStage::JustConnected) => {
            let Some(tx) = transport.workers.get(&worker) else { return };
            for (key, value) in transport.env.clone() {
                let _ = tx.send(WorkerInboundLine::Env { key, value });
            }
            let _ = tx.send(WorkerInboundLine::EnvEnd);
            transport.worker_stage.insert(worker, WorkerStage::EnvSent);
        }
        Some(WorkerStage::EnvSent) | None => {
            master.add_worker(worker.clone());
            transport.worker_stage.remove(&worker);
            let actions = dispatch(master);
            transport.execute(actions);
        }
    }
}

fn record_and_forward(transport: &mut Transport, worker: &WorkerId, verb: &str, line: String) {
    if let Some(task_id) = transport.worker_task.get(worker) {
        transport.task_output.entry(*task_id).or_default().push_str(&format!("{verb} {line}\n"));
    }
    transport.broadcast_to_attached(format!("{verb} {line}"));
}

/// `NEEDS:file` (spec §4.H): which rules name `file` as a prerequisite.
/// Not part of `Master`'s public contract (it's a plain query over the
/// already-parsed database, not a state transition), so it lives here.
fn targets_needing(master: &Master, file: &str) -> Vec<String> {
    let db = master.database();
    let file_target = db.interner.intern_target(file);
    db.all_rules()
        .filter(|rule| rule.prerequisites.contains(&file_target))
        .filter_map(|rule| db.interner.resolve_target(rule.target))
        .collect()
}

