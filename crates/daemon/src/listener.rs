// SPDX-License-Identifier: MIT

//! Socket I/O (spec §5: "the master runs an event loop multiplexing:
//! master-control socket..., worker-listen socket..., per-worker
//! sockets..., observer socket"). Mirrors the teacher's split: this module
//! does nothing but read/write sockets and turn bytes into [`Event`]s;
//! `main`'s engine loop is the only place that touches the [`smak_engine::Master`]
//! it drives (spec §5 "there is only one thread of control touching the
//! graph").

use crate::error::DaemonError;
use crate::protocol::CliCommand;
use smak_adapters::{WorkerInboundLine, WorkerOutboundLine};
use smak_core::{ClientId, WorkerId};
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

/// Everything the engine loop reacts to. Every variant either originates
/// from a socket accept/read, or is a purely-internal timer tick.
#[derive(Debug)]
pub enum Event {
    ControlConnected { client: ClientId, tx: UnboundedSender<String> },
    ControlLine { client: ClientId, command: CliCommand },
    ControlMalformed { client: ClientId, error: String },
    ControlDisconnected { client: ClientId },

    ObserverConnected { client: ClientId, tx: UnboundedSender<String> },
    ObserverDisconnected { client: ClientId },

    WorkerConnected { worker: WorkerId, tx: UnboundedSender<WorkerInboundLine> },
    WorkerFrame { worker: WorkerId, frame: WorkerOutboundLine },
    WorkerDisconnected { worker: WorkerId },

    FsChange { path: String },

    Tick,
}

/// The three sockets spec §4.F lists, bound to ephemeral local ports.
pub struct Listeners {
    pub control: TcpListener,
    pub worker: TcpListener,
    pub observer: TcpListener,
}

pub struct BoundPorts {
    pub control: u16,
    pub worker: u16,
    pub observer: u16,
}

impl Listeners {
    pub async fn bind() -> std::io::Result<(Self, BoundPorts)> {
        let control = TcpListener::bind("127.0.0.1:0").await?;
        let worker = TcpListener::bind("127.0.0.1:0").await?;
        let observer = TcpListener::bind("127.0.0.1:0").await?;
        let ports = BoundPorts {
            control: control.local_addr()?.port(),
            worker: worker.local_addr()?.port(),
            observer: observer.local_addr()?.port(),
        };
        Ok((Self { control, worker, observer }, ports))
    }

    /// Accept loops for all three roles, each forwarding onto `events`.
    /// Runs until a listener's socket errors out (which only happens if
    /// the underlying fd is closed from outside, e.g. process shutdown).
    pub fn spawn_accept_loops(self, events: UnboundedSender<Event>) {
        let control_events = events.clone();
        tokio::spawn(async move {
            accept_control_loop(self.control, control_events).await;
        });
        let worker_events = events.clone();
        tokio::spawn(async move {
            accept_worker_loop(self.worker, worker_events).await;
        });
        tokio::spawn(async move {
            accept_observer_loop(self.observer, events).await;
        });
    }
}

async fn accept_control_loop(listener: TcpListener, events: UnboundedSender<Event>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            warn!("control listener closed, no more clients will be accepted");
            return;
        };
        let client = ClientId::new(addr.to_string());
        spawn_control_connection(stream, client, events.clone());
    }
}

async fn accept_observer_loop(listener: TcpListener, events: UnboundedSender<Event>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            warn!("observer listener closed, no more clients will be accepted");
            return;
        };
        let client = ClientId::new(addr.to_string());
        spawn_observer_connection(stream, client, events.clone());
    }
}

async fn accept_worker_loop(listener: TcpListener, events: UnboundedSender<Event>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            warn!("worker listener closed, no more workers will be accepted");
            return;
        };
        let worker = WorkerId::new(addr.to_string());
        spawn_worker_connection(stream, worker, events.clone());
    }
}

/// A control connection: lines in are parsed as [`CliCommand`]s, lines out
/// are whatever the engine loop decides to send back (status output,
/// `OUTPUT`/`ERROR`/`JOB_COMPLETE` for a `SUBMIT_JOB`, sentinel lines).
fn spawn_control_connection(stream: TcpStream, client: ClientId, events: UnboundedSender<Event>) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let _ = events.send(Event::ControlConnected { client: client.clone(), tx });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
    });

    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    match CliCommand::from_str(trimmed) {
                        Ok(command) => {
                            let _ = events.send(Event::ControlLine { client: client.clone(), command });
                        }
                        Err(e) => {
                            let _ = events.send(Event::ControlMalformed { client: client.clone(), error: e.to_string() });
                        }
                    }
                }
            }
        }
        let _ = events.send(Event::ControlDisconnected { client });
    });
}

/// An observer connection: read-only (spec §4.H: "other connected clients
/// become read-only observers"), so no reader task — only a writer fed by
/// the engine loop's broadcasts. We still need to detect disconnection,
/// which a read-only socket does via a zero-length read on its (unused)
/// read half.
fn spawn_observer_connection(stream: TcpStream, client: ClientId, events: UnboundedSender<Event>) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let _ = events.send(Event::ObserverConnected { client: client.clone(), tx });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
    });

    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut buf = [0u8; 1];
        loop {
            match tokio::io::AsyncReadExt::read(&mut reader, &mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = events.send(Event::ObserverDisconnected { client });
    });
}

/// A worker connection (spec §4.E): the daemon's side of the worker wire
/// protocol. Frames in (`READY`/`OUTPUT`/`ERROR`/`TASK_END`/...) are
/// forwarded as events; frames out (`ENV`/`TASK`/`DIR`/`CMD`/`SHUTDOWN`)
/// are whatever the engine loop pushes onto `tx`.
fn spawn_worker_connection(stream: TcpStream, worker: WorkerId, events: UnboundedSender<Event>) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerInboundLine>();
    let _ = events.send(Event::WorkerConnected { worker: worker.clone(), tx });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if write_half.write_all(format!("{}\n", line.encode()).as_bytes()).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
    });

    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    match WorkerOutboundLine::parse(trimmed) {
                        Ok(frame) => {
                            let _ = events.send(Event::WorkerFrame { worker: worker.clone(), frame });
                        }
                        Err(e) => {
                            debug!(worker = %worker, error = %e, "malformed worker frame, ignoring");
                        }
                    }
                }
            }
        }
        let _ = events.send(Event::WorkerDisconnected { worker });
    });
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
