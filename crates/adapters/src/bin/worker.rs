// SPDX-License-Identifier: MIT

//! `smak-worker`: the thin process a job master dispatches recipe lines to
//! (spec §4.E). Connects, announces readiness twice (once on connect, once
//! after the environment is in hand), then loops executing `TASK`/`DIR`/
//! `CMD` triples via a shell and streaming their output back line by line.
//!
//! Invoked locally by the daemon, or remotely via `ssh host -R
//! port:localhost:port -- smak-worker`; either way this binary always
//! dials `127.0.0.1:<port>` (spec §4.E's "transport-only" distinction — it
//! has no idea whether it's local or tunneled).

use smak_adapters::error::AdapterError;
use smak_adapters::protocol::{WorkerInboundLine, WorkerOutboundLine};
use smak_core::TaskId;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    if let Err(err) = run().await {
        error!(error = %err, "smak-worker exiting");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AdapterError> {
    let addr = connect_address()?;
    let stream = TcpStream::connect(&addr).await.map_err(|source| AdapterError::Connect { addr: addr.clone(), source })?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    info!(%addr, "connected to job master");

    send(&mut write_half, WorkerOutboundLine::Ready).await?;
    receive_environment(&mut reader).await?;
    send(&mut write_half, WorkerOutboundLine::Ready).await?;

    loop {
        let Some(line) = read_line(&mut reader).await? else {
            info!("master closed the connection, exiting");
            return Ok(());
        };
        match WorkerInboundLine::parse(&line)? {
            WorkerInboundLine::Shutdown => {
                info!("received SHUTDOWN, exiting");
                return Ok(());
            }
            WorkerInboundLine::Task { task_id } => {
                let dir = expect_dir(&mut reader).await?;
                let command = expect_cmd(&mut reader).await?;
                let exit_code = run_task(task_id, &dir, &command, &mut write_half).await?;
                send(&mut write_half, WorkerOutboundLine::TaskEnd { task_id, exit_code }).await?;
                send(&mut write_half, WorkerOutboundLine::Ready).await?;
            }
            other => {
                warn!(?other, "unexpected frame while idle, ignoring");
            }
        }
    }
}

fn connect_address() -> Result<String, AdapterError> {
    let value = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SMAK_WORKER_ADDR").ok())
        .ok_or_else(|| AdapterError::MalformedFrame("usage: smak-worker <port|host:port>".to_string()))?;
    if value.contains(':') {
        Ok(value)
    } else {
        Ok(format!("127.0.0.1:{value}"))
    }
}

async fn receive_environment(reader: &mut BufReader<OwnedReadHalf>) -> Result<(), AdapterError> {
    loop {
        let Some(line) = read_line(reader).await? else {
            return Err(AdapterError::UnexpectedClose { expected: "ENV_END" });
        };
        match WorkerInboundLine::parse(&line)? {
            WorkerInboundLine::Env { key, value } => std::env::set_var(key, value),
            WorkerInboundLine::EnvEnd => return Ok(()),
            other => return Err(AdapterError::MalformedFrame(format!("expected ENV or ENV_END, got {other:?}"))),
        }
    }
}

async fn expect_dir(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, AdapterError> {
    let Some(line) = read_line(reader).await? else {
        return Err(AdapterError::UnexpectedClose { expected: "DIR" });
    };
    match WorkerInboundLine::parse(&line)? {
        WorkerInboundLine::Dir { path } => Ok(path),
        other => Err(AdapterError::MalformedFrame(format!("expected DIR, got {other:?}"))),
    }
}

async fn expect_cmd(reader: &mut BufReader<OwnedReadHalf>) -> Result<String, AdapterError> {
    let Some(line) = read_line(reader).await? else {
        return Err(AdapterError::UnexpectedClose { expected: "CMD" });
    };
    match WorkerInboundLine::parse(&line)? {
        WorkerInboundLine::Cmd { command } => Ok(command),
        other => Err(AdapterError::MalformedFrame(format!("expected CMD, got {other:?}"))),
    }
}

async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<String>, AdapterError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, line: WorkerOutboundLine) -> Result<(), AdapterError> {
    writer.write_all(format!("{}\n", line.encode()).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Runs one recipe line to completion, streaming its stdout/stderr back as
/// `OUTPUT`/`ERROR` frames as they arrive rather than buffering to the end
/// (spec §4.E, generalizing the teacher's buffered `subprocess::run_with_timeout`
/// shape to a streaming one — there is no per-task timeout, spec §5).
async fn run_task(task_id: TaskId, dir: &str, command: &str, writer: &mut OwnedWriteHalf) -> Result<i32, AdapterError> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AdapterError::SpawnFailed(e.to_string()))?;

    let stdout = child.stdout.take().ok_or_else(|| AdapterError::SpawnFailed("child has no stdout pipe".to_string()))?;
    let stderr = child.stderr.take().ok_or_else(|| AdapterError::SpawnFailed("child has no stderr pipe".to_string()))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerOutboundLine>();

    let out_tx = tx.clone();
    let stdout_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = out_tx.send(WorkerOutboundLine::Output(line));
        }
    });
    let err_tx = tx.clone();
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = err_tx.send(WorkerOutboundLine::Error(line));
        }
    });
    drop(tx);

    while let Some(frame) = rx.recv().await {
        send(writer, frame).await?;
    }
    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let status = child.wait().await.map_err(|e| AdapterError::SpawnFailed(e.to_string()))?;
    info!(%task_id, exit_code = status.code().unwrap_or(-1), "task finished");
    Ok(status.code().unwrap_or(-1))
}
