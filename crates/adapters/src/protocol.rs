// SPDX-License-Identifier: MIT

//! Line-oriented wire protocol spoken between `smakd`'s worker listener and
//! the `smak-worker` binary (spec §4.E). Pure encode/decode, no I/O — the
//! worker binary and (eventually) the daemon's worker listener each drive
//! their own socket and call into these functions line by line.

use crate::error::AdapterError;
use smak_core::TaskId;

/// One physical line the daemon sends down a worker socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerInboundLine {
    /// One environment variable binding (sent before the worker's second
    /// `READY`).
    Env { key: String, value: String },
    /// Ends the environment-binding phase.
    EnvEnd,
    /// Starts a task; always followed by a `Dir` then a `Cmd` line.
    Task { task_id: TaskId },
    Dir { path: String },
    Cmd { command: String },
    /// Finish the current line, then exit.
    Shutdown,
}

impl WorkerInboundLine {
    pub fn parse(line: &str) -> Result<Self, AdapterError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "ENV_END" {
            return Ok(Self::EnvEnd);
        }
        if line == "SHUTDOWN" {
            return Ok(Self::Shutdown);
        }
        if let Some(rest) = line.strip_prefix("ENV ") {
            let (key, value) = rest.split_once('=').ok_or_else(|| AdapterError::MalformedFrame(line.to_string()))?;
            return Ok(Self::Env { key: key.to_string(), value: value.to_string() });
        }
        if let Some(rest) = line.strip_prefix("TASK ") {
            let id: u64 = rest.trim().parse().map_err(|_| AdapterError::MalformedFrame(line.to_string()))?;
            return Ok(Self::Task { task_id: TaskId(id) });
        }
        if let Some(rest) = line.strip_prefix("DIR ") {
            return Ok(Self::Dir { path: rest.to_string() });
        }
        if let Some(rest) = line.strip_prefix("CMD ") {
            return Ok(Self::Cmd { command: rest.to_string() });
        }
        Err(AdapterError::MalformedFrame(line.to_string()))
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Env { key, value } => format!("ENV {key}={value}"),
            Self::EnvEnd => "ENV_END".to_string(),
            Self::Task { task_id } => format!("TASK {task_id}"),
            Self::Dir { path } => format!("DIR {path}"),
            Self::Cmd { command } => format!("CMD {command}"),
            Self::Shutdown => "SHUTDOWN".to_string(),
        }
    }
}

/// One physical line a worker sends back to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutboundLine {
    Ready,
    Output(String),
    Error(String),
    TaskEnd { task_id: TaskId, exit_code: i32 },
    TaskReturn { task_id: TaskId, reason: String },
    TaskDecompose { task_id: TaskId, subtargets: Vec<String> },
}

impl WorkerOutboundLine {
    pub fn parse(line: &str) -> Result<Self, AdapterError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "READY" {
            return Ok(Self::Ready);
        }
        if let Some(rest) = line.strip_prefix("OUTPUT ") {
            return Ok(Self::Output(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("ERROR ") {
            return Ok(Self::Error(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("TASK_END ") {
            let mut parts = rest.split_whitespace();
            let id: u64 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| AdapterError::MalformedFrame(line.to_string()))?;
            let exit_code: i32 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| AdapterError::MalformedFrame(line.to_string()))?;
            return Ok(Self::TaskEnd { task_id: TaskId(id), exit_code });
        }
        if let Some(rest) = line.strip_prefix("TASK_RETURN ") {
            let mut parts = rest.splitn(2, ' ');
            let id: u64 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| AdapterError::MalformedFrame(line.to_string()))?;
            let reason = parts.next().unwrap_or_default().to_string();
            return Ok(Self::TaskReturn { task_id: TaskId(id), reason });
        }
        if let Some(rest) = line.strip_prefix("TASK_DECOMPOSE ") {
            let mut parts = rest.split_whitespace();
            let id: u64 = parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| AdapterError::MalformedFrame(line.to_string()))?;
            let subtargets = parts.map(str::to_string).collect();
            return Ok(Self::TaskDecompose { task_id: TaskId(id), subtargets });
        }
        Err(AdapterError::MalformedFrame(line.to_string()))
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Ready => "READY".to_string(),
            Self::Output(line) => format!("OUTPUT {line}"),
            Self::Error(line) => format!("ERROR {line}"),
            Self::TaskEnd { task_id, exit_code } => format!("TASK_END {task_id} {exit_code}"),
            Self::TaskReturn { task_id, reason } => format!("TASK_RETURN {task_id} {reason}"),
            Self::TaskDecompose { task_id, subtargets } => format!("TASK_DECOMPOSE {task_id} {}", subtargets.join(" ")),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
