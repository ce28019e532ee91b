// SPDX-License-Identifier: MIT

//! The CLI/attach wire protocol (spec §4.H): a tagged-variant `CliCommand`
//! parsed by a `FromStr` impl with an exhaustive `match`, replacing the
//! source's string-compare cascade (spec §9 redesign flag, carried over
//! as architecture rather than merely noted).
//!
//! Line-oriented text, not the teacher's length-prefixed JSON — the wire
//! format this crate speaks is a deliberate divergence from the teacher,
//! since spec §4.H is explicit and testable about verb/response framing.

use crate::error::DaemonError;
use std::str::FromStr;

/// One request line from a connected CLI/observer client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// `SUBMIT_JOB target dir command` — `dir`/`command` are informational
    /// (the working directory and original invocation the CLI ran from);
    /// the master only needs `target`, since it already owns the parsed
    /// graph and doesn't take direction from the client about how to build it.
    SubmitJob { target: String, dir: String, command: String },
    Status,
    ListTasks,
    ListStale,
    ListFiles,
    Needs(String),
    MarkDirty(String),
    Assume(String),
    WatchStart,
    WatchStop,
    KillWorkers,
    AddWorker(usize),
    RemoveWorker(usize),
    RestartWorkers(usize),
    Reset,
    Shutdown,
    ClientOwner(u32),
    Env { name: String, value: String },
}

impl FromStr for CliCommand {
    type Err = DaemonError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("NEEDS:") {
            return Ok(Self::Needs(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("MARK_DIRTY:") {
            return Ok(Self::MarkDirty(rest.to_string()));
        }
        if let Some(rest) = line.strip_prefix("ASSUME:") {
            return Ok(Self::Assume(rest.to_string()));
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let verb = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match verb {
            "SUBMIT_JOB" => {
                let mut fields = rest.splitn(3, char::is_whitespace);
                let target = fields
                    .next()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| DaemonError::MalformedCommand("SUBMIT_JOB requires a target".to_string()))?
                    .to_string();
                let dir = fields.next().unwrap_or_default().to_string();
                let command = fields.next().unwrap_or_default().to_string();
                Ok(Self::SubmitJob { target, dir, command })
            }
            "STATUS" => Ok(Self::Status),
            "LIST_TASKS" => Ok(Self::ListTasks),
            "LIST_STALE" => Ok(Self::ListStale),
            "LIST_FILES" => Ok(Self::ListFiles),
            "WATCH_START" => Ok(Self::WatchStart),
            "WATCH_STOP" => Ok(Self::WatchStop),
            "KILL_WORKERS" => Ok(Self::KillWorkers),
            "ADD_WORKER" => Ok(Self::AddWorker(parse_count(rest)?)),
            "REMOVE_WORKER" => Ok(Self::RemoveWorker(parse_count(rest)?)),
            "RESTART_WORKERS" => Ok(Self::RestartWorkers(parse_count(rest)?)),
            "RESET" => Ok(Self::Reset),
            "SHUTDOWN" => Ok(Self::Shutdown),
            "CLI_OWNER" => {
                let pid = rest.parse().map_err(|_| DaemonError::MalformedCommand(format!("CLI_OWNER expects a pid, got {rest:?}")))?;
                Ok(Self::ClientOwner(pid))
            }
            "ENV" => {
                let (name, value) = rest
                    .split_once('=')
                    .ok_or_else(|| DaemonError::MalformedCommand(format!("ENV expects NAME=VALUE, got {rest:?}")))?;
                Ok(Self::Env { name: name.to_string(), value: value.to_string() })
            }
            "" => Err(DaemonError::MalformedCommand("empty command line".to_string())),
            other => Err(DaemonError::UnknownVerb(other.to_string())),
        }
    }
}

fn parse_count(rest: &str) -> Result<usize, DaemonError> {
    rest.trim().parse().map_err(|_| DaemonError::MalformedCommand(format!("expected a worker count, got {rest:?}")))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
