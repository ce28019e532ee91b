// SPDX-License-Identifier: MIT

//! Port-file protocol (spec §6): "on master startup, write
//! `<observer-port>\n<master-port>\n` to a per-pid file under the user's
//! tmp directory, so attach clients can discover the master by PID." Same
//! shape as the teacher's `write_startup_marker` — a plain file write that
//! happens before (and independently of) the tracing subscriber, so a
//! client polling for it never races the logging pipeline.
//!
//! A third line carries the worker-listen port: the CLI needs it to spawn
//! (or SSH-tunnel) `smak-worker` processes pointed at this master, even
//! though spec.md's own port-file line only names the two client-facing
//! ports.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where the port file for `pid` lives.
pub fn path_for(pid: u32) -> PathBuf {
    std::env::temp_dir().join(format!("smak-{pid}.ports"))
}

/// Write `<observer-port>\n<control-port>\n<worker-port>\n` for the
/// current process.
pub fn write(observer_port: u16, control_port: u16, worker_port: u16) -> std::io::Result<PathBuf> {
    let path = path_for(std::process::id());
    let mut file = fs::OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    writeln!(file, "{observer_port}")?;
    writeln!(file, "{control_port}")?;
    writeln!(file, "{worker_port}")?;
    Ok(path)
}

/// Read back `(observer_port, control_port, worker_port)` for `pid`, for
/// attach clients and for the CLI's worker-spawning.
pub fn read(pid: u32) -> std::io::Result<(u16, u16, u16)> {
    let contents = fs::read_to_string(path_for(pid))?;
    let mut lines = contents.lines();
    let observer = parse_port(lines.next())?;
    let control = parse_port(lines.next())?;
    let worker = parse_port(lines.next())?;
    Ok((observer, control, worker))
}

fn parse_port(line: Option<&str>) -> std::io::Result<u16> {
    line.and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed port file"))
}

/// Best-effort cleanup on clean shutdown; a stale file left by a crash is
/// harmless since attach clients verify the pid is still alive before
/// trusting it.
pub fn remove(pid: u32) {
    let _ = fs::remove_file(path_for(pid));
}

#[cfg(test)]
#[path = "portfile_tests.rs"]
mod tests;
