// SPDX-License-Identifier: MIT

//! Finding, launching, and discovering an `smakd` for a given recipe file
//! (spec §4.I "build: fork/exec smakd if not already running"). Grounded
//! in the teacher's `daemon_process.rs` sibling-binary lookup and
//! PID-file-based liveness probing, scaled down from the teacher's single
//! user-level daemon to smak's one-daemon-per-project model: where the
//! teacher has one well-known socket path, smak needs a per-project
//! pointer file recording which pid is currently serving a given recipe
//! file's state directory, since the real discovery mechanism (the port
//! file under `$TMPDIR`) is itself keyed by that pid.

use crate::error::CliError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Where per-project daemon state (the pid pointer, matching the daemon's
/// own `Config::load` resolution) lives. Must agree with
/// `smak_daemon::config::Config::load`'s derivation or discovery breaks.
pub fn state_dir(cwd: &Path) -> PathBuf {
    match smak_storage::CacheDir::resolve(cwd) {
        smak_storage::CacheDir::Disabled => std::env::temp_dir().join("smak-state"),
        smak_storage::CacheDir::Path(dir) => dir,
    }
}

fn pid_file(cwd: &Path) -> PathBuf {
    state_dir(cwd).join("smakd.pid")
}

fn process_exists(pid: u32) -> bool {
    Command::new("kill").args(["-0", &pid.to_string()]).stdout(Stdio::null()).stderr(Stdio::null()).status().map(|s| s.success()).unwrap_or(false)
}

fn read_running_pid(cwd: &Path) -> Option<u32> {
    let pid: u32 = std::fs::read_to_string(pid_file(cwd)).ok()?.trim().parse().ok()?;
    process_exists(pid).then_some(pid)
}

/// Find the `smakd` binary next to the running `smak` executable, falling
/// back to `$PATH` (matches the teacher's `find_ojd_binary` fallback chain,
/// minus the dev-build `CARGO_MANIFEST_DIR` special case, which only
/// matters for the teacher's own workspace layout).
fn find_smakd_binary() -> PathBuf {
    if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        let sibling = dir.join("smakd");
        if sibling.exists() {
            return sibling;
        }
    }
    PathBuf::from("smakd")
}

/// Spawn `smakd <recipe-file> <cwd> [VAR=VALUE...]` in the background and
/// wait for its port file to appear (spec §6 port-file protocol), returning
/// `(observer_port, control_port, worker_port)`.
fn spawn_daemon(recipe_file: &Path, cwd: &Path, overrides: &[(String, String)]) -> Result<(u16, u16, u16), CliError> {
    let child = Command::new(find_smakd_binary())
        .arg(recipe_file)
        .arg(cwd)
        .args(overrides.iter().map(|(k, v)| format!("{k}={v}")))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| CliError::DaemonStartFailed(e.to_string()))?;
    let pid = child.id();

    let dir = state_dir(cwd);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(pid_file(cwd), pid.to_string())?;

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(ports) = smak_daemon::portfile::read(pid) {
            return Ok(ports);
        }
        if !process_exists(pid) {
            return Err(CliError::DaemonStartFailed("smakd exited before writing its port file".to_string()));
        }
        if Instant::now() > deadline {
            return Err(CliError::DaemonStartFailed("timed out waiting for smakd to become ready".to_string()));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

/// Find a running `smakd` for this recipe file/cwd, or start one.
/// Returns `(observer_port, control_port, worker_port)`. `overrides` only
/// take effect on a freshly-spawned daemon — an already-running one keeps
/// whatever variables it started with.
pub fn ensure_daemon(recipe_file: &Path, cwd: &Path, overrides: &[(String, String)]) -> Result<(u16, u16, u16), CliError> {
    if let Some(pid) = read_running_pid(cwd) {
        if let Ok(ports) = smak_daemon::portfile::read(pid) {
            return Ok(ports);
        }
    }
    spawn_daemon(recipe_file, cwd, overrides)
}

/// Attach-only lookup (spec §4.I "attach" mode): never launches a daemon.
pub fn find_running_daemon(cwd: &Path) -> Result<(u16, u16, u16), CliError> {
    let pid = read_running_pid(cwd).ok_or_else(|| CliError::DaemonStartFailed("no smakd is running for this project".to_string()))?;
    smak_daemon::portfile::read(pid).map_err(|e| CliError::DaemonStartFailed(e.to_string()))
}
