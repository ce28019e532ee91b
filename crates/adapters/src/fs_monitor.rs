// SPDX-License-Identifier: MIT

//! FS-change monitor client (spec §4.G, component G).
//!
//! The monitor itself is a separate FUSE-backed process that observes
//! writes anywhere under a project's mount point and reports them over a
//! small custom wire protocol. This client discovers that process, keeps an
//! inode→path cache warm, and yields build-relevant paths to whatever is
//! watching the attached daemon.
//!
//! Linux-only by spec: on any other platform [`FsMonitorClient::connect`]
//! returns `Err(AdapterError::NoFuseMount)` after a single `tracing::warn!`,
//! never as a panic or a silent pretend-success.

use crate::error::AdapterError;
use smak_core::RuleDatabase;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Default extensions treated as build-relevant when nothing more specific
/// (a known target, or a pattern rule's suffix) matches. Overridable via
/// `SMAK_WATCH_EXTENSIONS` (colon-separated, with the leading dot).
const DEFAULT_WATCH_EXTENSIONS: &[&str] = &[".c", ".h", ".cc", ".cpp", ".hpp", ".rs", ".py", ".o", ".a"];

fn watch_extensions() -> Vec<String> {
    std::env::var("SMAK_WATCH_EXTENSIONS")
        .ok()
        .map(|v| v.split(':').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_else(|| DEFAULT_WATCH_EXTENSIONS.iter().map(|s| s.to_string()).collect())
}

/// One build-relevant filesystem event, translated to a project-relative
/// path and tagged with the pid of the process that touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub pid: u32,
    pub path: PathBuf,
}

/// A connected FS-change monitor client.
pub struct FsMonitorClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
    mount_root: PathBuf,
    inode_cache: HashMap<u64, PathBuf>,
}

impl FsMonitorClient {
    /// Discover the monitor's mount and port, and connect.
    ///
    /// Non-Linux platforms have no FUSE monitor to find; this is an
    /// explicit spec boundary, not a missing feature.
    pub async fn connect() -> Result<Self, AdapterError> {
        if !cfg!(target_os = "linux") {
            warn!("FS-change monitor is Linux-only, skipping (spec §4.G boundary)");
            return Err(AdapterError::NoFuseMount);
        }
        let root = discover_fuse_root().await?;
        let port = locate_monitor_port(&root)?;
        let addr = format!("127.0.0.1:{port}");
        let stream = TcpStream::connect(&addr).await.map_err(|source| AdapterError::Connect { addr: addr.clone(), source })?;
        let (read_half, write_half) = stream.into_split();
        debug!(%addr, root = %root.display(), "connected to FS-change monitor");
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            mount_root: root,
            inode_cache: HashMap::new(),
        })
    }

    /// Block until the next build-relevant change arrives, resolving
    /// unknown inodes via the monitor's `PATH:inode`/`INO:inode:path`
    /// handshake and filtering out paths the build doesn't care about.
    ///
    /// Returns `Ok(None)` on a clean connection close.
    pub async fn next_relevant_event(&mut self, db: &RuleDatabase, watching: bool) -> Result<Option<FsEvent>, AdapterError> {
        loop {
            let Some(raw) = self.read_line().await? else {
                return Ok(None);
            };
            let Some((pid, inode)) = parse_op_line(&raw) else {
                warn!(line = %raw, "unrecognized FS-monitor frame, ignoring");
                continue;
            };
            let path = match self.inode_cache.get(&inode) {
                Some(path) => path.clone(),
                None => match self.resolve_inode(inode).await? {
                    Some(path) => path,
                    None => continue,
                },
            };
            if !watching {
                continue;
            }
            let project_relative = match path.strip_prefix(&self.mount_root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => path.clone(),
            };
            if is_build_relevant(&project_relative, db) {
                return Ok(Some(FsEvent { pid, path: project_relative }));
            }
        }
    }

    async fn resolve_inode(&mut self, inode: u64) -> Result<Option<PathBuf>, AdapterError> {
        self.writer.write_all(format!("PATH:{inode}\n").as_bytes()).await?;
        let Some(reply) = self.read_line().await? else {
            return Ok(None);
        };
        let Some(path) = parse_ino_reply(&reply, inode) else {
            warn!(reply = %reply, inode, "malformed INO reply from FS-change monitor");
            return Ok(None);
        };
        self.inode_cache.insert(inode, path.clone());
        Ok(Some(path))
    }

    async fn read_line(&mut self) -> Result<Option<String>, AdapterError> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

fn parse_op_line(line: &str) -> Option<(u32, u64)> {
    let mut parts = line.splitn(3, ':');
    let _op = parts.next()?;
    let pid = parts.next()?.parse().ok()?;
    let inode = parts.next()?.parse().ok()?;
    Some((pid, inode))
}

fn parse_ino_reply(line: &str, expected_inode: u64) -> Option<PathBuf> {
    let rest = line.strip_prefix("INO:")?;
    let (inode_str, path) = rest.split_once(':')?;
    let inode: u64 = inode_str.parse().ok()?;
    if inode != expected_inode {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Is `path` (already project-relative) something a build cares about:
/// a known target, a pattern rule's suffix, or a configured extension.
fn is_build_relevant(path: &Path, db: &RuleDatabase) -> bool {
    let Some(name) = path.to_str() else { return false };
    let target = db.interner.intern_target(name);
    if db.is_known_target(target) {
        return true;
    }
    let pattern_match = db.pattern_rules().any(|rule| {
        let Some(suffix) = db.interner.resolve_target(rule.target) else { return false };
        name.ends_with(suffix.trim_start_matches('%'))
    });
    if pattern_match {
        return true;
    }
    watch_extensions().iter().any(|ext| name.ends_with(ext.as_str()))
}

/// Discovers the FUSE mount backing the current project by shelling `df`
/// for the filesystem containing the cwd, then confirming it against
/// `/proc/mounts`.
async fn discover_fuse_root() -> Result<PathBuf, AdapterError> {
    let cwd = std::env::current_dir()?;
    let mut cmd = tokio::process::Command::new("df");
    cmd.arg(&cwd);
    let output = crate::subprocess::run_with_timeout(cmd, crate::subprocess::DF_TIMEOUT, "df").await.map_err(AdapterError::SpawnFailed)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mount_point = stdout
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().last())
        .ok_or(AdapterError::NoFuseMount)?;

    let mounts = std::fs::read_to_string("/proc/mounts")?;
    let is_fuse = mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next();
        let target = fields.next().unwrap_or("");
        let fstype = fields.next().unwrap_or("");
        target == mount_point && fstype.starts_with("fuse")
    });
    if !is_fuse {
        return Err(AdapterError::NoFuseMount);
    }
    Ok(PathBuf::from(mount_point))
}

/// Finds the monitor's listening port by scanning `/proc/<pid>/...` for a
/// process whose root matches `mount_root` and that has a port-file
/// advertising its socket, mirroring the daemon's own port-file protocol
/// (spec §6).
fn locate_monitor_port(mount_root: &Path) -> Result<u16, AdapterError> {
    let entries = std::fs::read_dir("/proc")?;
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let root_link = format!("/proc/{pid}/root");
        let Ok(root) = std::fs::read_link(&root_link) else {
            continue;
        };
        if root != mount_root {
            continue;
        }
        let port_file = PathBuf::from(std::env::var("TMPDIR").unwrap_or_else(|_| "/tmp".to_string())).join(format!("smak-fsmon-{pid}.port"));
        if let Ok(contents) = std::fs::read_to_string(&port_file) {
            if let Ok(port) = contents.trim().parse() {
                return Ok(port);
            }
        }
    }
    Err(AdapterError::NoFuseMount)
}

#[cfg(test)]
#[path = "fs_monitor_tests.rs"]
mod tests;
