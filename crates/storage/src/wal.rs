// SPDX-License-Identifier: MIT

//! A lightweight write-ahead log for the job master's own in-progress/
//! completed/failed bookkeeping (ambient durability addition, not part of
//! spec §4.D proper — see SPEC_FULL.md's `smak-storage` section).
//!
//! Unlike [`crate::cache`], which snapshots the *parsed rule database*,
//! this log records the handful of events that move a target through its
//! lifecycle (spec §3 "Target progression") so a daemon restart can answer
//! "what had already finished" without re-running completed recipes. It is
//! a JSONL append log in the same spirit as the teacher's event WAL, scaled
//! down: no group-commit buffering, since job completions are infrequent
//! relative to the teacher's per-keystroke event volume.

use serde::{Deserialize, Serialize};
use smak_core::TargetId;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One durable fact about a target's terminal state (spec §3 "Completed
/// set / failed map", "Dirty set"). Intermediate states (`Queued`,
/// `Dispatched`) are deliberately not logged — only terminal/invalidating
/// transitions are worth replaying, since in-flight work is always safe to
/// re-dispatch from scratch after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterEvent {
    TargetDone(TargetId),
    TargetFailed(TargetId, i32),
    TargetDirty(TargetId),
    /// Emitted by `reset` / `rescan` to invalidate a previously-logged
    /// completion without rewriting the whole log.
    TargetReset(TargetId),
}

/// Append-only log of [`MasterEvent`]s, one JSON object per line.
pub struct MasterWal {
    file: File,
    path: PathBuf,
}

impl MasterWal {
    /// Open (creating if absent) the log at `path`.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Append one event, fsync'd immediately — completion events are rare
    /// enough that per-event durability is cheap, unlike the teacher's
    /// per-keystroke event stream which needs group commit.
    pub fn append(&mut self, event: &MasterEvent) -> Result<(), WalError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replay every event recorded so far, skipping (with a warning) any
    /// line that fails to parse rather than aborting the whole replay —
    /// a half-written final line from a crash mid-append should not lose
    /// every event that preceded it.
    pub fn replay(path: &Path) -> Result<Vec<MasterEvent>, WalError> {
        let Ok(file) = File::open(path) else {
            return Ok(Vec::new());
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "skipping corrupt master WAL entry"),
            }
        }
        Ok(events)
    }

    /// Truncate the log to empty, e.g. after a full `rescan` makes the
    /// history moot. Best-effort: failures are logged, not propagated,
    /// matching the teacher's posture that durability bookkeeping should
    /// never block a build.
    pub fn clear(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!(error = %e, path = %self.path.display(), "failed to truncate master WAL");
        }
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
