// SPDX-License-Identifier: MIT

//! Error type for daemon startup, configuration, and the CLI wire protocol.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recipe parse error: {0}")]
    Parse(#[from] smak_recipe::ParseError),

    #[error("storage error: {0}")]
    Storage(#[from] smak_storage::StorageError),

    #[error("wal error: {0}")]
    Wal(#[from] smak_storage::WalError),

    #[error("no state directory available (HOME/TMPDIR unset)")]
    NoStateDir,

    #[error("another smakd is already running for this recipe file (pid {0})")]
    AlreadyRunning(u32),

    #[error("malformed CLI command line: {0}")]
    MalformedCommand(String),

    #[error("unknown CLI verb: {0}")]
    UnknownVerb(String),
}
