// SPDX-License-Identifier: MIT

//! Errors surfaced by the `smak` driver itself (spec §6: "exit codes 0
//! success, 1 build failure, 2 usage"). A build failure communicated via
//! `JOB_COMPLETE`'s exit code is not one of these — only failures to even
//! get a job running end up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not start smakd: {0}")]
    DaemonStartFailed(String),

    #[error("protocol error talking to smakd: {0}")]
    Protocol(String),

    #[error("usage error: {0}")]
    Usage(String),
}

impl CliError {
    /// The process exit code this error maps to (spec §6).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            _ => 1,
        }
    }
}
