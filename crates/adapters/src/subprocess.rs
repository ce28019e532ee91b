// SPDX-License-Identifier: MIT

//! Subprocess execution helpers shared by the worker binary and the
//! FS-change monitor client.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Timeout for the one-shot `df` call used to discover the FUSE mount root.
pub const DF_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the `ssh -R ... -- smak-worker` remote-worker launch probe.
pub const SSH_LAUNCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Run a subprocess command with a timeout, killing the child if it elapses.
pub async fn run_with_timeout(mut cmd: Command, timeout: Duration, description: &str) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!("{description} timed out after {}s", timeout.as_secs())),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
