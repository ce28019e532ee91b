// SPDX-License-Identifier: MIT

//! Errors surfaced by the worker transport and FS-change monitor client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed before a {expected} frame arrived")]
    UnexpectedClose { expected: &'static str },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("FUSE-backed project root not found (spec §4.G is Linux-only)")]
    NoFuseMount,

    #[error("subprocess spawn failed: {0}")]
    SpawnFailed(String),
}
