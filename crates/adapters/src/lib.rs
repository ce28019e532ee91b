// SPDX-License-Identifier: MIT

//! smak-adapters: the worker transport (spec §4.E) and FS-change monitor
//! client (spec §4.G) — the two places this build system talks to
//! something outside its own process over a socket.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod fs_monitor;
pub mod protocol;
pub mod subprocess;

pub use error::AdapterError;
pub use fs_monitor::{FsEvent, FsMonitorClient};
pub use protocol::{WorkerInboundLine, WorkerOutboundLine};
