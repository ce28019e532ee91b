// SPDX-License-Identifier: MIT

//! smak-storage: the state cache (spec §4.D) plus an ambient write-ahead
//! log for the job master's in-progress/completed/failed sets, grounded in
//! the teacher's snapshot/WAL persistence machinery.
//!
//! The cache holds a parsed [`smak_core::RuleDatabase`] snapshot keyed by
//! the mtimes of every file that was read to produce it; the WAL is purely
//! additive durability so a daemon restart doesn't have to redo completed
//! work (spec §4.F "Worker lost"/"Master socket close" scenarios).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cache;
pub mod wal;

pub use cache::{Cache, CacheDir, CachedState, StorageError, CACHE_VERSION};
pub use wal::{MasterEvent, MasterWal, WalError};
