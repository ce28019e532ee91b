// SPDX-License-Identifier: MIT

//! smak-engine: the job master (spec §4.F) and the staleness/automatic-
//! variable/ignore/retry machinery it leans on.
//!
//! This crate is the orchestrator's synchronous core: given a parsed
//! [`smak_core::RuleDatabase`] and a stream of `SUBMIT_JOB`/`TASK_END`/
//! control events, it decides what runs, when, and on which worker,
//! without ever touching a socket itself — see [`master`] for the
//! [`MasterAction`] side-effect boundary that keeps it unit-testable
//! without a runtime.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod automatic;
pub mod error;
pub mod ignore;
pub mod master;
pub mod retry;
pub mod staleness;

pub use automatic::AutomaticVars;
pub use error::EngineError;
pub use ignore::IgnoreConfig;
pub use master::{dispatch, kill_workers, on_task_end, DepthOverflow, DispatchedTask, Master, MasterAction, StatusSnapshot, WorkerState, DEADLOCK_LOG_THRESHOLD, DEFAULT_MAX_DEPTH};
pub use retry::RetryPolicy;
pub use staleness::{needs_rebuild, resolve_vpath};
