// SPDX-License-Identifier: MIT

//! Errors raised by the staleness engine and job master (spec §4.C, §4.F).

use smak_core::TargetId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("target {0:?} has no rule and no file on disk")]
    UnknownTarget(TargetId),

    #[error("recursion depth exceeded while queuing {0:?} (possible dependency cycle)")]
    DepthExceeded(TargetId),

    #[error("worker {0} is not registered with this master")]
    UnknownWorker(String),

    #[error("no idle worker available")]
    NoIdleWorker,
}
