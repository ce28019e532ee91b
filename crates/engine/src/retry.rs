// SPDX-License-Identifier: MIT

//! Auto-retry policy (spec §4.F completion handling step 3): a failed task
//! is retried at most once if the failure looks like a filesystem race, or
//! if the captured output or the target name matches a configured glob.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Matches `fatal error: FILE: No such file or directory` or
/// `error: FILE: No such file or directory`, capturing `FILE` — the
/// classic "a sibling build step hadn't flushed its output to disk yet"
/// race spec §4.F calls out by name.
#[allow(clippy::expect_used)]
static RACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:fatal error|error): ([^:]+): No such file or directory").expect("constant regex pattern is valid")
});

/// Policy configuration: glob patterns matched against captured output and
/// against the target name, configured by the operator (no spec-mandated
/// source beyond "a configured auto-retry glob" — this crate exposes it as
/// plain `Vec<String>` fields the daemon's `Config` populates from an
/// environment variable or CLI flag the way it populates [`crate::ignore::IgnoreConfig`]).
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    pub output_globs: Vec<glob::Pattern>,
    pub target_globs: Vec<glob::Pattern>,
}

impl RetryPolicy {
    pub fn new(output_globs: Vec<String>, target_globs: Vec<String>) -> Self {
        let compile = |globs: Vec<String>| globs.into_iter().filter_map(|g| glob::Pattern::new(&g).ok()).collect();
        Self {
            output_globs: compile(output_globs),
            target_globs: compile(target_globs),
        }
    }

    /// Decide whether a failed task at `target_name`, whose worker emitted
    /// `captured_output`, should be retried (spec §4.F step 3). `retry_count`
    /// is the number of times this task has already been retried — the
    /// "at most once" cap is enforced by the caller checking this is `0`
    /// before calling, since this function only judges eligibility.
    pub fn should_retry(&self, target_name: &str, captured_output: &str) -> bool {
        if let Some(captures) = RACE_PATTERN.captures(captured_output) {
            if let Some(file) = captures.get(1) {
                if Path::new(file.as_str()).exists() {
                    return true;
                }
            }
        }

        if self.output_globs.iter().any(|g| g.matches(captured_output)) {
            return true;
        }

        self.target_globs.iter().any(|g| g.matches(target_name))
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
