// SPDX-License-Identifier: MIT

//! The variable/function expander (spec §4.A).
//!
//! `expand(text, scope)` scans for `$(...)`/`${...}` references with
//! balanced-paren parsing, recursively expanding variable lookups and
//! function calls. Automatic variables (`$@ $< $^ $*`) are deliberately
//! left untouched — the job master substitutes those once it has selected
//! a target and its prerequisite list (spec §4.F step 7).

use crate::functions;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Recursive expansion is bounded to this depth; beyond it a reference
/// degrades to its literal (unexpanded) text with a warning, rather than
/// failing the whole expansion (spec §7: "errors in §4.A are in-place").
pub const MAX_EXPAND_DEPTH: u32 = 10;

/// Default timeout for `$(shell ...)` subprocess invocations (spec §5).
pub const SHELL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("unbalanced parens in variable reference starting at byte {0}")]
    UnbalancedParens(usize),
}

/// Resolves a variable name to its (already-expanded) value. Implementors
/// decide immediate vs. deferred expansion semantics; this trait only
/// needs to answer "what is this variable's value right now".
///
/// Returns `None` for variables the scope has no binding for (this
/// expander maps that to empty-string substitution, matching GNU make's
/// "undefined variable expands to empty" behavior) — except for the four
/// automatic-variable characters, which this module special-cases and
/// never queries the scope for.
pub trait VarScope {
    fn lookup(&self, name: &str) -> Option<String>;

    /// Runs a shell command synchronously for `$(shell ...)`, capturing
    /// stdout with trailing newlines trimmed. The default implementation
    /// uses [`ShellRunner::run`] via `std::process::Command` with the
    /// 5-second watchdog from spec §5; tests can override this to avoid
    /// spawning real processes.
    fn run_shell(&self, command: &str) -> String {
        ShellRunner::default().run(command)
    }
}

/// The production `$(shell ...)` implementation: spawns `/bin/sh -c`
/// synchronously and enforces a timeout with a watchdog thread, since the
/// expander itself runs during parsing, off any async runtime.
pub struct ShellRunner {
    pub timeout: Duration,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            timeout: SHELL_TIMEOUT,
        }
    }
}

impl ShellRunner {
    pub fn run(&self, command: &str) -> String {
        use std::process::Command;
        use std::sync::mpsc;

        let command = command.to_string();
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let output = Command::new("/bin/sh").arg("-c").arg(&command).output();
            let _ = tx.send(output);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) => {
                let _ = handle.join();
                let mut s = String::from_utf8_lossy(&output.stdout).into_owned();
                while s.ends_with('\n') || s.ends_with('\r') {
                    s.pop();
                }
                s
            }
            Ok(Err(e)) => {
                warn!(error = %e, command = %command, "$(shell) failed to spawn");
                String::new()
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "$(shell) timed out");
                String::new()
            }
        }
    }
}

const AUTOMATIC_VAR_CHARS: &[char] = &['@', '<', '^', '*'];

/// Expand all `$(...)`/`${...}`/`$X` references in `text`.
pub fn expand(text: &str, scope: &dyn VarScope) -> String {
    expand_depth(text, scope, 0)
}

pub(crate) fn expand_depth(text: &str, scope: &dyn VarScope, depth: u32) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '$' {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        // `$$` -> literal `$`
        if i + 1 < chars.len() && chars[i + 1] == '$' {
            out.push('$');
            i += 2;
            continue;
        }

        if i + 1 >= chars.len() {
            out.push('$');
            i += 1;
            continue;
        }

        let next = chars[i + 1];
        if next == '(' || next == '{' {
            let close = if next == '(' { ')' } else { '}' };
            match find_matching_close(&chars, i + 2, next, close) {
                Some(end) => {
                    let inner: String = chars[i + 2..end].iter().collect();
                    out.push_str(&expand_reference(&inner, scope, depth, next, close));
                    i = end + 1;
                }
                None => {
                    // Unbalanced: emit literally, matching spec §7's
                    // "in-place, with a warning" error policy.
                    warn!(text, "unbalanced parens in variable reference");
                    out.push('$');
                    out.push(next);
                    i += 2;
                }
            }
        } else if AUTOMATIC_VAR_CHARS.contains(&next) {
            // Automatic variables are resolved by the orchestrator after
            // target selection, not by this expander (spec §4.A).
            out.push('$');
            out.push(next);
            i += 2;
        } else if next.is_alphabetic() || next == '_' {
            // `$X` shorthand for `$(X)`.
            let value = lookup_or_empty(scope, &next.to_string());
            out.push_str(&value);
            i += 2;
        } else {
            out.push('$');
            out.push(next);
            i += 2;
        }
    }
    out
}

fn lookup_or_empty(scope: &dyn VarScope, name: &str) -> String {
    scope.lookup(name).unwrap_or_default()
}

/// Scans forward from `start` for the `close` character matching the
/// `open` character already consumed, accounting for nested `$(...)` /
/// `${...}` groups so commas and parens inside a nested reference don't
/// confuse the outer scan.
fn find_matching_close(chars: &[char], start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = start;
    while i < chars.len() {
        if chars[i] == open {
            depth += 1;
        } else if chars[i] == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Expand the content of a single `$(...)`/`${...}` reference: either a
/// function call (`name` followed by whitespace or a comma) or a plain
/// (possibly itself containing references) variable name. `open`/`close`
/// are the bracket characters this reference was written with, so a
/// reference emitted back out literally (depth overflow, unknown
/// function) round-trips in the form it was written, not a canonicalized
/// one.
fn expand_reference(inner: &str, scope: &dyn VarScope, depth: u32, open: char, close: char) -> String {
    if depth >= MAX_EXPAND_DEPTH {
        warn!(inner, "max expansion depth exceeded, treating as cyclic");
        return format!("{open}{inner}{close}");
    }

    if let Some((name, rest)) = split_function_call(inner) {
        if functions::is_known_function(name) {
            return functions::call(name, rest, scope, depth, &|t, d| expand_depth(t, scope, d));
        }
        // Spec §4.A: "Unknown functions expand to themselves unchanged."
        return format!("{open}{inner}{close}");
    }

    // Not a function call: expand nested references to resolve a dynamic
    // variable name (e.g. `$(VAR_$(X))`), then look the result up.
    let name = expand_depth(inner, scope, depth + 1);
    lookup_or_empty(scope, name.trim())
}

/// If `inner` looks like `funcname args...` (identifier followed by
/// whitespace or a comma), returns `(funcname, rest)`.
fn split_function_call(inner: &str) -> Option<(&str, &str)> {
    let trimmed = inner;
    let ident_end = trimmed
        .find(|c: char| !(c.is_alphanumeric() || c == '-'))
        .unwrap_or(trimmed.len());
    if ident_end == 0 {
        return None;
    }
    let (name, rest) = trimmed.split_at(ident_end);
    match rest.chars().next() {
        Some(c) if c.is_whitespace() || c == ',' => Some((name, rest.trim_start_matches(c))),
        _ => None,
    }
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;
