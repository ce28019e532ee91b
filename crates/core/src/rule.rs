// SPDX-License-Identifier: MIT

//! Rule definitions (spec §3 "Rule").

use crate::interner::TargetId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a rule was declared, for diagnostics (spec §7 parse errors include
/// a line number).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLoc {
    pub file: PathBuf,
    pub line: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// The three mutually-exclusive target shapes spec §3 classifies a rule
/// into at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// A literal target name, e.g. `foo.o`.
    Fixed,
    /// A target containing `%`, e.g. `%.o`.
    Pattern,
    /// A target starting with `.`, e.g. `.PHONY`.
    Pseudo,
}

impl RuleKind {
    /// Classify a target string into its rule kind.
    pub fn classify(target: &str) -> Self {
        if target.starts_with('.') {
            RuleKind::Pseudo
        } else if target.contains('%') {
            RuleKind::Pattern
        } else {
            RuleKind::Fixed
        }
    }
}

/// One recipe command line, with its modifier prefixes already stripped
/// into flags (spec §4.F step 7: "recipe-line prefixes `@` and `-` stripped
/// into modifier flags").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    /// The command template, unexpanded, with `@`/`-` prefixes removed.
    pub command: String,
    /// `@` prefix: don't echo the command before running it.
    pub silent: bool,
    /// `-` prefix: a nonzero exit from this line does not fail the recipe.
    pub ignore_error: bool,
}

impl RecipeLine {
    /// Parse a raw recipe-line body (tab already stripped), splitting off
    /// any leading `@`/`-` modifiers (they may appear in either order).
    pub fn parse(raw: &str) -> Self {
        let mut rest = raw;
        let mut silent = false;
        let mut ignore_error = false;
        loop {
            match rest.chars().next() {
                Some('@') => {
                    silent = true;
                    rest = &rest[1..];
                }
                Some('-') => {
                    ignore_error = true;
                    rest = &rest[1..];
                }
                _ => break,
            }
        }
        Self {
            command: rest.to_string(),
            silent,
            ignore_error,
        }
    }
}

/// An immutable rule, as produced by the parser (spec §3 "Rule").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub kind: RuleKind,
    /// The rule's own target string (one rule per target; multi-target
    /// headers are expanded into one `Rule` per target at parse time, spec
    /// §4.B "Multi-target rules").
    pub target: TargetId,
    /// Ordered, duplicates permitted (spec §3).
    pub prerequisites: Vec<TargetId>,
    pub recipe: Vec<RecipeLine>,
    pub source: SourceLoc,
}

impl Rule {
    pub fn new(kind: RuleKind, target: TargetId, source: SourceLoc) -> Self {
        Self {
            kind,
            target,
            prerequisites: Vec::new(),
            recipe: Vec::new(),
            source,
        }
    }

    /// A composite target has prerequisites but no recipe of its own
    /// (spec glossary "Composite target").
    pub fn is_composite(&self) -> bool {
        self.recipe.is_empty() && !self.prerequisites.is_empty()
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
