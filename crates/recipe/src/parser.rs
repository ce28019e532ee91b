// SPDX-License-Identifier: MIT

//! The recipe-file parser (spec §4.B): reads a recipe file (and anything it
//! `include`s), classifies each logical line, and populates a
//! [`RuleDatabase`] plus a [`VariableTable`] and an input-mtime index for
//! the state cache (spec §4.D).

use crate::builtins;
use crate::expand::{self, VarScope};
use crate::inactive;
use smak_core::{
    AssignOp, CoreError, FileId, RecipeLine, Rule, RuleDatabase, RuleKind, Scope, SourceLoc, TargetId,
    VarBinding,
};
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read recipe file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("{file}:{line}: {message}")]
    Syntax {
        file: PathBuf,
        line: u32,
        message: String,
    },

    #[error("{}:{}: {inner}", source.file.display(), source.line)]
    RuleConflict {
        source: SourceLoc,
        #[source]
        inner: CoreError,
    },
}

/// A name → value-template table with assignment-operator and
/// recipe-file-vs-command-line scoping semantics (spec §3 "Variable
/// binding"). Implements [`VarScope`] so the expander can resolve lookups
/// directly against it.
pub struct VariableTable {
    bindings: HashMap<String, VarBinding>,
    depth: Cell<u32>,
}

impl VariableTable {
    pub fn new() -> Self {
        let mut table = Self {
            bindings: HashMap::new(),
            depth: Cell::new(0),
        };
        for (name, binding) in builtins::seed() {
            table.bindings.insert(name.to_string(), binding);
        }
        table
    }

    /// Apply an assignment, respecting operator semantics and the rule that
    /// a command-line binding is never overwritten by a recipe-file one.
    pub fn assign(&mut self, name: &str, op: AssignOp, raw_value: &str, scope: Scope) {
        if let Some(existing) = self.bindings.get(name) {
            if existing.scope == Scope::CommandLine && scope == Scope::RecipeFile {
                return;
            }
        }

        match op {
            AssignOp::Conditional => {
                if !self.bindings.contains_key(name) {
                    self.bindings
                        .insert(name.to_string(), VarBinding::new(AssignOp::Deferred, raw_value, scope));
                }
            }
            AssignOp::Append => {
                let (carried_op, combined) = match self.bindings.get(name) {
                    Some(existing) => (existing.op, format!("{} {}", existing.value_template, raw_value)),
                    None => (AssignOp::Deferred, raw_value.to_string()),
                };
                self.bindings
                    .insert(name.to_string(), VarBinding::new(carried_op, combined, scope));
            }
            AssignOp::Immediate => {
                let expanded = expand::expand(raw_value, &*self);
                self.bindings
                    .insert(name.to_string(), VarBinding::new(AssignOp::Immediate, expanded, scope));
            }
            AssignOp::Deferred => {
                self.bindings
                    .insert(name.to_string(), VarBinding::new(AssignOp::Deferred, raw_value, scope));
            }
        }
    }

    pub fn expand(&self, text: &str) -> String {
        expand::expand(text, self)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Snapshot every binding for the state cache (spec §4.D); builtins are
    /// included and simply re-overwrite themselves harmlessly on restore.
    pub fn snapshot(&self) -> HashMap<String, VarBinding> {
        self.bindings.clone()
    }

    /// Rebuild a table from a cached snapshot, bypassing `new()`'s builtin
    /// seeding since the snapshot already carries whatever was seeded (or
    /// since overridden) the last time this recipe file was parsed.
    pub fn from_snapshot(bindings: HashMap<String, VarBinding>) -> Self {
        Self {
            bindings,
            depth: Cell::new(0),
        }
    }

    /// Apply command-line `VAR=VALUE` overrides to an already-built table
    /// (spec §3 "command-line override... shadows recipe-file"), used on
    /// both the fresh-parse and cache-hit paths so a `-f` re-run's overrides
    /// always win regardless of which path built the table.
    pub fn apply_overrides(&mut self, vars: &[(String, String)]) {
        for (name, value) in vars {
            self.assign(name, AssignOp::Deferred, value, Scope::CommandLine);
        }
    }
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VarScope for VariableTable {
    fn lookup(&self, name: &str) -> Option<String> {
        let binding = self.bindings.get(name)?;
        match binding.op {
            AssignOp::Immediate => Some(binding.value_template.clone()),
            _ => {
                if self.depth.get() >= expand::MAX_EXPAND_DEPTH {
                    warn!(name, "variable expansion cycle suspected, returning empty");
                    return Some(String::new());
                }
                self.depth.set(self.depth.get() + 1);
                let value = expand::expand(&binding.value_template, self);
                self.depth.set(self.depth.get() - 1);
                Some(value)
            }
        }
    }
}

/// The database, variable table, and cache-invalidation inputs produced by
/// one top-level parse (spec §4.D: "an index of {file → mtime} for every
/// input file read").
pub struct ParseOutcome {
    pub database: RuleDatabase,
    pub variables: VariableTable,
    pub input_mtimes: HashMap<PathBuf, SystemTime>,
}

struct CurrentRule {
    file: FileId,
    targets: Vec<TargetId>,
}

/// Parses one top-level recipe file (and anything it transitively
/// `include`s) into a [`ParseOutcome`].
pub struct RecipeParser {
    database: RuleDatabase,
    variables: VariableTable,
    input_mtimes: HashMap<PathBuf, SystemTime>,
    current_rule: Option<CurrentRule>,
    default_candidates: Vec<TargetId>,
    project_root: PathBuf,
}

impl RecipeParser {
    pub fn new() -> Self {
        Self {
            database: RuleDatabase::new(),
            variables: VariableTable::new(),
            input_mtimes: HashMap::new(),
            current_rule: None,
            default_candidates: Vec::new(),
            project_root: PathBuf::from("."),
        }
    }

    /// Seed command-line `VAR=VALUE` overrides before parsing begins, so
    /// they outrank every recipe-file assignment of the same name.
    pub fn with_command_line_vars(mut self, vars: &[(String, String)]) -> Self {
        self.variables.apply_overrides(vars);
        self
    }

    pub fn parse_file(mut self, path: &Path) -> Result<ParseOutcome, ParseError> {
        let path = fs::canonicalize(path).map_err(|e| ParseError::Io(path.to_path_buf(), e))?;
        self.project_root = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        let file_str = path.to_string_lossy().into_owned();
        let file_id = self.database.interner.intern_file(&file_str);

        self.parse_into(&path, file_id)?;
        self.finish_pattern_activation();
        self.finish_default_goal();

        Ok(ParseOutcome {
            database: self.database,
            variables: self.variables,
            input_mtimes: self.input_mtimes,
        })
    }

    /// Read and parse `path`, indexing every rule found under `file_id`
    /// (the *top-level* file, per spec §4.B's include-stability rule).
    fn parse_into(&mut self, path: &Path, file_id: FileId) -> Result<(), ParseError> {
        let content = fs::read_to_string(path).map_err(|e| ParseError::Io(path.to_path_buf(), e))?;
        if let Ok(meta) = fs::metadata(path) {
            if let Ok(mtime) = meta.modified() {
                self.input_mtimes.insert(path.to_path_buf(), mtime);
            }
        }

        let joined = join_continuations(&content);
        let mut line_no = 0u32;
        for (logical_line, physical_lines) in joined {
            line_no += physical_lines;
            self.parse_logical_line(path, file_id, line_no, &logical_line)?;
        }
        Ok(())
    }

    fn parse_logical_line(&mut self, path: &Path, file_id: FileId, line_no: u32, raw: &str) -> Result<(), ParseError> {
        if raw.starts_with('\t') {
            self.append_recipe_line(path, line_no, &raw[1..])?;
            return Ok(());
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(());
        }

        self.current_rule = None;

        if let Some(rest) = trimmed.strip_prefix("-include ") {
            self.handle_include(path, file_id, rest.trim(), true);
            return Ok(());
        }
        if let Some(rest) = trimmed.strip_prefix("include ") {
            self.handle_include(path, file_id, rest.trim(), false);
            return Ok(());
        }
        if let Some(rest) = trimmed.strip_prefix("vpath ") {
            self.handle_vpath(rest.trim());
            return Ok(());
        }

        if let Some((op, op_pos, op_len)) = find_assignment_operator(trimmed) {
            let name = trimmed[..op_pos].trim();
            let value = trimmed[op_pos + op_len..].trim();
            self.variables.assign(name, op, value, Scope::RecipeFile);
            return Ok(());
        }

        if let Some(colon_pos) = trimmed.find(':') {
            self.handle_rule_header(path, file_id, line_no, trimmed, colon_pos)?;
            return Ok(());
        }

        Err(ParseError::Syntax {
            file: path.to_path_buf(),
            line: line_no,
            message: format!("unrecognized line: {trimmed}"),
        })
    }

    fn handle_include(&mut self, includer: &Path, file_id: FileId, raw_name: &str, tolerant: bool) {
        let name = self.variables.expand(raw_name);
        let includer_dir = includer.parent().unwrap_or(Path::new("."));
        let candidates = [PathBuf::from(&name), includer_dir.join(&name)];
        let resolved = candidates.into_iter().find(|c| c.exists());

        match resolved {
            Some(resolved) => {
                if let Err(e) = self.parse_into(&resolved, file_id) {
                    warn!(error = %e, include = %name, "error while parsing included file");
                }
            }
            None if tolerant => {
                // "-include": silently ignored (spec §4.B).
            }
            None => {
                warn!(include = %name, includer = %includer.display(), "include file not found");
            }
        }
    }

    fn handle_vpath(&mut self, rest: &str) {
        let expanded = self.variables.expand(rest);
        let mut parts = expanded.split_whitespace();
        let Some(pattern) = parts.next() else { return };
        let dirs: Vec<PathBuf> = parts.map(PathBuf::from).collect();
        if dirs.is_empty() {
            return;
        }
        self.database.vpath.push(smak_core::VpathEntry {
            pattern: pattern.to_string(),
            dirs,
        });
    }

    fn handle_rule_header(
        &mut self,
        path: &Path,
        file_id: FileId,
        line_no: u32,
        trimmed: &str,
        colon_pos: usize,
    ) -> Result<(), ParseError> {
        let targets_str = self.variables.expand(trimmed[..colon_pos].trim());
        let prereqs_str = self.variables.expand(trimmed[colon_pos + 1..].trim());

        let target_names: Vec<&str> = targets_str.split_whitespace().collect();
        if target_names.is_empty() {
            return Err(ParseError::Syntax {
                file: path.to_path_buf(),
                line: line_no,
                message: "rule header has no target".to_string(),
            });
        }

        if target_names.len() == 1 && target_names[0] == ".PHONY" {
            for name in prereqs_str.split_whitespace() {
                let id = self.database.interner.intern_target(name);
                self.database.phony.insert(id);
            }
            return Ok(());
        }

        let prereq_ids: Vec<TargetId> = prereqs_str
            .split_whitespace()
            .map(|p| self.database.interner.intern_target(p))
            .collect();

        let mut target_ids = Vec::with_capacity(target_names.len());
        for name in &target_names {
            let kind = RuleKind::classify(name);
            let target = self.database.interner.intern_target(name);
            target_ids.push(target);

            if kind == RuleKind::Fixed && !name.contains('$') {
                self.default_candidates.push(target);
            }

            let mut rule = Rule::new(kind, target, SourceLoc::new(path.to_path_buf(), line_no));
            rule.prerequisites = prereq_ids.clone();
            self.database.insert_rule(file_id, rule).map_err(|inner| ParseError::RuleConflict {
                source: SourceLoc::new(path.to_path_buf(), line_no),
                inner,
            })?;
        }

        self.current_rule = Some(CurrentRule {
            file: file_id,
            targets: target_ids,
        });
        Ok(())
    }

    fn append_recipe_line(&mut self, path: &Path, line_no: u32, body: &str) -> Result<(), ParseError> {
        let Some(current) = &self.current_rule else {
            return Err(ParseError::Syntax {
                file: path.to_path_buf(),
                line: line_no,
                message: "recipe line with no preceding rule header".to_string(),
            });
        };
        let line = RecipeLine::parse(body);
        let file = current.file;
        let targets = current.targets.clone();
        for target in targets {
            self.database.push_recipe_line(file, target, line.clone());
        }
        Ok(())
    }

    /// Spec §4.B "Inactive-pattern detection": if no RCS/SCCS directories
    /// exist anywhere under the project root, nothing to prune. Otherwise
    /// every pattern rule is a candidate; [`smak_core::RuleDatabase`]'s
    /// staleness consumer decides activation per-file via
    /// [`inactive::is_pattern_inactive`].
    fn finish_pattern_activation(&mut self) {
        let shadow_dirs = inactive::detect_inactive_dirs(&self.project_root);
        if shadow_dirs.is_empty() {
            return;
        }
        let pattern_targets: Vec<TargetId> = self.database.pattern_rules().map(|r| r.target).collect();
        for target in pattern_targets {
            if let Some(name) = self.database.interner.resolve_target(target) {
                let candidate_path = self.project_root.join(&name);
                if inactive::is_pattern_inactive(&candidate_path, &shadow_dirs) {
                    self.database.inactive_patterns.insert(target);
                }
            }
        }
    }

    fn finish_default_goal(&mut self) {
        self.database.default_goal = self
            .default_candidates
            .iter()
            .find(|t| !self.database.phony.contains(t))
            .copied();
    }
}

impl Default for RecipeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins backslash-continued physical lines into logical lines, returning
/// each logical line alongside the count of physical lines it consumed (so
/// callers can keep an accurate line number for diagnostics).
fn join_continuations(content: &str) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    let mut pending = String::new();
    let mut pending_count = 0u32;

    for line in content.lines() {
        pending_count += 1;
        if let Some(stripped) = line.strip_suffix('\\') {
            pending.push_str(stripped);
            pending.push(' ');
        } else {
            pending.push_str(line);
            out.push((std::mem::take(&mut pending), pending_count));
            pending_count = 0;
        }
    }
    if !pending.is_empty() {
        out.push((pending, pending_count));
    }
    out
}

const ASSIGNMENT_OPERATORS: &[&str] = &[":=", "?=", "+=", "="];

/// Scans `line` left to right for the earliest-occurring assignment
/// operator, preferring the two-character forms when several start at the
/// same position (so `:=` isn't mistaken for a bare `=`).
fn find_assignment_operator(line: &str) -> Option<(AssignOp, usize, usize)> {
    let mut best: Option<(usize, &str)> = None;
    for op in ASSIGNMENT_OPERATORS {
        if let Some(pos) = line.find(op) {
            match best {
                Some((best_pos, best_op)) if pos > best_pos || (pos == best_pos && op.len() <= best_op.len()) => {}
                _ => best = Some((pos, op)),
            }
        }
    }
    let (pos, op) = best?;
    // A rule header's `:` would otherwise be misread as the start of `:=`
    // or as a bare `=` many characters later; only accept the match if
    // nothing that looks like a rule-header colon precedes it unexpectedly.
    // (Recipe files rarely mix `:` rule syntax and `=` on one line, so a
    // simple leftmost-operator scan matches real-world Makefiles.)
    AssignOp::from_operator_str(op).map(|assign_op| (assign_op, pos, op.len()))
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
