// SPDX-License-Identifier: MIT

//! Rule database: six indexed collections keyed by (recipe-file, target),
//! plus vpath and inactive-pattern bookkeeping (spec §3 "Rule database").

use crate::interner::{FileId, StringInterner, TargetId};
use crate::rule::{Rule, RuleKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised by [`RuleDatabase`] mutation. Parsing-level errors (syntax)
/// live in `smak-recipe::ParseError`; this crate only guards the structural
/// invariant that a target belongs to at most one rule-type index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("target {target:?} already registered as a different rule kind ({existing:?}, tried to add {attempted:?})")]
    DuplicateRuleKind {
        target: TargetId,
        existing: RuleKind,
        attempted: RuleKind,
    },
}

type RuleKey = (FileId, TargetId);

/// A `vpath PATTERN DIRS` directive's resolved form: glob-style pattern and
/// the ordered list of directories to search (spec §4.C "vpath
/// resolution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpathEntry {
    pub pattern: String,
    pub dirs: Vec<std::path::PathBuf>,
}

/// The parsed, read-only-after-construction rule set for one recipe file
/// (including anything it transitively `include`s).
#[derive(Debug, Default)]
pub struct RuleDatabase {
    pub interner: StringInterner,

    fixed_rule: HashMap<RuleKey, Rule>,
    fixed_deps: HashMap<RuleKey, Vec<TargetId>>,
    pattern_rule: HashMap<RuleKey, Rule>,
    pattern_deps: HashMap<RuleKey, Vec<TargetId>>,
    pseudo_rule: HashMap<RuleKey, Rule>,
    pseudo_deps: HashMap<RuleKey, Vec<TargetId>>,

    /// Which rule-type index each target currently lives in, enforcing the
    /// "at most one of the three" invariant independent of which file it
    /// was declared in (spec §3: "every target appears in at most one of
    /// the three rule-type indexes").
    target_kind: HashMap<TargetId, RuleKind>,

    pub vpath: Vec<VpathEntry>,
    pub inactive_patterns: HashSet<TargetId>,
    pub default_goal: Option<TargetId>,
    pub phony: HashSet<TargetId>,
}

impl RuleDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_for(&self, kind: RuleKind) -> &HashMap<RuleKey, Rule> {
        match kind {
            RuleKind::Fixed => &self.fixed_rule,
            RuleKind::Pattern => &self.pattern_rule,
            RuleKind::Pseudo => &self.pseudo_rule,
        }
    }

    fn table_for_mut(&mut self, kind: RuleKind) -> &mut HashMap<RuleKey, Rule> {
        match kind {
            RuleKind::Fixed => &mut self.fixed_rule,
            RuleKind::Pattern => &mut self.pattern_rule,
            RuleKind::Pseudo => &mut self.pseudo_rule,
        }
    }

    fn deps_table_for_mut(&mut self, kind: RuleKind) -> &mut HashMap<RuleKey, Vec<TargetId>> {
        match kind {
            RuleKind::Fixed => &mut self.fixed_deps,
            RuleKind::Pattern => &mut self.pattern_deps,
            RuleKind::Pseudo => &mut self.pseudo_deps,
        }
    }

    /// Insert or merge a rule, applying spec §4.B's "Appending" semantics:
    /// a target reappearing with new prerequisites and no recipe has its
    /// prerequisite list appended; if both declarations have recipes, the
    /// later one supersedes.
    pub fn insert_rule(&mut self, file: FileId, mut rule: Rule) -> Result<(), CoreError> {
        let target = rule.target;
        let kind = rule.kind;

        if let Some(&existing_kind) = self.target_kind.get(&target) {
            if existing_kind != kind {
                return Err(CoreError::DuplicateRuleKind {
                    target,
                    existing: existing_kind,
                    attempted: kind,
                });
            }
        } else {
            self.target_kind.insert(target, kind);
        }

        let key = (file, target);
        let table = self.table_for_mut(kind);
        match table.get_mut(&key) {
            Some(current) => {
                current.prerequisites.append(&mut rule.prerequisites);
                if !rule.recipe.is_empty() {
                    current.recipe = rule.recipe;
                }
            }
            None => {
                table.insert(key, rule);
            }
        }

        let deps = self
            .table_for(kind)
            .get(&key)
            .map(|r| r.prerequisites.clone())
            .unwrap_or_default();
        self.deps_table_for_mut(kind).insert(key, deps);

        Ok(())
    }

    /// Push one more recipe line onto an already-inserted rule, in place —
    /// unlike [`Self::insert_rule`], this does not touch `prerequisites`, so
    /// the parser can use it to extend a rule header's recipe across
    /// several tab-indented lines without re-running the append-or-
    /// supersede merge logic on each line. Returns `false` if no rule is
    /// registered for `target` under `file`.
    pub fn push_recipe_line(&mut self, file: FileId, target: TargetId, line: crate::rule::RecipeLine) -> bool {
        let Some(&kind) = self.target_kind.get(&target) else {
            return false;
        };
        let key = (file, target);
        match self.table_for_mut(kind).get_mut(&key) {
            Some(rule) => {
                rule.recipe.push(line);
                true
            }
            None => false,
        }
    }

    /// Look up a rule by (file, target), checking fixed then pattern then
    /// pseudo, matching spec §4.F step 3's lookup priority.
    pub fn lookup(&self, file: FileId, target: TargetId) -> Option<&Rule> {
        let key = (file, target);
        self.fixed_rule
            .get(&key)
            .or_else(|| self.pattern_rule.get(&key))
            .or_else(|| self.pseudo_rule.get(&key))
    }

    pub fn lookup_fixed(&self, file: FileId, target: TargetId) -> Option<&Rule> {
        self.fixed_rule.get(&(file, target))
    }

    pub fn pattern_rules(&self) -> impl Iterator<Item = &Rule> {
        self.pattern_rule.values()
    }

    pub fn kind_of(&self, target: TargetId) -> Option<RuleKind> {
        self.target_kind.get(&target).copied()
    }

    pub fn is_known_target(&self, target: TargetId) -> bool {
        self.target_kind.contains_key(&target)
    }

    pub fn is_phony(&self, target: TargetId) -> bool {
        self.phony.contains(&target)
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &Rule> {
        self.fixed_rule
            .values()
            .chain(self.pattern_rule.values())
            .chain(self.pseudo_rule.values())
    }

    /// Export a plain-data snapshot for the state cache (spec §4.D). Rule
    /// tables are flattened to `(file, rule)` pairs; the `*_deps` tables are
    /// deliberately omitted since they are recomputed by
    /// [`Self::insert_rule`] during [`Self::from_snapshot`] — they always
    /// mirror `rule.prerequisites` and carry no independent state.
    pub fn snapshot(&self) -> DatabaseSnapshot {
        let (files, targets) = self.interner.snapshot();
        let flatten = |table: &HashMap<RuleKey, Rule>| -> Vec<(FileId, Rule)> {
            table.iter().map(|((file, _), rule)| (*file, rule.clone())).collect()
        };
        DatabaseSnapshot {
            interner_files: files,
            interner_targets: targets,
            fixed_rule: flatten(&self.fixed_rule),
            pattern_rule: flatten(&self.pattern_rule),
            pseudo_rule: flatten(&self.pseudo_rule),
            vpath: self.vpath.clone(),
            inactive_patterns: self.inactive_patterns.iter().copied().collect(),
            default_goal: self.default_goal,
            phony: self.phony.iter().copied().collect(),
        }
    }

    /// Reconstruct a [`RuleDatabase`] from a snapshot produced by
    /// [`Self::snapshot`]. `TargetId`/`FileId` values are stable across the
    /// round-trip because the interner's string tables are re-imported with
    /// the same indices (spec §4.D cache invalidation relies on this: a
    /// loaded database behaves identically to the one that produced it).
    pub fn from_snapshot(snapshot: DatabaseSnapshot) -> Result<Self, CoreError> {
        let mut db = Self {
            interner: StringInterner::from_tables(snapshot.interner_files, snapshot.interner_targets),
            vpath: snapshot.vpath,
            inactive_patterns: snapshot.inactive_patterns.into_iter().collect(),
            default_goal: snapshot.default_goal,
            phony: snapshot.phony.into_iter().collect(),
            ..Self::default()
        };
        for (file, rule) in snapshot.fixed_rule {
            db.insert_rule(file, rule)?;
        }
        for (file, rule) in snapshot.pattern_rule {
            db.insert_rule(file, rule)?;
        }
        for (file, rule) in snapshot.pseudo_rule {
            db.insert_rule(file, rule)?;
        }
        Ok(db)
    }
}

/// Plain-data, serializable form of a [`RuleDatabase`] (spec §4.D state
/// cache). See [`RuleDatabase::snapshot`]/[`RuleDatabase::from_snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub interner_files: Vec<String>,
    pub interner_targets: Vec<String>,
    pub fixed_rule: Vec<(FileId, Rule)>,
    pub pattern_rule: Vec<(FileId, Rule)>,
    pub pseudo_rule: Vec<(FileId, Rule)>,
    pub vpath: Vec<VpathEntry>,
    pub inactive_patterns: Vec<TargetId>,
    pub default_goal: Option<TargetId>,
    pub phony: Vec<TargetId>,
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
