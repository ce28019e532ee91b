// SPDX-License-Identifier: MIT

use super::*;
use crate::rule::{RecipeLine, SourceLoc};

fn rule(db: &RuleDatabase, kind: RuleKind, name: &str) -> Rule {
    Rule::new(kind, db.interner.intern_target(name), SourceLoc::new("Makefile", 1))
}

#[test]
fn reappearing_target_without_recipe_appends_prerequisites() {
    let mut db = RuleDatabase::new();
    let file = db.interner.intern_file("Makefile");
    let a = db.interner.intern_target("a");
    let b = db.interner.intern_target("b");

    let mut r1 = rule(&db, RuleKind::Fixed, "all");
    r1.prerequisites.push(a);
    db.insert_rule(file, r1).unwrap();

    let mut r2 = rule(&db, RuleKind::Fixed, "all");
    r2.prerequisites.push(b);
    db.insert_rule(file, r2).unwrap();

    let all = db.interner.intern_target("all");
    let stored = db.lookup_fixed(file, all).unwrap();
    assert_eq!(stored.prerequisites, vec![a, b]);
}

#[test]
fn second_recipe_supersedes_first() {
    let mut db = RuleDatabase::new();
    let file = db.interner.intern_file("Makefile");

    let mut r1 = rule(&db, RuleKind::Fixed, "all");
    r1.recipe.push(RecipeLine::parse("echo one"));
    db.insert_rule(file, r1).unwrap();

    let mut r2 = rule(&db, RuleKind::Fixed, "all");
    r2.recipe.push(RecipeLine::parse("echo two"));
    db.insert_rule(file, r2).unwrap();

    let all = db.interner.intern_target("all");
    let stored = db.lookup_fixed(file, all).unwrap();
    assert_eq!(stored.recipe.len(), 1);
    assert_eq!(stored.recipe[0].command, "echo two");
}

#[test]
fn same_target_different_kind_is_rejected() {
    let mut db = RuleDatabase::new();
    let file = db.interner.intern_file("Makefile");

    let r1 = rule(&db, RuleKind::Fixed, "weird");
    db.insert_rule(file, r1).unwrap();

    let r2 = rule(&db, RuleKind::Pseudo, "weird");
    let err = db.insert_rule(file, r2).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateRuleKind { .. }));
}

#[test]
fn lookup_checks_fixed_before_pattern_before_pseudo() {
    let mut db = RuleDatabase::new();
    let file = db.interner.intern_file("Makefile");
    let r = rule(&db, RuleKind::Fixed, "foo.o");
    db.insert_rule(file, r).unwrap();
    let target = db.interner.intern_target("foo.o");
    assert!(db.lookup(file, target).is_some());
    assert_eq!(db.kind_of(target), Some(RuleKind::Fixed));
}

#[test]
fn snapshot_round_trip_preserves_rules_and_ids() {
    let mut db = RuleDatabase::new();
    let file = db.interner.intern_file("Makefile");
    let a = db.interner.intern_target("a");

    let mut all = rule(&db, RuleKind::Fixed, "all");
    all.prerequisites.push(a);
    all.recipe.push(RecipeLine::parse("@touch all"));
    db.insert_rule(file, all).unwrap();

    let mut pattern = rule(&db, RuleKind::Pattern, "%.o");
    pattern.recipe.push(RecipeLine::parse("cp $< $@"));
    db.insert_rule(file, pattern).unwrap();

    db.phony.insert(db.interner.intern_target("clean"));
    db.default_goal = Some(db.interner.intern_target("all"));

    let snapshot = db.snapshot();
    let restored = RuleDatabase::from_snapshot(snapshot).unwrap();

    let all_target = restored.interner.intern_target("all");
    assert_eq!(all_target, db.interner.intern_target("all"));
    let stored = restored.lookup_fixed(file, all_target).unwrap();
    assert_eq!(stored.prerequisites, vec![a]);
    assert_eq!(stored.recipe[0].command, "touch all");
    assert_eq!(restored.default_goal, Some(all_target));
    assert!(restored.is_phony(restored.interner.intern_target("clean")));
}
