// SPDX-License-Identifier: MIT

use super::*;
use smak_core::RuleKind;
use tempfile::tempdir;

fn write(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn parses_a_simple_fixed_rule_with_recipe() {
    let dir = tempdir().unwrap();
    let makefile = write(
        &dir,
        "Makefile",
        "all: foo.o\n\t@gcc -c foo.c\n",
    );

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    let file = db.interner.intern_file(&makefile.canonicalize().unwrap().to_string_lossy());
    let all = db.interner.intern_target("all");
    let rule = db.lookup_fixed(file, all).unwrap();
    assert_eq!(rule.recipe.len(), 1);
    assert!(rule.recipe[0].silent);
    assert_eq!(rule.recipe[0].command, "gcc -c foo.c");
}

#[test]
fn multi_target_rule_shares_deps_and_recipe() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "a b: common.h\n\techo building\n");

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    let file = db.interner.intern_file(&makefile.canonicalize().unwrap().to_string_lossy());
    let a = db.interner.intern_target("a");
    let b = db.interner.intern_target("b");
    assert_eq!(db.lookup_fixed(file, a).unwrap().recipe.len(), 1);
    assert_eq!(db.lookup_fixed(file, b).unwrap().recipe.len(), 1);
}

#[test]
fn reappearing_target_without_recipe_appends_prerequisites() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "all: a\nall: b\n\techo hi\n");

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    let file = db.interner.intern_file(&makefile.canonicalize().unwrap().to_string_lossy());
    let all = db.interner.intern_target("all");
    let rule = db.lookup_fixed(file, all).unwrap();
    assert_eq!(rule.prerequisites.len(), 2);
}

#[test]
fn phony_targets_are_recorded_and_excluded_from_default_goal() {
    let dir = tempdir().unwrap();
    let makefile = write(
        &dir,
        "Makefile",
        ".PHONY: clean\nclean: \n\trm -f *.o\nbuild: clean\n\techo build\n",
    );

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    let clean = db.interner.intern_target("clean");
    let build = db.interner.intern_target("build");
    assert!(db.phony.contains(&clean));
    assert_eq!(db.default_goal, Some(build));
}

#[test]
fn deferred_and_immediate_assignment_differ_in_when_they_expand() {
    let dir = tempdir().unwrap();
    let makefile = write(
        &dir,
        "Makefile",
        "X = before\nDEFERRED = $(X)\nIMMEDIATE := $(X)\nX = after\nall:\n\techo hi\n",
    );

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    assert_eq!(outcome.variables.expand("$(IMMEDIATE)"), "before");
    assert_eq!(outcome.variables.expand("$(DEFERRED)"), "after");
}

#[test]
fn conditional_assignment_does_not_override_existing_value() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "CC = clang\nCC ?= gcc\nall:\n\techo hi\n");

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    assert_eq!(outcome.variables.expand("$(CC)"), "clang");
}

#[test]
fn command_line_variable_outranks_recipe_file_assignment() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "CC = gcc\nall:\n\techo hi\n");

    let outcome = RecipeParser::new()
        .with_command_line_vars(&[("CC".to_string(), "clang".to_string())])
        .parse_file(&makefile)
        .unwrap();
    assert_eq!(outcome.variables.expand("$(CC)"), "clang");
}

#[test]
fn append_assignment_concatenates_with_a_space() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "CFLAGS = -Wall\nCFLAGS += -O2\nall:\n\techo hi\n");

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    assert_eq!(outcome.variables.expand("$(CFLAGS)"), "-Wall -O2");
}

#[test]
fn include_directive_shares_scope_but_indexes_under_top_level_file() {
    let dir = tempdir().unwrap();
    write(&dir, "common.mk", "SHARED = yes\nextra: \n\techo extra\n");
    let makefile = write(&dir, "Makefile", "include common.mk\nall: extra\n\techo all\n");

    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    assert_eq!(outcome.variables.expand("$(SHARED)"), "yes");

    let top_file = db.interner.intern_file(&makefile.canonicalize().unwrap().to_string_lossy());
    let extra = db.interner.intern_target("extra");
    assert!(db.lookup_fixed(top_file, extra).is_some());
}

#[test]
fn missing_tolerant_include_is_silently_ignored() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "-include nope.mk\nall:\n\techo hi\n");
    assert!(RecipeParser::new().parse_file(&makefile).is_ok());
}

#[test]
fn missing_bare_include_warns_but_does_not_abort_the_parse() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "include nope.mk\nall:\n\techo hi\n");
    assert!(RecipeParser::new().parse_file(&makefile).is_ok());
}

#[test]
fn vpath_directive_is_recorded() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "vpath %.c src lib\nall:\n\techo hi\n");
    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    assert_eq!(outcome.database.vpath.len(), 1);
    assert_eq!(outcome.database.vpath[0].pattern, "%.c");
    assert_eq!(outcome.database.vpath[0].dirs.len(), 2);
}

#[test]
fn pattern_rule_is_classified_correctly() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "%.o: %.c\n\tcc -c $< -o $@\n");
    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let db = outcome.database;
    let target = db.interner.intern_target("%.o");
    assert_eq!(db.kind_of(target), Some(RuleKind::Pattern));
}

#[test]
fn backslash_continuation_joins_physical_lines() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "SOURCES = a.c \\\n          b.c\nall:\n\techo hi\n");
    let outcome = RecipeParser::new().parse_file(&makefile).unwrap();
    let words: Vec<&str> = outcome.variables.expand("$(SOURCES)").split_whitespace().collect();
    assert_eq!(words, vec!["a.c", "b.c"]);
}

#[test]
fn malformed_line_is_a_syntax_error() {
    let dir = tempdir().unwrap();
    let makefile = write(&dir, "Makefile", "this is not valid at all\n");
    let err = RecipeParser::new().parse_file(&makefile).unwrap_err();
    assert!(matches!(err, ParseError::Syntax { .. }));
}
