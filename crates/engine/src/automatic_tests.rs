// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn substitutes_all_four_automatic_variables() {
    let vars = AutomaticVars::new("foo.o", &["foo.c".to_string(), "foo.h".to_string()], Some("foo"));
    assert_eq!(vars.substitute("cp $< $@"), "cp foo.c foo.o");
    assert_eq!(vars.substitute("echo $^"), "echo foo.c foo.h");
    assert_eq!(vars.substitute("echo $*"), "echo foo");
}

#[test]
fn all_prereqs_dedupes_preserving_first_occurrence_order() {
    let vars = AutomaticVars::new("out", &["a".to_string(), "b".to_string(), "a".to_string()], None);
    assert_eq!(vars.all_prereqs, "a b");
}

#[test]
fn dollar_dollar_is_left_alone_by_substitution() {
    let vars = AutomaticVars::new("out", &[], None);
    // `$$` literal-dollar escaping is the expander's job (spec §4.A), not
    // automatic-variable substitution's; this module must not touch it.
    assert_eq!(vars.substitute("echo $$HOME"), "echo $$HOME");
}

#[test]
fn build_command_joins_recipe_lines_with_and_and() {
    let recipe = vec![
        RecipeLine::parse("echo one"),
        RecipeLine::parse("echo two"),
    ];
    let vars = AutomaticVars::new("out", &[], None);
    let (command, echoed) = build_command(&recipe, &vars);
    assert_eq!(command, "echo one && echo two");
    assert_eq!(echoed, vec!["echo one".to_string(), "echo two".to_string()]);
}

#[test]
fn silent_lines_are_excluded_from_echo_but_included_in_command() {
    let recipe = vec![RecipeLine::parse("@echo quiet"), RecipeLine::parse("echo loud")];
    let vars = AutomaticVars::new("out", &[], None);
    let (command, echoed) = build_command(&recipe, &vars);
    assert_eq!(command, "echo quiet && echo loud");
    assert_eq!(echoed, vec!["echo loud".to_string()]);
}

#[test]
fn ignore_error_lines_do_not_abort_the_and_and_chain() {
    let recipe = vec![RecipeLine::parse("-false"), RecipeLine::parse("echo still-runs")];
    let vars = AutomaticVars::new("out", &[], None);
    let (command, _) = build_command(&recipe, &vars);
    assert_eq!(command, "{ false; } || true && echo still-runs");
}
