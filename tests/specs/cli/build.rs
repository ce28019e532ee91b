//! End-to-end build specs: `smak` spawns `smakd` and an `smak-worker`,
//! submits a job, and streams its output to completion (spec §4.I build
//! mode).

use crate::prelude::*;

#[test]
fn builds_default_goal_with_no_target_argument() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().passes();

    assert_eq!(project.read("out.txt"), "hello\n");
}

#[test]
fn builds_named_target() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().args(&["out.txt"]).passes();

    assert_eq!(project.read("out.txt"), "hello\n");
}

#[test]
fn second_invocation_reuses_the_already_built_output_via_the_state_cache() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().args(&["out.txt"]).passes();
    // Recipe file is unchanged, so the second invocation should hit the
    // state cache instead of re-parsing (spec §4.D), and the build is a
    // no-op since out.txt is already newer than in.txt.
    project.smak().args(&["out.txt"]).passes();

    assert_eq!(project.read("out.txt"), "hello\n");
}

#[test]
fn missing_recipe_file_named_with_f_is_a_usage_error() {
    let project = Project::empty();
    project.smak().args(&["-f", "nonexistent.mk", "all"]).fails();
}

#[test]
fn recipe_command_failure_propagates_nonzero_exit_code() {
    let project = Project::empty();
    project.file(
        "Makefile",
        "all:\n\texit 7\n",
    );

    project.smak().fails().code_eq(7);
}

#[test]
fn variable_override_threads_through_to_the_recipe() {
    let project = Project::empty();
    project.file(
        "Makefile",
        "all:\n\techo $(GREETING) > greeting.txt\n",
    );

    project.smak().args(&["GREETING=howdy"]).passes();

    assert_eq!(project.read("greeting.txt").trim(), "howdy");
}
