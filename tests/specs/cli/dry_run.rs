//! `-n` dry-run specs (spec §4.I: "parse + compute the dispatch plan,
//! print without submitting").

use crate::prelude::*;

#[test]
fn dry_run_prints_the_plan_without_running_anything() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().args(&["-n", "out.txt"]).passes().stdout_has("out.txt");

    assert!(!project.path().join("out.txt").exists());
}

#[test]
fn dry_run_with_no_target_resolves_the_default_goal() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().args(&["-n"]).passes().stdout_has("out.txt");
}
