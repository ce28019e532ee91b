//! CLI help/usage output specs (spec §6 "exit codes 0 success, 1 build
//! failure, 2 usage").

use crate::prelude::*;

#[test]
fn smak_help_shows_usage() {
    smak().args(&["--help"]).passes().stdout_has("Usage:");
}

#[test]
fn smak_version_shows_version() {
    smak().args(&["--version"]).passes().stdout_has("0.1");
}

#[test]
fn smak_no_makefile_is_a_usage_error() {
    let project = Project::empty();
    project.smak().fails().code_eq(2).stderr_has("no Makefile found");
}
