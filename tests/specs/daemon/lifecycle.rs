//! `smakd` process lifecycle specs (spec §4.I "fork/exec smakd if not
//! already running").

use crate::prelude::*;
use std::path::Path;

fn daemon_pid(cache_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(cache_dir.join("smakd.pid")).ok()?.trim().parse().ok()
}

#[test]
fn a_running_smakd_is_reused_across_invocations() {
    let project = Project::empty();
    project.file("Makefile", SIMPLE_MAKEFILE);
    project.file("in.txt", "hello\n");

    project.smak().args(&["out.txt"]).passes();
    let first_pid = daemon_pid(project.cache_dir()).expect("smakd should have recorded its pid");

    project.file("in.txt", "hello again\n");
    project.smak().args(&["out.txt"]).passes();
    let second_pid = daemon_pid(project.cache_dir()).expect("smakd pid file should still exist");

    assert_eq!(first_pid, second_pid, "second build should have reused the already-running smakd");
    assert_eq!(project.read("out.txt"), "hello again\n");
}
