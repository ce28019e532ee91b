// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn round_trips_observer_and_control_ports_and_cleans_up() {
    // Both assertions share this process's pid-keyed file, so they live in
    // one test: cargo runs test functions concurrently within a process,
    // and two tests touching the same path would race.
    let path = write(9001, 9002, 9003).expect("write port file");
    assert_eq!(path, path_for(std::process::id()));

    let (observer, control, worker) = read(std::process::id()).expect("read port file");
    assert_eq!(observer, 9001);
    assert_eq!(control, 9002);
    assert_eq!(worker, 9003);

    remove(std::process::id());
    assert!(read(std::process::id()).is_err());
}

#[test]
fn reading_a_missing_pid_is_an_error() {
    assert!(read(u32::MAX).is_err());
}
