// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn parses_submit_job_with_all_three_fields() {
    let cmd: CliCommand = "SUBMIT_JOB all /home/user/proj smak all".parse().expect("parse");
    assert_eq!(
        cmd,
        CliCommand::SubmitJob {
            target: "all".to_string(),
            dir: "/home/user/proj".to_string(),
            command: "smak all".to_string(),
        }
    );
}

#[test]
fn submit_job_without_dir_or_command_defaults_to_empty() {
    let cmd: CliCommand = "SUBMIT_JOB all".parse().expect("parse");
    assert_eq!(cmd, CliCommand::SubmitJob { target: "all".to_string(), dir: String::new(), command: String::new() });
}

#[test]
fn submit_job_with_no_target_is_malformed() {
    assert!("SUBMIT_JOB".parse::<CliCommand>().is_err());
}

#[test]
fn parses_needs_and_mark_dirty_colon_forms() {
    assert_eq!("NEEDS:foo.o".parse::<CliCommand>().expect("parse"), CliCommand::Needs("foo.o".to_string()));
    assert_eq!("MARK_DIRTY:foo.c".parse::<CliCommand>().expect("parse"), CliCommand::MarkDirty("foo.c".to_string()));
    assert_eq!("ASSUME:foo.o".parse::<CliCommand>().expect("parse"), CliCommand::Assume("foo.o".to_string()));
}

#[test]
fn parses_bare_verbs_with_no_payload() {
    assert_eq!("STATUS".parse::<CliCommand>().expect("parse"), CliCommand::Status);
    assert_eq!("LIST_TASKS".parse::<CliCommand>().expect("parse"), CliCommand::ListTasks);
    assert_eq!("LIST_STALE".parse::<CliCommand>().expect("parse"), CliCommand::ListStale);
    assert_eq!("LIST_FILES".parse::<CliCommand>().expect("parse"), CliCommand::ListFiles);
    assert_eq!("WATCH_START".parse::<CliCommand>().expect("parse"), CliCommand::WatchStart);
    assert_eq!("WATCH_STOP".parse::<CliCommand>().expect("parse"), CliCommand::WatchStop);
    assert_eq!("KILL_WORKERS".parse::<CliCommand>().expect("parse"), CliCommand::KillWorkers);
    assert_eq!("RESET".parse::<CliCommand>().expect("parse"), CliCommand::Reset);
    assert_eq!("SHUTDOWN".parse::<CliCommand>().expect("parse"), CliCommand::Shutdown);
}

#[test]
fn parses_worker_count_verbs() {
    assert_eq!("ADD_WORKER 3".parse::<CliCommand>().expect("parse"), CliCommand::AddWorker(3));
    assert_eq!("REMOVE_WORKER 1".parse::<CliCommand>().expect("parse"), CliCommand::RemoveWorker(1));
    assert_eq!("RESTART_WORKERS 4".parse::<CliCommand>().expect("parse"), CliCommand::RestartWorkers(4));
}

#[test]
fn worker_count_verbs_reject_a_non_numeric_argument() {
    assert!("ADD_WORKER all".parse::<CliCommand>().is_err());
}

#[test]
fn parses_cli_owner_and_env() {
    assert_eq!("CLI_OWNER 4242".parse::<CliCommand>().expect("parse"), CliCommand::ClientOwner(4242));
    assert_eq!(
        "ENV CC=clang".parse::<CliCommand>().expect("parse"),
        CliCommand::Env { name: "CC".to_string(), value: "clang".to_string() }
    );
}

#[test]
fn env_value_may_contain_an_equals_sign() {
    assert_eq!(
        "ENV CFLAGS=-DFOO=1".parse::<CliCommand>().expect("parse"),
        CliCommand::Env { name: "CFLAGS".to_string(), value: "-DFOO=1".to_string() }
    );
}

#[test]
fn unknown_verb_is_an_error() {
    assert!("FROBNICATE".parse::<CliCommand>().is_err());
}

#[test]
fn empty_line_is_an_error() {
    assert!("".parse::<CliCommand>().is_err());
}
