// SPDX-License-Identifier: MIT

//! The client half of the CLI/attach wire protocol (spec §4.H), grounded
//! in the teacher's `client.rs` request/response split — but over a plain
//! TCP line socket rather than the teacher's length-prefixed JSON Unix
//! socket, matching `smak-daemon`'s wire format.

use crate::error::CliError;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;

fn connect(port: u16) -> std::io::Result<TcpStream> {
    TcpStream::connect(("127.0.0.1", port))
}

/// `SUBMIT_JOB target dir command`, streaming `OUTPUT`/`ERROR` lines (and,
/// unless `silent`, the recipe-echo lines broadcast before each dispatch)
/// to the terminal until `JOB_COMPLETE`, returning the target's exit code
/// (spec §4.I build mode: "stream output, wait for JOB_COMPLETE, exit with
/// its code").
pub fn submit_and_stream(control_port: u16, target: &str, dir: &Path, invocation: &str, silent: bool) -> Result<i32, CliError> {
    let stream = connect(control_port)?;
    let mut writer = stream.try_clone()?;
    writeln!(writer, "SUBMIT_JOB {target} {} {invocation}", dir.display())?;

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix("JOB_COMPLETE ") {
            let mut parts = rest.split_whitespace();
            let _target = parts.next();
            let code: i32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1);
            return Ok(code);
        }
        if let Some(rest) = line.strip_prefix("OUTPUT ") {
            println!("{rest}");
        } else if let Some(rest) = line.strip_prefix("ERROR ") {
            eprintln!("{rest}");
        } else if !silent {
            // An un-prefixed broadcast line is an echoed recipe command
            // (spec §7 "every recipe's stdout and stderr are forwarded
            // verbatim"; the command echo itself isn't stdout/stderr, but
            // follows the same un-prefixed wire convention).
            println!("{line}");
        }
    }
    Err(CliError::Protocol("smakd closed the connection before JOB_COMPLETE".to_string()))
}

/// `ENV NAME=VALUE` (spec §4.F) — used for `VAR=VALUE` CLI arguments.
pub fn send_env(control_port: u16, name: &str, value: &str) -> Result<(), CliError> {
    let mut stream = connect(control_port)?;
    writeln!(stream, "ENV {name}={value}")?;
    Ok(())
}

/// Read-only attach (spec §4.H: "other connected clients become read-only
/// observers"): print every broadcast line until the daemon disconnects.
pub fn attach_observer(observer_port: u16) -> Result<(), CliError> {
    let stream = connect(observer_port)?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        println!("{}", line?);
    }
    Ok(())
}

/// Interactive CLI mode (spec §4.I `-cli`): a line-editor REPL issuing the
/// verbs of spec §4.H directly and printing whatever comes back. Response
/// shapes vary by verb (a bare acknowledgement, a `*_END`-terminated list,
/// or an indefinite stream of `OUTPUT`/`ERROR`/`JOB_COMPLETE` from a
/// `SUBMIT_JOB`), so rather than parse each verb's framing here, one
/// command's reply is whatever arrives before the socket goes quiet for a
/// moment — a short read timeout stands in for "done responding".
pub fn interactive(control_port: u16) -> Result<(), CliError> {
    use std::io::{self, BufRead as _};
    use std::time::Duration;

    let stream = connect(control_port)?;
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let stdin = io::stdin();

    print!("smak> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            print!("smak> ");
            io::stdout().flush()?;
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        writeln!(writer, "{trimmed}")?;
        drain_responses(&mut reader)?;
        print!("smak> ");
        io::stdout().flush()?;
    }
    Ok(())
}

fn drain_responses(reader: &mut BufReader<TcpStream>) -> Result<(), CliError> {
    let mut response = String::new();
    loop {
        response.clear();
        match reader.read_line(&mut response) {
            Ok(0) => {
                println!("(smakd disconnected)");
                return Ok(());
            }
            Ok(_) => println!("{}", response.trim_end()),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}
