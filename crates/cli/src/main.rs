// SPDX-License-Identifier: MIT

//! smak
//!
//! The driver process a user actually types: resolves the recipe file and
//! working directory, makes sure an `smakd` is running for them (spawning
//! one if not, spec §4.I "build: fork/exec smakd if not already running"),
//! spawns the local/remote `smak-worker` processes the build needs, and
//! either submits one job and streams its output to completion or drops
//! into one of the attach-style modes.

mod client;
mod daemon_process;
mod error;

use clap::Parser;
use error::CliError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// `clap`-derived flags (spec §4.I, §6 "CLI flags").
#[derive(Parser, Debug)]
#[command(name = "smak", version, about = "A drop-in POSIX-make-family build tool")]
struct Cli {
    /// Recipe file to read (default: `Makefile` or `makefile` in the cwd).
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<PathBuf>,

    /// Change to DIR before doing anything else.
    #[arg(short = 'C', value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Parse and compute the dispatch plan, print it, and exit without submitting.
    #[arg(short = 'n')]
    dry_run: bool,

    /// Don't echo recipe commands before running them.
    #[arg(short = 's')]
    silent: bool,

    /// Number of local worker processes to spawn; bare `-j` means CPU count.
    #[arg(short = 'j', num_args = 0..=1, default_missing_value = "0", value_parser = clap::value_parser!(usize))]
    jobs: Option<usize>,

    /// Drop into the interactive line-editor CLI instead of building.
    #[arg(long = "cli")]
    interactive: bool,

    /// Attach to an already-running smakd as a read-only observer instead
    /// of submitting a build (spec §4.I "attach" mode). Never spawns a
    /// daemon or workers; fails if none is running for this project.
    #[arg(long = "attach")]
    attach: bool,

    /// `host[:dir]` to launch a remote worker on via `ssh -R`. Repeatable.
    #[arg(long = "ssh", value_name = "HOST[:DIR]")]
    ssh: Vec<String>,

    /// Target names and `VAR=VALUE` overrides, in any order.
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("smak: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Rewrite smak's single-dash multi-letter flags (`-cli`, `-ssh`) to the
/// double-dash long-option spelling `clap`'s derive macro expects, so the
/// spec's exact flag surface (`-cli`, not `--cli`) still works from argv.
fn normalize_args(args: std::env::Args) -> Vec<String> {
    args.map(|arg| {
        if let Some(rest) = arg.strip_prefix("-cli") {
            format!("--cli{rest}")
        } else if let Some(rest) = arg.strip_prefix("-ssh") {
            format!("--ssh{rest}")
        } else {
            arg
        }
    })
    .collect()
}

fn run(cli: Cli) -> Result<i32, CliError> {
    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)?;
    }
    let cwd = std::env::current_dir()?;

    if cli.attach {
        let (observer, _control, _worker_port) = daemon_process::find_running_daemon(&cwd)?;
        client::attach_observer(observer)?;
        return Ok(0);
    }

    let recipe_file = resolve_recipe_file(cli.file.as_deref(), &cwd)?;

    let (overrides, targets) = split_args(&cli.args);
    apply_recursion_env();

    if cli.interactive {
        let (_observer, control, worker_port) = daemon_process::ensure_daemon(&recipe_file, &cwd, &overrides)?;
        spawn_workers(worker_port, cli.jobs, &cli.ssh)?;
        client::interactive(control)?;
        return Ok(0);
    }

    if cli.dry_run {
        return dry_run(&recipe_file, &cwd, &overrides, &targets);
    }

    let (_observer, control, worker_port) = daemon_process::ensure_daemon(&recipe_file, &cwd, &overrides)?;
    spawn_workers(worker_port, cli.jobs, &cli.ssh)?;

    let target = targets.first().cloned().unwrap_or_default();
    let invocation = std::env::args().collect::<Vec<_>>().join(" ");
    client::submit_and_stream(control, &target, &cwd, &invocation, cli.silent)
}

/// `-n`: build the same `Master` the daemon would, without ever listening
/// on a socket or touching a worker, and print what it would have run.
fn dry_run(recipe_file: &Path, cwd: &Path, overrides: &[(String, String)], targets: &[String]) -> Result<i32, CliError> {
    let parsed = smak_recipe::RecipeParser::new()
        .with_command_line_vars(overrides)
        .parse_file(recipe_file)
        .map_err(|e| CliError::Protocol(e.to_string()))?;

    let file_id = parsed.database.interner.intern_file(&recipe_file.to_string_lossy());
    let mut master = smak_engine::Master::new(parsed.database, file_id, parsed.variables, cwd.to_path_buf());

    let target = targets.first().cloned().or_else(|| master.default_goal_name());
    let Some(target) = target else {
        eprintln!("smak: no target specified and no default goal");
        return Ok(2);
    };

    master.submit_job(&target, smak_core::ClientId::new("dry-run"));
    for (target, command) in master.dry_run_plan() {
        println!("{target}: {command}");
    }
    Ok(0)
}

/// `VAR=VALUE` positional args vs. target-name positional args (spec §3,
/// §6) — the grammar distinguishes them purely by the presence of `=`.
fn split_args(args: &[String]) -> (Vec<(String, String)>, Vec<String>) {
    let mut overrides = Vec::new();
    let mut targets = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => overrides.push((name.to_string(), value.to_string())),
            None => targets.push(arg.clone()),
        }
    }
    (overrides, targets)
}

/// `-f FILE`, or the first of `Makefile`/`makefile` that exists in `cwd`.
fn resolve_recipe_file(file: Option<&Path>, cwd: &Path) -> Result<PathBuf, CliError> {
    if let Some(file) = file {
        return Ok(cwd.join(file));
    }
    for candidate in ["Makefile", "makefile"] {
        let path = cwd.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(CliError::Usage("no Makefile found in this directory; use -f to name one".to_string()))
}

/// `USR_SMAK_OPT`/`SMAK_RECURSION_LEVEL` (spec §6 "recursive-make
/// convention"): on a top-level invocation, `USR_SMAK_OPT` (if set) is
/// prepended to argv for child `smak` invocations to inherit via the
/// recipe's own `$(MAKE)` re-invocation; on a recursive one, only the
/// level counter advances.
fn apply_recursion_env() {
    let level: u32 = std::env::var("SMAK_RECURSION_LEVEL").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    std::env::set_var("SMAK_RECURSION_LEVEL", (level + 1).to_string());
}

/// Spawn the worker processes this build needs: `jobs` local `smak-worker`
/// processes dialing `worker_port` directly, plus one remote worker per
/// `-ssh host[:dir]` tunneled in via `ssh host -R port:localhost:port --
/// smak-worker` (spec §4.E "Remote workers").
fn spawn_workers(worker_port: u16, jobs: Option<usize>, ssh_hosts: &[String]) -> Result<(), CliError> {
    let count = match jobs {
        None if ssh_hosts.is_empty() => 1,
        None => 0,
        Some(0) => num_cpus::get(),
        Some(n) => n,
    };

    let worker_bin = find_worker_binary();
    for _ in 0..count {
        Command::new(&worker_bin)
            .arg(worker_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CliError::DaemonStartFailed(format!("failed to spawn smak-worker: {e}")))?;
    }

    for spec in ssh_hosts {
        let (host, dir) = spec.split_once(':').map_or((spec.as_str(), None), |(h, d)| (h, Some(d)));
        let mut cmd = Command::new("ssh");
        cmd.arg(host).arg("-R").arg(format!("{worker_port}:localhost:{worker_port}"));
        if let Some(dir) = dir {
            cmd.arg("--").arg("cd").arg(dir).arg("&&").arg("smak-worker").arg(worker_port.to_string());
        } else {
            cmd.arg("--").arg("smak-worker").arg(worker_port.to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CliError::DaemonStartFailed(format!("failed to ssh to {host}: {e}")))?;
    }
    Ok(())
}

/// Find the `smak-worker` binary next to the running `smak` executable,
/// falling back to `$PATH` (mirrors `daemon_process::find_smakd_binary`).
fn find_worker_binary() -> PathBuf {
    if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        let sibling = dir.join("smak-worker");
        if sibling.exists() {
            return sibling;
        }
    }
    PathBuf::from("smak-worker")
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
