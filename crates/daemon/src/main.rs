// SPDX-License-Identifier: MIT

//! smakd
//!
//! The job-master process that owns the dependency graph for one recipe
//! file and dispatches work to worker processes.
//!
//! Architecture:
//! - Listener task: spawned tasks handling socket I/O, emit events to a channel
//! - Engine loop: the main task, processing events sequentially

use std::path::PathBuf;
use std::sync::Arc;

use smak_daemon::engine::{self, EngineOptions};
use smak_daemon::listener::Listeners;
use smak_daemon::{config::Config, portfile};
use smak_engine::Master;
use smak_storage::{Cache, MasterWal};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::args().nth(1).as_deref() {
        Some("--version" | "-V") => {
            println!("smakd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help" | "-h") => {
            print_help();
            return Ok(());
        }
        _ => {}
    }

    let mut args = std::env::args().skip(1);
    let recipe_file = PathBuf::from(args.next().ok_or("usage: smakd <recipe-file> <cwd> [VAR=VALUE...]")?);
    let cwd = PathBuf::from(args.next().ok_or("usage: smakd <recipe-file> <cwd> [VAR=VALUE...]")?);
    let overrides: Vec<(String, String)> = args
        .filter_map(|arg| arg.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();

    let config = Config::load(&recipe_file, &cwd)?;

    smak_daemon::logging::rotate_log_if_needed(&config.log_path);
    let _log_guard = smak_daemon::logging::setup_logging(&config.log_path, config.debug)?;

    info!(recipe_file = %config.recipe_file.display(), "starting smakd");

    let master = build_master(&config, &overrides)?;

    let (listeners, ports) = Listeners::bind().await?;
    let port_path = portfile::write(ports.observer, ports.control, ports.worker)?;
    info!(path = %port_path.display(), "wrote port file");

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    listeners.spawn_accept_loops(events_tx);

    println!("READY");

    let shutdown = Arc::new(Notify::new());
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        signal_shutdown.notify_one();
    });

    let options = EngineOptions { auto_rescan: std::env::var("SMAK_AUTO_RESCAN").is_ok_and(|v| v == "1") };
    engine::run(master, events_rx, shutdown, options).await;

    portfile::remove(std::process::id());
    info!("smakd stopped");
    Ok(())
}

/// Parse the recipe file (or reuse a cached parse, spec §4.D), and replay
/// the completion WAL (crash recovery, see `smak-storage`) so a restarted
/// daemon picks up where it left off. `overrides` are the CLI's trailing
/// `VAR=VALUE` positional args (spec §3), applied after either path so they
/// always outrank whatever the cache or the recipe file itself set.
fn build_master(config: &Config, overrides: &[(String, String)]) -> Result<Master, Box<dyn std::error::Error>> {
    let canonical = std::fs::canonicalize(&config.recipe_file)?;
    let canonical_str = canonical.to_string_lossy().into_owned();

    let (database, mut variables) = match Cache::load(&config.cache_dir, &config.recipe_file) {
        Ok(Some((database, variable_bindings, _input_mtimes))) => {
            info!(path = %config.recipe_file.display(), "loaded cached recipe database");
            (database, smak_recipe::VariableTable::from_snapshot(variable_bindings))
        }
        Ok(None) => {
            let parsed = smak_recipe::RecipeParser::new().parse_file(&config.recipe_file)?;
            if let Err(e) = Cache::save(
                &config.cache_dir,
                &config.recipe_file,
                &parsed.database,
                &parsed.variables.snapshot(),
                &parsed.input_mtimes,
            ) {
                error!(error = %e, "failed to write state cache, continuing without it");
            }
            (parsed.database, parsed.variables)
        }
        Err(e) => {
            error!(error = %e, "state cache unreadable, reparsing from scratch");
            let parsed = smak_recipe::RecipeParser::new().parse_file(&config.recipe_file)?;
            (parsed.database, parsed.variables)
        }
    };
    variables.apply_overrides(overrides);

    let file_id = database.interner.intern_file(&canonical_str);
    let mut master = Master::new(database, file_id, variables, config.cwd.clone()).with_ignore(config.ignore.clone());

    match MasterWal::open(&config.wal_path) {
        Ok(wal) => {
            let events = MasterWal::replay(&config.wal_path)?;
            master = master.with_wal(wal);
            master.apply_wal_events(events);
        }
        Err(e) => {
            error!(error = %e, "could not open completion WAL, starting without crash recovery");
        }
    }

    Ok(master)
}

fn print_help() {
    println!("smakd {}", env!("CARGO_PKG_VERSION"));
    println!("Job-master process for smak build graphs.");
    println!();
    println!("USAGE:");
    println!("    smakd <recipe-file> <cwd> [VAR=VALUE...]");
    println!();
    println!("smakd is started by the `smak` CLI and should not normally be");
    println!("invoked directly. It listens on three TCP ports (control,");
    println!("worker, observer) announced via a port file under $TMPDIR.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}
