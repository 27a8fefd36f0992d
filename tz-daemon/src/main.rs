//! Thermzone Daemon (thermzoned)
//!
//! Hosts one simulated thermal zone and serves it to local clients over a
//! Unix domain socket.
//!
//! # Workers
//! - **Expiry worker**: turns fired timers into `on_timer_expired` calls
//! - **Interrupt worker**: receives band-crossed signals
//! - **Server**: one task per connection; `WaitRead` parks its connection
//!   until the zone delivers an outcome
//!
//! # Hardening
//! - Restrictive umask (0077) and no core dumps
//! - Symlink refusal on the socket path
//! - Message size, connection and rate limits in the server

mod mailbox;
mod scheduler;
mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use tz_core::constants::logging;
use tz_core::settings::{self, ZoneSettings};
use tz_core::ThermalZone;

use crate::mailbox::{run_interrupt_worker, CompletionMailbox};
use crate::scheduler::{run_expiry_worker, TokioScheduler};
use crate::server::ServerContext;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Security Hardening
// ============================================================================

/// Disable core dumps
fn disable_core_dumps() {
    let limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: setrlimit only reads the initialized struct passed by reference.
    if unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) } != 0 {
        warn!("Failed to disable core dumps");
    }
}

/// Set restrictive umask
fn set_secure_umask() {
    // SAFETY: umask only replaces the process file creation mask.
    unsafe { libc::umask(0o077) };
}

/// Validate socket path before binding
fn validate_socket_path(path: &str) -> Result<(), String> {
    let p = Path::new(path);

    if !p.is_absolute() {
        return Err("Socket path must be absolute".into());
    }

    if path.contains("..") {
        return Err("Socket path contains path traversal".into());
    }

    if path.contains('\0') {
        return Err("Socket path contains null byte".into());
    }

    if let Some(parent) = p.parent() {
        if !parent.exists() {
            return Err(format!("Parent directory does not exist: {:?}", parent));
        }
    }

    if p.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err("Socket path is a symlink - refusing".into());
    }

    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

fn pid_file_path(socket_path: &str) -> PathBuf {
    Path::new(socket_path).with_extension("pid")
}

/// Write PID file next to the socket, refusing if another instance is alive
fn write_pid_file(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if path.exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: signal 0 only checks that the process exists.
                if old_pid > 0 && unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("Another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path.display());
    Ok(())
}

fn cleanup(socket_path: &str) {
    debug!("Starting cleanup...");

    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket: {}", e);
        }
    }

    let pid_file = pid_file_path(socket_path);
    if pid_file.exists() {
        if let Err(e) = std::fs::remove_file(&pid_file) {
            warn!("Failed to remove PID file: {}", e);
        }
    }

    info!("Cleanup complete");
}

// ============================================================================
// CLI
// ============================================================================

struct Args {
    socket_path: Option<String>,
    config_path: Option<PathBuf>,
}

enum Command {
    Run(Args),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut parsed = Args {
        socket_path: None,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-s" | "--socket" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--socket requires a path argument");
                };
                parsed.socket_path = Some(path.clone());
            }
            "-c" | "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config requires a path argument");
                };
                parsed.config_path = Some(PathBuf::from(path));
            }
            arg => bail!("Unknown argument: {}", arg),
        }
        i += 1;
    }

    Ok(Command::Run(parsed))
}

fn print_help() {
    eprintln!("thermzoned {} - simulated thermal zone daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    thermzoned [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -s, --socket PATH   Socket path (default from settings, then /run)");
    eprintln!("    -c, --config PATH   Settings file (default ~/.config/thermzone/settings.json)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}      Log filter (trace, debug, info, warn, error)", logging::LOG_ENV);
}

// ============================================================================
// Logging
// ============================================================================

/// Install the global subscriber, returning whether the journal is used
fn init_logging(filter: &str) -> bool {
    use tracing_subscriber::prelude::*;

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();
    false
}

fn load_settings(config_path: Option<&Path>) -> anyhow::Result<ZoneSettings> {
    match config_path {
        Some(path) => settings::load_settings_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => settings::load_settings().context("Failed to load settings"),
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 1: Hardening before anything touches the filesystem
    set_secure_umask();

    // PHASE 2: Arguments and settings
    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            println!("thermzoned {}", VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let zone_settings = load_settings(args.config_path.as_deref())?;

    // PHASE 3: Logging
    let log_filter = std::env::var(logging::LOG_ENV).unwrap_or_else(|_| zone_settings.log_level.clone());
    let use_journald = init_logging(&log_filter);
    disable_core_dumps();

    info!("STARTUP: thermzoned {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    let socket_path = args
        .socket_path
        .unwrap_or_else(|| zone_settings.resolved_socket_path());

    if let Err(e) = validate_socket_path(&socket_path) {
        error!("Invalid socket path: {}", e);
        std::process::exit(1);
    }

    // PHASE 4: PID file
    let pid_file = pid_file_path(&socket_path);
    if let Err(e) = write_pid_file(&pid_file) {
        error!("Could not write PID file {}: {}", pid_file.display(), e);
        std::process::exit(1);
    }

    // PHASE 5: Signal handling
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received interrupt - initiating shutdown");
        shutdown_signal.notify_one();
    }) {
        warn!("Failed to set signal handler: {}. Shutdown via signals may not work cleanly.", e);
    }

    info!("STARTUP: Socket path: {}", socket_path);
    info!("STARTUP: PID: {}", std::process::id());
    info!("STARTUP: Log filter: {}", log_filter);
    info!(
        "STARTUP: Zone reset temperature {}, max pending {}",
        zone_settings.reset_temperature, zone_settings.max_pending
    );

    // PHASE 6: Zone and its workers
    let (interrupts_tx, interrupts_rx) = mpsc::unbounded_channel();
    let mailbox = Arc::new(CompletionMailbox::new(interrupts_tx));
    let (scheduler, fired) = TokioScheduler::new(tokio::runtime::Handle::current());
    let zone = Arc::new(ThermalZone::new(&zone_settings, Arc::new(scheduler), mailbox.clone()));

    let expiry_handle = tokio::spawn(run_expiry_worker(zone.clone(), fired));
    let interrupt_handle = tokio::spawn(run_interrupt_worker(interrupts_rx));
    info!("Expiry and interrupt workers started");

    // PHASE 7: Serve until signalled
    let ctx = ServerContext {
        zone: zone.clone(),
        mailbox,
    };
    let result = server::run_server(&socket_path, ctx, async move {
        shutdown.notified().await;
    })
    .await;

    // PHASE 8: Drain the zone so parked clients get an answer
    zone.shutdown();
    expiry_handle.abort();
    interrupt_handle.abort();

    // PHASE 9: Cleanup
    cleanup(&socket_path);

    if let Err(e) = result {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    info!("SHUTDOWN: Daemon terminated gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("thermzoned")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        match parse_args(&argv(&["-s", "/tmp/tz.sock", "-c", "/tmp/tz.json"])).unwrap() {
            Command::Run(args) => {
                assert_eq!(args.socket_path.as_deref(), Some("/tmp/tz.sock"));
                assert_eq!(args.config_path, Some(PathBuf::from("/tmp/tz.json")));
            }
            _ => panic!("expected run"),
        }
        assert!(matches!(parse_args(&argv(&["-h"])).unwrap(), Command::Help));
        assert!(matches!(parse_args(&argv(&["--version"])).unwrap(), Command::Version));
        assert!(parse_args(&argv(&["-s"])).is_err());
        assert!(parse_args(&argv(&["--bogus"])).is_err());
    }

    #[test]
    fn test_validate_socket_path() {
        assert!(validate_socket_path("relative.sock").is_err());
        assert!(validate_socket_path("/tmp/../etc/tz.sock").is_err());
        assert!(validate_socket_path("/definitely/missing/dir/tz.sock").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tz.sock");
        assert!(validate_socket_path(&path.to_string_lossy()).is_ok());

        let link = dir.path().join("link.sock");
        std::os::unix::fs::symlink(&path, &link).unwrap();
        assert!(validate_socket_path(&link.to_string_lossy()).is_err());
    }

    #[test]
    fn test_pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("tz.sock");
        let pid_file = pid_file_path(&socket.to_string_lossy());
        assert_eq!(pid_file, dir.path().join("tz.pid"));

        write_pid_file(&pid_file).unwrap();
        // Our own PID is alive, so a second instance must be refused.
        let err = write_pid_file(&pid_file).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AddrInUse);

        std::fs::write(&pid_file, "not a pid").unwrap();
        write_pid_file(&pid_file).unwrap();
    }
}
