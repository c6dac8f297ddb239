//! langlink: keeps a serial keyboard accessory in sync with the host's input language.
//!
//! Console subsystem: works normally in PowerShell, cmd, and other terminals.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;

/// Shared shutdown flag, cleared by the Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "langlink",
    version,
    about = "Mirror the active keyboard language onto a serial accessory"
)]
struct Args {
    /// Output as JSON (for ports, colors, languages, config)
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file; colors and the language snapshot live beside it
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log connection transitions and sends
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

// ── Ctrl+C handler ──

#[cfg(windows)]
unsafe extern "system" fn ctrl_handler(_ctrl_type: u32) -> windows::core::BOOL {
    RUNNING.store(false, Ordering::SeqCst);
    windows::core::BOOL(1)
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    #[cfg(windows)]
    unsafe {
        let _ = windows::Win32::System::Console::SetConsoleCtrlHandler(Some(ctrl_handler), true);
    }

    #[cfg(not(windows))]
    {
        ctrlc::set_handler(move || {
            RUNNING.store(false, Ordering::SeqCst);
        })
        .ok();
    }

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
