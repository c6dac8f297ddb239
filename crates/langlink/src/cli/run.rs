//! `run` subcommand: keep the accessory in sync until Ctrl+C.

use std::path::Path;

use super::{LanglinkError, RUNNING, Result, load_config, state_paths};
use langlink_lib::language::open_languages;
use langlink_lib::link::SystemSerial;
use langlink_lib::monitor::Supervisor;

pub(super) fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    if let Err(problems) = config.validate() {
        for p in &problems {
            eprintln!("[config] {p}");
        }
        return Err(LanglinkError::Config(format!(
            "{} problem{} in settings",
            problems.len(),
            if problems.len() == 1 { "" } else { "s" }
        )));
    }
    let paths = state_paths(config_path)?;
    let languages = open_languages()?;

    let mut supervisor = Supervisor::from_config(SystemSerial, languages, &config, &paths)?;
    println!("[link]   waiting for \"{}\" at {} baud", config.port_pattern, config.baud_rate);
    println!("[colors] {}", paths.colors.display());
    println!("Press Ctrl+C to stop.");

    supervisor.run(&RUNNING);

    println!("Stopped.");
    Ok(())
}
