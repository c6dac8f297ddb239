//! `ports` subcommand: list serial ports and flag the accessory.

use std::path::Path;

use super::{PortsOutput, Result, load_config, print_json};
use langlink_lib::link::{LinkSupervisor, SystemSerial};

pub(super) fn cmd_ports(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let link = LinkSupervisor::new(SystemSerial, config.link_settings());
    let ports = link.list_ports();

    if json {
        return print_json(&PortsOutput {
            pattern: config.port_pattern,
            count: ports.len(),
            ports,
        });
    }

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!(
        "Found {} serial port{} (pattern \"{}\"):",
        ports.len(),
        if ports.len() == 1 { "" } else { "s" },
        config.port_pattern
    );
    println!();

    for (i, listing) in ports.iter().enumerate() {
        let marker = if listing.matches { "  <- match" } else { "" };
        println!("  [{}] {}{marker}", i + 1, listing.port.name);
        println!("      {}", listing.port.description);
    }

    Ok(())
}
