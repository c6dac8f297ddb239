//! CLI subcommands: run the link, inspect ports, colors, languages and settings.

mod colors;
mod config_cmd;
mod languages;
mod ports;
mod run;

use std::path::Path;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use langlink_lib::color::Color;
pub(super) use langlink_lib::config::{Config, StatePaths};
pub(super) use langlink_lib::error::{LanglinkError, Result};
pub(super) use langlink_lib::installed::SnapshotEntry;
pub(super) use langlink_lib::language::LanguageId;
pub(super) use langlink_lib::link::PortListing;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// `"path (present)"` / `"path (not found)"`.
pub(super) fn file_label(path: &Path) -> String {
    let status = if path.exists() { "present" } else { "not found" };
    format!("{} ({status})", path.display())
}

/// Load settings from `custom_path`, or from the default location.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

/// Where the persisted files live for this invocation.
pub(super) fn state_paths(custom_path: Option<&Path>) -> Result<StatePaths> {
    match custom_path {
        Some(path) => Ok(StatePaths::for_config(path)),
        None => StatePaths::default_location()
            .ok_or_else(|| LanglinkError::Config("No config directory".into())),
    }
}

fn to_json(value: &impl Serialize) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| LanglinkError::Store(e.to_string()))
}

/// Print a JSON document on stdout.
pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct PortsOutput {
    pub pattern: String,
    pub count: usize,
    pub ports: Vec<PortListing>,
}

#[derive(Serialize)]
pub(super) struct ColorsOutput {
    pub file: String,
    pub file_exists: bool,
    pub palette: Vec<Color>,
    pub assignments: Vec<ColorAssignmentJson>,
    pub free: Vec<Color>,
}

#[derive(Serialize)]
pub(super) struct ColorAssignmentJson {
    pub id: LanguageId,
    pub code: String,
    pub name: String,
    pub color: Option<Color>,
}

#[derive(Serialize)]
pub(super) struct LanguagesOutput {
    pub file: String,
    pub file_exists: bool,
    pub count: usize,
    pub languages: Vec<SnapshotEntry>,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
    pub files: ConfigFilesJson,
}

#[derive(Serialize)]
pub(super) struct ConfigFilesJson {
    pub colors: Option<String>,
    pub colors_exists: bool,
    pub snapshot: Option<String>,
    pub snapshot_exists: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Keep the accessory in sync until Ctrl+C
    Run,

    /// List serial ports and whether each matches the configured pattern
    Ports,

    /// Show language color assignments and the free pool
    Colors,

    /// Show the last recorded set of installed languages
    Languages,

    /// Show current configuration and file paths
    Config {
        /// Write a config file holding the default settings first (never overwrites)
        #[arg(long)]
        init: bool,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Run => {
            if json {
                warn_json_unsupported("run");
            }
            run::cmd_run(config_path)
        }
        Command::Ports => ports::cmd_ports(json, config_path),
        Command::Colors => colors::cmd_colors(json, config_path),
        Command::Languages => languages::cmd_languages(json, config_path),
        Command::Config { init } => config_cmd::cmd_config(json, init, config_path),
    }
}
