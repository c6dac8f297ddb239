//! `config` subcommand: show current configuration and file paths, optionally
//! writing a default config file first.

use std::path::Path;

use super::{
    Config, ConfigFilesJson, ConfigOutput, LanglinkError, Result, StatePaths, file_label, kv,
    kv_indent, kv_width, load_config, print_json,
};

pub(super) fn cmd_config(json: bool, init: bool, custom_path: Option<&Path>) -> Result<()> {
    let paths = match custom_path {
        Some(p) => Some(StatePaths::for_config(p)),
        None => StatePaths::default_location(),
    };
    if init {
        let Some(p) = &paths else {
            return Err(LanglinkError::Config("No config directory".into()));
        };
        write_defaults(&p.config)?;
        if !json {
            println!("Wrote default settings to {}", p.config.display());
            println!();
        }
    }
    let config = load_config(custom_path);
    let config_exists = paths.as_ref().is_some_and(|p| p.config.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        let files = match &paths {
            Some(p) => ConfigFilesJson {
                colors: Some(p.colors.display().to_string()),
                colors_exists: p.colors.exists(),
                snapshot: Some(p.snapshot.display().to_string()),
                snapshot_exists: p.snapshot.exists(),
            },
            None => ConfigFilesJson {
                colors: None,
                colors_exists: false,
                snapshot: None,
                snapshot_exists: false,
            },
        };
        return print_json(&ConfigOutput {
            config_file: paths.as_ref().map(|p| p.config.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
            files,
        });
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "port_pattern:",
            "baud_rate:",
            "read_timeout_ms:",
            "stabilize_ms:",
            "retry_delay_ms:",
            "keep_alive_ms:",
            "reconcile_ms:",
            "poll_interval_ms:",
            "palette:",
            "Color store:",
            "Languages:",
        ],
    );

    match &paths {
        Some(p) if config_exists => {
            kv("Config file:", format_args!("{} (loaded)", p.config.display()), w)
        }
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.config.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    print_settings(&config, w);
    println!();

    if !problems.is_empty() {
        println!("Problems:");
        for p in &problems {
            println!("  - {p}");
        }
        println!();
    }

    println!("Files:");
    match &paths {
        Some(p) => {
            kv_indent("Color store:", file_label(&p.colors), w);
            kv_indent("Languages:", file_label(&p.snapshot), w);
        }
        None => kv_indent("Color store:", "(no config directory)", w),
    }
    Ok(())
}

/// Create `path` with the default settings. An existing file is left alone.
fn write_defaults(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(LanglinkError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    Config::default().save_to(path)?;
    log::info!("created {}", path.display());
    Ok(())
}

fn print_settings(config: &Config, w: usize) {
    println!("Settings:");
    kv_indent("port_pattern:", format_args!("\"{}\"", config.port_pattern), w);
    kv_indent("baud_rate:", config.baud_rate, w);
    kv_indent("read_timeout_ms:", config.read_timeout_ms, w);
    kv_indent("stabilize_ms:", config.stabilize_ms, w);
    kv_indent("retry_delay_ms:", config.retry_delay_ms, w);
    kv_indent("keep_alive_ms:", config.keep_alive_ms, w);
    kv_indent("reconcile_ms:", config.reconcile_ms, w);
    kv_indent("poll_interval_ms:", config.poll_interval_ms, w);
    kv_indent("palette:", config.palette.join(", "), w);
}
