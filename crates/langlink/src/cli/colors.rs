//! `colors` subcommand: show the color store and the free pool.

use std::path::Path;

use super::{
    ColorAssignmentJson, ColorsOutput, Result, kv_indent, kv_width, load_config, print_json,
    state_paths,
};
use langlink_lib::color::{self, ColorStore};
use langlink_lib::language::{language_code, language_name};

pub(super) fn cmd_colors(json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let paths = state_paths(config_path)?;
    let palette = config.palette()?;

    // Read-only view: a missing store is shown as empty, not created.
    let store = ColorStore::new(&paths.colors);
    let table = store.read()?.unwrap_or_default();
    let free = color::unassigned(&palette, &table);
    let assignments: Vec<ColorAssignmentJson> = table
        .into_iter()
        .map(|(id, color)| ColorAssignmentJson {
            id,
            code: language_code(id),
            name: language_name(id),
            color,
        })
        .collect();

    if json {
        return print_json(&ColorsOutput {
            file: paths.colors.display().to_string(),
            file_exists: paths.colors.exists(),
            palette,
            assignments,
            free,
        });
    }

    println!("Color store: {}", super::file_label(&paths.colors));
    println!();

    if assignments.is_empty() {
        println!("No languages have a color yet.");
    } else {
        println!("Assignments:");
        let labels: Vec<String> = assignments
            .iter()
            .map(|a| format!("{} {}:", a.id, a.code))
            .collect();
        let keys: Vec<&str> = labels.iter().map(String::as_str).collect();
        let w = kv_width(&[], &keys);
        for (a, key) in assignments.iter().zip(&keys) {
            let color = a.color.as_ref().map_or("(none)", |c| c.as_str());
            kv_indent(key, format_args!("{color}  ({})", a.name), w);
        }
    }
    println!();

    let free: Vec<&str> = free.iter().map(|c| c.as_str()).collect();
    if free.is_empty() {
        println!("Free colors: (pool exhausted)");
    } else {
        println!("Free colors: {}", free.join(", "));
    }
    Ok(())
}
