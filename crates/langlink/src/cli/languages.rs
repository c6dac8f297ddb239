//! `languages` subcommand: show the last recorded installed set.

use std::path::Path;

use super::{LanguagesOutput, Result, print_json, state_paths};
use langlink_lib::installed::SnapshotFile;

pub(super) fn cmd_languages(json: bool, config_path: Option<&Path>) -> Result<()> {
    let paths = state_paths(config_path)?;
    let snapshot = SnapshotFile::new(&paths.snapshot);
    let languages = snapshot.load();

    if json {
        return print_json(&LanguagesOutput {
            file: paths.snapshot.display().to_string(),
            file_exists: paths.snapshot.exists(),
            count: languages.len(),
            languages,
        });
    }

    if languages.is_empty() {
        println!("No installed languages recorded yet (run `langlink run` first).");
        return Ok(());
    }

    println!(
        "{} installed language{}:",
        languages.len(),
        if languages.len() == 1 { "" } else { "s" }
    );
    println!();
    for entry in &languages {
        let color = entry.color.as_ref().map_or("(no color)", |c| c.as_str());
        println!("  {:>6}  {:<20} {color}", entry.id.to_string(), entry.name);
    }
    Ok(())
}
