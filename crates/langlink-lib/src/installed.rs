//! Installed-language reconciliation.
//!
//! A snapshot of the installed languages is kept on disk, one line per
//! language: `<identifier>:<display name>:<color>` (the color field is empty
//! when the pool was exhausted). Each pass compares the fresh set against the
//! previous snapshot and releases the colors of languages that disappeared.
//! That is the only way a color returns to the pool, so the diff reads every
//! identifier it can recover, even from lines it cannot otherwise parse.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::color::{Color, ColorAllocator};
use crate::error::Result;
use crate::language::{LanguageId, LanguageSource};
use crate::store;

/// One snapshot line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub id: LanguageId,
    pub name: String,
    pub color: Option<Color>,
}

impl SnapshotEntry {
    fn render(&self) -> String {
        // Names may contain ':' (the parser splits on the first and last one)
        // but never a line break.
        let name: String = self
            .name
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let color = self.color.as_ref().map(Color::as_str).unwrap_or("");
        format!("{}:{name}:{color}", self.id)
    }

    fn parse(line: &str) -> Option<Self> {
        let (id, rest) = line.split_once(':')?;
        let (name, color) = rest.rsplit_once(':')?;
        let id = id.parse().ok()?;
        let color = match color.trim() {
            "" => None,
            c => Some(Color::parse(c).ok()?),
        };
        Some(SnapshotEntry {
            id,
            name: name.to_string(),
            color,
        })
    }
}

/// Render a snapshot, one line per entry, each newline-terminated.
pub fn render_snapshot(entries: &[SnapshotEntry]) -> String {
    entries.iter().map(|e| e.render() + "\n").collect()
}

/// Parse a snapshot, skipping blank and malformed lines.
pub fn parse_snapshot(contents: &str) -> Vec<SnapshotEntry> {
    contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let entry = SnapshotEntry::parse(line);
            if entry.is_none() {
                log::warn!("skipping malformed snapshot line: {line:?}");
            }
            entry
        })
        .collect()
}

/// Identifiers named by a snapshot, including lines whose other fields are
/// malformed. Lines without a numeric identifier are skipped.
pub fn snapshot_ids(contents: &str) -> Vec<LanguageId> {
    let mut ids: Vec<LanguageId> = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        let field = line.split(':').next().unwrap_or_default().trim();
        match field.parse::<LanguageId>() {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(_) => log::warn!("snapshot line without identifier: {line:?}"),
        }
    }
    ids
}

/// Repository for the installed-language snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previous snapshot. Missing or unreadable files count as empty.
    pub fn load(&self) -> Vec<SnapshotEntry> {
        match store::read_optional(&self.path) {
            Ok(Some(contents)) => parse_snapshot(&contents),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("could not read snapshot {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    /// Identifiers recorded by the previous pass, for diffing.
    ///
    /// Unlike [`load`](Self::load), a read failure is returned: diffing
    /// against a wrongly empty snapshot and then overwriting it would lose
    /// track of languages whose colors still need releasing.
    pub fn load_ids(&self) -> Result<Vec<LanguageId>> {
        Ok(store::read_optional(&self.path)?
            .map(|contents| snapshot_ids(&contents))
            .unwrap_or_default())
    }

    /// Write `entries` unless the file already holds exactly that content.
    ///
    /// Returns whether the file was written.
    pub fn write_if_changed(&self, entries: &[SnapshotEntry]) -> Result<bool> {
        let rendered = render_snapshot(entries);
        let current = store::read_optional(&self.path).unwrap_or(None);
        if current.as_deref() == Some(rendered.as_str()) {
            return Ok(false);
        }
        store::write_atomic(&self.path, &rendered)?;
        Ok(true)
    }
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Number of installed languages seen.
    pub installed: usize,
    /// Languages whose color was released.
    pub released: Vec<LanguageId>,
    /// Whether the snapshot file was rewritten.
    pub written: bool,
}

/// Recompute the installed set, release vanished languages, and refresh the snapshot.
///
/// Releases happen before allocations, so a color freed in this pass is
/// immediately available to a newly installed language.
pub fn reconcile(
    source: &impl LanguageSource,
    allocator: &ColorAllocator,
    snapshot: &SnapshotFile,
) -> Result<ReconcileReport> {
    let installed = source.installed()?;
    let current: BTreeSet<LanguageId> = installed.iter().map(|l| l.id).collect();

    let mut released = Vec::new();
    for previous in snapshot.load_ids()? {
        if !current.contains(&previous) {
            allocator.release(previous)?;
            released.push(previous);
        }
    }

    let mut entries = Vec::with_capacity(installed.len());
    for language in &installed {
        entries.push(SnapshotEntry {
            id: language.id,
            name: language.name.clone(),
            color: allocator.allocate(language.id)?,
        });
    }

    let written = snapshot.write_if_changed(&entries)?;
    if written || !released.is_empty() {
        log::info!(
            "installed languages: {} (released {})",
            entries.len(),
            released.len()
        );
    }
    Ok(ReconcileReport {
        installed: entries.len(),
        released,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorStore, parse_palette};
    use crate::language::stub::StubLanguages;

    const A: u32 = 0x0409;
    const B: u32 = 0x040D;
    const C: u32 = 0x0419;

    struct Fixture {
        _dir: tempfile::TempDir,
        allocator: ColorAllocator,
        snapshot: SnapshotFile,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let allocator = ColorAllocator::new(
            ColorStore::new(dir.path().join("colors.json")),
            parse_palette(&["red", "green", "blue"]).unwrap(),
        );
        let snapshot = SnapshotFile::new(dir.path().join("languages.txt"));
        Fixture {
            _dir: dir,
            allocator,
            snapshot,
        }
    }

    fn entry(id: u32, name: &str, color: Option<&str>) -> SnapshotEntry {
        SnapshotEntry {
            id: LanguageId(id),
            name: name.into(),
            color: color.map(|c| Color::parse(c).unwrap()),
        }
    }

    fn color_of(f: &Fixture, id: u32) -> Option<String> {
        let table = f.allocator.store().load().unwrap();
        table.get(&LanguageId(id)).cloned().flatten().map(|c| c.to_string())
    }

    // ── format ──

    #[test]
    fn render_lines() {
        let text = render_snapshot(&[
            entry(1033, "English", Some("red")),
            entry(1037, "Hebrew", None),
        ]);
        assert_eq!(text, "1033:English:red\n1037:Hebrew:\n");
    }

    #[test]
    fn parse_roundtrip_with_colon_in_name() {
        let entries = vec![entry(1033, "English: US", Some("red"))];
        assert_eq!(parse_snapshot(&render_snapshot(&entries)), entries);
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let parsed = parse_snapshot("1033:English:red\ngarbage\nabc:Name:red\n\n1037:Hebrew:\n");
        assert_eq!(
            parsed,
            vec![entry(1033, "English", Some("red")), entry(1037, "Hebrew", None)]
        );
    }

    #[test]
    fn ids_survive_malformed_fields() {
        let ids = snapshot_ids("1033:English:red\n1037:Hebrew:dark red\n1049\ngarbage\n1033:Again:\n");
        assert_eq!(ids, vec![LanguageId(1033), LanguageId(1037), LanguageId(1049)]);
    }

    #[test]
    fn render_flattens_line_breaks() {
        let text = render_snapshot(&[entry(1, "two\nlines", None)]);
        assert_eq!(text, "1:two lines:\n");
    }

    // ── file ──

    #[test]
    fn write_only_when_changed() {
        let f = fixture();
        let entries = vec![entry(1033, "English", Some("red"))];
        assert!(f.snapshot.write_if_changed(&entries).unwrap());
        assert!(!f.snapshot.write_if_changed(&entries).unwrap());
        assert_eq!(f.snapshot.load(), entries);
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let f = fixture();
        assert!(f.snapshot.load().is_empty());
    }

    // ── reconcile ──

    #[test]
    fn first_pass_allocates_and_writes() {
        let f = fixture();
        let source = StubLanguages::new(&[A, B]);
        let report = reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        assert_eq!(report.installed, 2);
        assert!(report.released.is_empty());
        assert!(report.written);
        assert_eq!(
            std::fs::read_to_string(f.snapshot.path()).unwrap(),
            "1033:English:red\n1037:Hebrew:green\n"
        );
    }

    #[test]
    fn unchanged_set_does_not_rewrite() {
        let f = fixture();
        let source = StubLanguages::new(&[A, B]);
        reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        let report = reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        assert!(!report.written);
        assert!(report.released.is_empty());
    }

    #[test]
    fn removed_language_releases_color() {
        let f = fixture();
        let source = StubLanguages::new(&[A, B]);
        reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        assert_eq!(color_of(&f, A).as_deref(), Some("red"));
        assert_eq!(color_of(&f, B).as_deref(), Some("green"));

        // B uninstalled, C installed.
        source.set_installed(&[A, C]);
        let report = reconcile(&source, &f.allocator, &f.snapshot).unwrap();

        assert_eq!(report.released, vec![LanguageId(B)]);
        assert!(report.written);
        assert_eq!(color_of(&f, A).as_deref(), Some("red"), "A keeps its color");
        assert_eq!(color_of(&f, B), None, "B's color is released");
        let c = color_of(&f, C).expect("C gets a color");
        assert_ne!(c, "red");
        assert_eq!(c, "green", "the freed color is reused first");
        assert_eq!(
            f.snapshot.load(),
            vec![entry(A, "English", Some("red")), entry(C, "Russian", Some("green"))]
        );
    }

    #[test]
    fn malformed_snapshot_line_still_releases() {
        let f = fixture();
        let source = StubLanguages::new(&[A, B]);
        reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        // B's line is damaged: its color field is not a valid label.
        std::fs::write(f.snapshot.path(), "1033:English:red\n1037:Hebrew:gr een\n").unwrap();
        assert_eq!(f.snapshot.load().len(), 1);

        source.set_installed(&[A, C]);
        let report = reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        assert_eq!(report.released, vec![LanguageId(B)]);
        assert_eq!(color_of(&f, B), None);
        assert_eq!(color_of(&f, C).as_deref(), Some("green"));
    }

    #[test]
    fn unreadable_snapshot_fails_the_pass() {
        let f = fixture();
        let source = StubLanguages::new(&[A]);
        std::fs::create_dir(f.snapshot.path()).unwrap();
        assert!(reconcile(&source, &f.allocator, &f.snapshot).is_err());
        assert!(!f.allocator.store().path().exists());
    }

    #[test]
    fn release_only_comes_from_snapshot_diff() {
        let f = fixture();
        // Allocated by another path but never recorded in a snapshot.
        f.allocator.allocate(LanguageId(B)).unwrap();
        let source = StubLanguages::new(&[A]);
        let report = reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        assert!(report.released.is_empty());
        assert_eq!(color_of(&f, B).as_deref(), Some("red"));
        assert_eq!(color_of(&f, A).as_deref(), Some("green"));
    }

    #[test]
    fn exhausted_pool_writes_empty_color() {
        let f = fixture();
        let source = StubLanguages::new(&[A, B, C, 0x0407]);
        reconcile(&source, &f.allocator, &f.snapshot).unwrap();
        let snapshot = f.snapshot.load();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[3], entry(0x0407, "German", None));
    }

    #[test]
    fn query_failure_propagates_without_touching_files() {
        let f = fixture();
        let source = StubLanguages::new(&[A]);
        source.fail_queries.set(true);
        assert!(reconcile(&source, &f.allocator, &f.snapshot).is_err());
        assert!(!f.snapshot.path().exists());
    }
}
