//! Color allocation: a persistent language → color mapping over a bounded pool.
//!
//! The mapping lives in a flat JSON object (`{"1033": "red", "1037": "green"}`)
//! behind [`ColorStore`]. A `null` value is tolerated and means "unallocated":
//! the next [`ColorAllocator::allocate`] scans the pool again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LanglinkError, Result};
use crate::language::LanguageId;
use crate::store;

/// Default color pool, in allocation order.
pub const DEFAULT_PALETTE: &[&str] = &[
    "red", "green", "blue", "yellow", "purple", "cyan", "orange", "white",
];

/// A color label sent to the accessory.
///
/// Labels travel inside `<color>:<code>` lines, so they must be non-empty and
/// free of `:`, whitespace and control characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    /// Validate a color label.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LanglinkError::Config("color label cannot be empty".into()));
        }
        if let Some(bad) = s.chars().find(|c| *c == ':' || c.is_whitespace() || c.is_control()) {
            return Err(LanglinkError::Config(format!(
                "invalid character {bad:?} in color label \"{s}\""
            )));
        }
        Ok(Color(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Color {
    type Error = LanglinkError;

    fn try_from(s: String) -> Result<Self> {
        Color::parse(&s)
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.0
    }
}

/// Parse a list of labels into a pool, rejecting invalid and duplicate entries.
pub fn parse_palette<S: AsRef<str>>(labels: &[S]) -> Result<Vec<Color>> {
    let mut pool: Vec<Color> = Vec::with_capacity(labels.len());
    for label in labels {
        let color = Color::parse(label.as_ref())?;
        if pool.contains(&color) {
            return Err(LanglinkError::Config(format!(
                "duplicate color \"{color}\" in palette"
            )));
        }
        pool.push(color);
    }
    if pool.is_empty() {
        return Err(LanglinkError::Config("palette cannot be empty".into()));
    }
    Ok(pool)
}

/// In-memory form of the color store.
pub type ColorTable = BTreeMap<LanguageId, Option<Color>>;

// ── Store ──

/// Repository for the persisted color table.
#[derive(Debug, Clone)]
pub struct ColorStore {
    path: PathBuf,
}

impl ColorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table as-is. `Ok(None)` if the file does not exist.
    ///
    /// Content that is not a valid table (bad JSON, bad labels, not UTF-8)
    /// is a [`LanglinkError::Store`]; any other read failure is
    /// [`LanglinkError::Io`].
    pub fn read(&self) -> Result<Option<ColorTable>> {
        let contents = match store::read_optional(&self.path) {
            Ok(Some(contents)) => contents,
            Ok(None) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(self.malformed(e)),
            Err(e) => return Err(e.into()),
        };
        let table = serde_json::from_str(&contents).map_err(|e| self.malformed(e))?;
        Ok(Some(table))
    }

    fn malformed(&self, e: impl fmt::Display) -> LanglinkError {
        LanglinkError::Store(format!("{}: {e}", self.path.display()))
    }

    /// Load the table, treating a missing or malformed store as empty.
    ///
    /// Nothing is written here: the reset reaches disk with the next change
    /// the caller commits. I/O faults propagate, since an empty table saved
    /// over an unreadable store would drop every assignment in it.
    pub fn load(&self) -> Result<ColorTable> {
        match self.read() {
            Ok(Some(table)) => Ok(table),
            Ok(None) => {
                log::debug!("color store {} not found, starting empty", self.path.display());
                Ok(ColorTable::new())
            }
            Err(LanglinkError::Store(e)) => {
                log::warn!("color store malformed, resetting: {e}");
                Ok(ColorTable::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Atomically replace the stored table.
    pub fn save(&self, table: &ColorTable) -> Result<()> {
        let json = serde_json::to_string_pretty(table)
            .map_err(|e| LanglinkError::Store(e.to_string()))?;
        store::write_atomic(&self.path, &json)?;
        Ok(())
    }
}

// ── Allocator ──

/// Hands out pool colors to languages and keeps the assignment stable.
///
/// The store is re-read on every operation, so edits by another process or
/// an operator are picked up.
#[derive(Debug, Clone)]
pub struct ColorAllocator {
    store: ColorStore,
    pool: Vec<Color>,
}

impl ColorAllocator {
    pub fn new(store: ColorStore, pool: Vec<Color>) -> Self {
        Self { store, pool }
    }

    pub fn store(&self) -> &ColorStore {
        &self.store
    }

    pub fn pool(&self) -> &[Color] {
        &self.pool
    }

    /// Return the color of `id`, allocating the lowest free pool color if it has none.
    ///
    /// Returns `Ok(None)` when the pool is exhausted; nothing is written then.
    pub fn allocate(&self, id: LanguageId) -> Result<Option<Color>> {
        let mut table = self.store.load()?;
        if let Some(Some(existing)) = table.get(&id) {
            return Ok(Some(existing.clone()));
        }
        let Some(color) = first_free(&self.pool, &table) else {
            log::warn!("no color available for language {id} (pool of {} exhausted)", self.pool.len());
            return Ok(None);
        };
        table.insert(id, Some(color.clone()));
        self.store.save(&table)?;
        log::info!("allocated {color} to language {id}");
        Ok(Some(color))
    }

    /// Remove the entry for `id`. Returns whether an entry existed.
    ///
    /// The store is only written when an entry was removed.
    pub fn release(&self, id: LanguageId) -> Result<bool> {
        let mut table = self.store.load()?;
        let Some(previous) = table.remove(&id) else {
            return Ok(false);
        };
        self.store.save(&table)?;
        match previous {
            Some(color) => log::info!("released {color} from language {id}"),
            None => log::info!("released unallocated language {id}"),
        }
        Ok(true)
    }
}

/// Pool colors not assigned in `table`, in pool order.
pub fn unassigned(pool: &[Color], table: &ColorTable) -> Vec<Color> {
    let used = used_colors(table);
    pool.iter().filter(|c| !used.contains(c)).cloned().collect()
}

fn used_colors(table: &ColorTable) -> BTreeSet<&Color> {
    table.values().flatten().collect()
}

fn first_free(pool: &[Color], table: &ColorTable) -> Option<Color> {
    let used = used_colors(table);
    pool.iter().find(|c| !used.contains(c)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette(labels: &[&str]) -> Vec<Color> {
        parse_palette(labels).unwrap()
    }

    fn allocator_in(dir: &Path, labels: &[&str]) -> ColorAllocator {
        ColorAllocator::new(ColorStore::new(dir.join("colors.json")), palette(labels))
    }

    fn id(n: u32) -> LanguageId {
        LanguageId(n)
    }

    fn color_of(alloc: &ColorAllocator, n: u32) -> Option<Color> {
        alloc.store().load().unwrap().get(&id(n)).cloned().flatten()
    }

    // ── Color ──

    #[test]
    fn color_parse_trims() {
        assert_eq!(Color::parse("  red ").unwrap().as_str(), "red");
    }

    #[test]
    fn color_parse_rejects_empty() {
        assert!(Color::parse("").is_err());
        assert!(Color::parse("   ").is_err());
    }

    #[test]
    fn color_parse_rejects_separator_and_whitespace() {
        assert!(Color::parse("re:d").is_err());
        assert!(Color::parse("dark red").is_err());
        assert!(Color::parse("red\n").is_ok(), "trailing newline is trimmed");
        assert!(Color::parse("r\u{7}ed").is_err());
    }

    #[test]
    fn color_accepts_hex_labels() {
        assert_eq!(Color::parse("#FF8000").unwrap().to_string(), "#FF8000");
    }

    #[test]
    fn palette_rejects_duplicates() {
        let err = parse_palette(&["red", "green", "red"]).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn palette_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(parse_palette(&empty).is_err());
    }

    #[test]
    fn default_palette_is_valid() {
        assert_eq!(parse_palette(DEFAULT_PALETTE).unwrap().len(), 8);
    }

    // ── Store ──

    #[test]
    fn store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        let mut table = ColorTable::new();
        table.insert(id(1033), Some(Color::parse("red").unwrap()));
        table.insert(id(1037), None);
        store.save(&table).unwrap();
        assert_eq!(store.read().unwrap(), Some(table));
    }

    #[test]
    fn store_file_is_flat_json_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        let mut table = ColorTable::new();
        table.insert(id(1033), Some(Color::parse("red").unwrap()));
        store.save(&table).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["1033"], "red");
    }

    #[test]
    fn store_missing_loads_empty_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn store_malformed_loads_empty_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.read(), Err(LanglinkError::Store(_))));
        assert!(store.load().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{ not json");
    }

    #[test]
    fn store_non_utf8_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        std::fs::write(store.path(), [0xFF, 0xFE, b'{']).unwrap();
        assert!(matches!(store.read(), Err(LanglinkError::Store(_))));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn store_read_fault_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        // A directory in place of the file fails to read with a plain I/O error.
        std::fs::create_dir(store.path()).unwrap();
        assert!(matches!(store.read(), Err(LanglinkError::Io(_))));
        assert!(matches!(store.load(), Err(LanglinkError::Io(_))));
    }

    #[test]
    fn store_invalid_color_label_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        std::fs::write(store.path(), r#"{"1033": "dark red"}"#).unwrap();
        assert!(store.read().is_err());
    }

    #[test]
    fn crash_before_rename_keeps_previous_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = ColorStore::new(dir.path().join("colors.json"));
        let mut old = ColorTable::new();
        old.insert(id(1), Some(Color::parse("red").unwrap()));
        store.save(&old).unwrap();

        // Simulate a writer that died after writing half the temp file.
        std::fs::write(store::temp_path(store.path()), r#"{"1": "red", "2": "gr"#).unwrap();
        assert_eq!(store.load().unwrap(), old);

        let mut new = old.clone();
        new.insert(id(2), Some(Color::parse("green").unwrap()));
        store.save(&new).unwrap();
        assert_eq!(store.load().unwrap(), new);
    }

    // ── Allocator ──

    #[test]
    fn allocate_picks_lowest_free_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green", "blue"]);
        assert_eq!(alloc.allocate(id(1)).unwrap().unwrap().as_str(), "red");
        assert_eq!(alloc.allocate(id(2)).unwrap().unwrap().as_str(), "green");
        assert_eq!(alloc.allocate(id(3)).unwrap().unwrap().as_str(), "blue");
    }

    #[test]
    fn allocate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        let first = alloc.allocate(id(7)).unwrap();
        let second = alloc.allocate(id(7)).unwrap();
        assert_eq!(first, second);
        let table = alloc.store().load().unwrap();
        assert_eq!(unassigned(alloc.pool(), &table), palette(&["green"]));
    }

    #[test]
    fn allocation_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let color = allocator_in(dir.path(), &["red", "green"])
            .allocate(id(9))
            .unwrap();
        // A fresh allocator over the same file sees the same assignment.
        let again = allocator_in(dir.path(), &["red", "green"]);
        assert_eq!(color_of(&again, 9), color);
        assert_eq!(again.allocate(id(9)).unwrap(), color);
    }

    #[test]
    fn exhausted_pool_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        assert!(alloc.allocate(id(1)).unwrap().is_some());
        assert!(alloc.allocate(id(2)).unwrap().is_some());
        assert_eq!(alloc.allocate(id(3)).unwrap(), None);
        assert_eq!(color_of(&alloc, 3), None);
    }

    #[test]
    fn release_returns_color_to_pool() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        alloc.allocate(id(1)).unwrap();
        alloc.allocate(id(2)).unwrap();
        assert!(alloc.release(id(1)).unwrap());
        assert_eq!(alloc.allocate(id(3)).unwrap().unwrap().as_str(), "red");
    }

    #[test]
    fn release_unknown_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red"]);
        assert!(!alloc.release(id(42)).unwrap());
        assert!(!alloc.store().path().exists(), "missing store stays missing");

        alloc.allocate(id(1)).unwrap();
        let before = std::fs::read_to_string(alloc.store().path()).unwrap();
        let modified = std::fs::metadata(alloc.store().path()).unwrap().modified().unwrap();

        assert!(!alloc.release(id(42)).unwrap());

        let after = std::fs::read_to_string(alloc.store().path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(
            std::fs::metadata(alloc.store().path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn release_unknown_leaves_malformed_store_alone() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red"]);
        std::fs::write(alloc.store().path(), "[1, 2").unwrap();
        assert!(!alloc.release(id(42)).unwrap());
        assert_eq!(std::fs::read_to_string(alloc.store().path()).unwrap(), "[1, 2");
    }

    #[test]
    fn allocate_over_malformed_store_rewrites_it() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        std::fs::write(alloc.store().path(), "{ not json").unwrap();
        assert_eq!(alloc.allocate(id(1)).unwrap().unwrap().as_str(), "red");
        let mut expected = ColorTable::new();
        expected.insert(id(1), Some(Color::parse("red").unwrap()));
        assert_eq!(alloc.store().read().unwrap(), Some(expected));
    }

    #[test]
    fn unreadable_store_keeps_existing_assignments() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        alloc.allocate(id(1)).unwrap();
        let path = alloc.store().path().to_path_buf();
        let aside = dir.path().join("colors.aside");

        // Make the store unreadable for a moment.
        std::fs::rename(&path, &aside).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(matches!(alloc.allocate(id(2)), Err(LanglinkError::Io(_))));
        assert!(matches!(alloc.release(id(1)), Err(LanglinkError::Io(_))));
        assert!(path.is_dir(), "nothing was written over the store");

        std::fs::remove_dir(&path).unwrap();
        std::fs::rename(&aside, &path).unwrap();
        assert_eq!(color_of(&alloc, 1).unwrap().as_str(), "red");
        assert_eq!(color_of(&alloc, 2), None);
        assert_eq!(alloc.allocate(id(2)).unwrap().unwrap().as_str(), "green");
    }

    #[test]
    fn stored_null_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green"]);
        std::fs::write(alloc.store().path(), r#"{"5": null, "6": "red"}"#).unwrap();
        assert_eq!(color_of(&alloc, 5), None);
        assert_eq!(alloc.allocate(id(5)).unwrap().unwrap().as_str(), "green");
    }

    #[test]
    fn release_of_null_entry_reports_removal() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red"]);
        std::fs::write(alloc.store().path(), r#"{"5": null}"#).unwrap();
        assert!(alloc.release(id(5)).unwrap());
        assert_eq!(alloc.store().read().unwrap(), Some(ColorTable::new()));
    }

    #[test]
    fn pool_exclusivity_over_mixed_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red", "green", "blue", "yellow"]);

        // Deterministic pseudo-random allocate/release sequence over 8 ids.
        let mut seed: u32 = 0x2545_F491;
        for _ in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let target = id((seed >> 16) % 8);
            if (seed >> 8) & 1 == 0 {
                alloc.allocate(target).unwrap();
            } else {
                alloc.release(target).unwrap();
            }

            let table = alloc.store().read().unwrap().unwrap_or_default();
            let assigned: Vec<&Color> = table.values().flatten().collect();
            let unique: BTreeSet<&Color> = assigned.iter().copied().collect();
            assert_eq!(assigned.len(), unique.len(), "color shared: {table:?}");
            assert!(assigned.len() <= alloc.pool().len());
        }
    }

    #[test]
    fn existing_assignment_outside_pool_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let alloc = allocator_in(dir.path(), &["red"]);
        std::fs::write(alloc.store().path(), r#"{"1": "magenta"}"#).unwrap();
        assert_eq!(alloc.allocate(id(1)).unwrap().unwrap().as_str(), "magenta");
    }

    #[test]
    fn unassigned_skips_used_and_nulls_count_as_free() {
        let mut table = ColorTable::new();
        table.insert(id(1), Some(Color::parse("green").unwrap()));
        table.insert(id(2), None);
        assert_eq!(
            unassigned(&palette(&["red", "green", "blue"]), &table),
            palette(&["red", "blue"])
        );
    }
}
