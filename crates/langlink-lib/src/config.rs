//! Application configuration: TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::color::{self, Color};
use crate::link::LinkSettings;
use crate::store;

/// Header comment prepended to generated config files.
const CONFIG_HEADER: &str =
    "# langlink configuration. Every field is optional; missing ones use defaults.\n\n";

const CONFIG_FILE: &str = "config.toml";
const COLORS_FILE: &str = "colors.json";
const SNAPSHOT_FILE: &str = "languages.txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Case-insensitive substring of the accessory's port description or name.
    #[serde(default = "default_port_pattern")]
    pub port_pattern: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on each serial read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Pause after opening the port while the accessory resets.
    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,

    /// Pause between discovery attempts while disconnected.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    /// How often the installed-language set is reconciled.
    #[serde(default = "default_reconcile_ms")]
    pub reconcile_ms: u64,

    /// Sleep between poll loop iterations.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Color pool, in allocation order.
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,
}

fn default_port_pattern() -> String {
    "USB-SERIAL CH340".into()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_read_timeout_ms() -> u64 {
    10
}
fn default_stabilize_ms() -> u64 {
    2000
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_keep_alive_ms() -> u64 {
    1000
}
fn default_reconcile_ms() -> u64 {
    5000
}
fn default_poll_interval_ms() -> u64 {
    10
}

fn default_palette() -> Vec<String> {
    color::DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port_pattern: default_port_pattern(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            stabilize_ms: default_stabilize_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            keep_alive_ms: default_keep_alive_ms(),
            reconcile_ms: default_reconcile_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            palette: default_palette(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `port_pattern` is empty or whitespace-only, so nothing would ever match.
    EmptyPattern,
    ZeroBaudRate,
    /// A timing field that must be positive is zero.
    ZeroInterval(&'static str),
    /// A palette entry is not a usable color label.
    InvalidColor { label: String, reason: String },
    DuplicateColor(String),
    EmptyPalette,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyPattern => write!(f, "Port pattern cannot be empty"),
            ValidationError::ZeroBaudRate => write!(f, "Baud rate must be greater than zero"),
            ValidationError::ZeroInterval(field) => {
                write!(f, "{field} must be greater than zero")
            }
            ValidationError::InvalidColor { label, reason } => {
                write!(f, "Invalid palette color \"{label}\": {reason}")
            }
            ValidationError::DuplicateColor(c) => {
                write!(f, "Palette color \"{c}\" appears more than once")
            }
            ValidationError::EmptyPalette => write!(f, "Palette cannot be empty"),
        }
    }
}

/// Where the persisted files live. All three share one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatePaths {
    pub config: PathBuf,
    pub colors: PathBuf,
    pub snapshot: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            colors: dir.join(COLORS_FILE),
            snapshot: dir.join(SNAPSHOT_FILE),
        }
    }

    /// Paths for an explicit config file; the state files sit beside it.
    pub fn for_config(config: &Path) -> Self {
        let dir = config.parent().unwrap_or_else(|| Path::new("."));
        Self {
            config: config.to_path_buf(),
            ..Self::in_dir(dir)
        }
    }

    /// Paths under the platform config directory.
    pub fn default_location() -> Option<Self> {
        Config::dir().map(|d| Self::in_dir(&d))
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("Langlink"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("langlink"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join(CONFIG_FILE))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically, behind a header comment.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        store::write_atomic(path, &format!("{CONFIG_HEADER}{serialized}"))
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.port_pattern.trim().is_empty() {
            errors.push(ValidationError::EmptyPattern);
        }
        if self.baud_rate == 0 {
            errors.push(ValidationError::ZeroBaudRate);
        }

        let intervals = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("retry_delay_ms", self.retry_delay_ms),
            ("keep_alive_ms", self.keep_alive_ms),
            ("reconcile_ms", self.reconcile_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                errors.push(ValidationError::ZeroInterval(field));
            }
        }

        let mut seen: Vec<Color> = Vec::new();
        for label in &self.palette {
            match Color::parse(label) {
                Ok(c) if seen.contains(&c) => {
                    errors.push(ValidationError::DuplicateColor(c.to_string()));
                }
                Ok(c) => seen.push(c),
                Err(e) => errors.push(ValidationError::InvalidColor {
                    label: label.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        if self.palette.is_empty() {
            errors.push(ValidationError::EmptyPalette);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The validated color pool.
    pub fn palette(&self) -> crate::error::Result<Vec<Color>> {
        color::parse_palette(&self.palette)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            pattern: self.port_pattern.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            stabilize_delay: Duration::from_millis(self.stabilize_ms),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
