//! Keyboard language detection: the host trait and its Windows backend.
//!
//! The supervisor only needs three primitives from the host: the active
//! input language, the installed languages, and a way to cycle to the next
//! one. Everything OS-specific stays behind [`LanguageSource`].

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum LanguageError {
    /// No backend for this platform.
    Unsupported,
    QueryFailed(String),
}

impl fmt::Display for LanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageError::Unsupported => write!(
                f,
                "Keyboard language detection is not supported on this platform"
            ),
            LanguageError::QueryFailed(e) => write!(f, "Language query failed: {e}"),
        }
    }
}

impl std::error::Error for LanguageError {}

pub type Result<T> = std::result::Result<T, LanguageError>;

// ── Types ──

/// Stable numeric key of an input language (the Windows LANGID).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LanguageId(pub u32);

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LanguageId {
    type Err = std::num::ParseIntError;

    /// Accepts decimal (`1033`) or hex (`0x0409`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16).map(LanguageId),
            None => s.parse().map(LanguageId),
        }
    }
}

/// The host's active input language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageState {
    pub id: LanguageId,
    /// Short code sent to the accessory, e.g. `EN`.
    pub code: String,
}

impl LanguageState {
    pub fn from_id(id: LanguageId) -> Self {
        Self {
            id,
            code: language_code(id),
        }
    }
}

/// One installed input language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledLanguage {
    pub id: LanguageId,
    /// Human-readable name, e.g. `English`.
    pub name: String,
}

impl InstalledLanguage {
    pub fn from_id(id: LanguageId) -> Self {
        Self {
            id,
            name: language_name(id),
        }
    }
}

/// Host-side keyboard language primitives.
pub trait LanguageSource {
    /// Active input language. Must be cheap: it is called every poll.
    fn current(&self) -> Result<LanguageState>;
    /// All installed input languages, in host order, without duplicates.
    fn installed(&self) -> Result<Vec<InstalledLanguage>>;
    /// Cycle to the next input language. Fire-and-forget.
    fn advance(&self);
}

// ── Language table ──

/// Primary language id → (short code, English name).
const LANGUAGES: &[(u32, &str, &str)] = &[
    (0x01, "AR", "Arabic"),
    (0x02, "BG", "Bulgarian"),
    (0x04, "ZH", "Chinese"),
    (0x05, "CS", "Czech"),
    (0x06, "DA", "Danish"),
    (0x07, "DE", "German"),
    (0x08, "EL", "Greek"),
    (0x09, "EN", "English"),
    (0x0A, "ES", "Spanish"),
    (0x0B, "FI", "Finnish"),
    (0x0C, "FR", "French"),
    (0x0D, "HE", "Hebrew"),
    (0x0E, "HU", "Hungarian"),
    (0x10, "IT", "Italian"),
    (0x11, "JA", "Japanese"),
    (0x12, "KO", "Korean"),
    (0x13, "NL", "Dutch"),
    (0x14, "NO", "Norwegian"),
    (0x15, "PL", "Polish"),
    (0x16, "PT", "Portuguese"),
    (0x18, "RO", "Romanian"),
    (0x19, "RU", "Russian"),
    (0x1A, "HR", "Croatian"),
    (0x1D, "SV", "Swedish"),
    (0x1E, "TH", "Thai"),
    (0x1F, "TR", "Turkish"),
    (0x22, "UK", "Ukrainian"),
    (0x29, "FA", "Persian"),
    (0x2A, "VI", "Vietnamese"),
    (0x39, "HI", "Hindi"),
];

fn lookup(id: LanguageId) -> Option<&'static (u32, &'static str, &'static str)> {
    let primary = id.0 & 0x3FF;
    LANGUAGES.iter().find(|(p, _, _)| *p == primary)
}

fn hex_id(id: LanguageId) -> String {
    format!("{:#06x}", id.0)
}

/// Short code for a language id, or its hex form if unknown.
pub fn language_code(id: LanguageId) -> String {
    lookup(id).map_or_else(|| hex_id(id), |(_, code, _)| code.to_string())
}

/// Display name for a language id, or its hex form if unknown.
pub fn language_name(id: LanguageId) -> String {
    lookup(id).map_or_else(|| hex_id(id), |(_, _, name)| name.to_string())
}

// ── Windows implementation ──

#[cfg(windows)]
mod win32 {
    use super::*;

    use windows::Win32::UI::Input::KeyboardAndMouse::{
        GetKeyboardLayout, GetKeyboardLayoutList, HKL, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
        VK_MENU, VK_SHIFT, keybd_event,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowThreadProcessId};

    /// Hold time between pressing and releasing the Alt+Shift chord.
    const CHORD_HOLD: std::time::Duration = std::time::Duration::from_millis(50);

    /// Reads the keyboard layout of the foreground window's thread.
    pub struct WindowsLanguages;

    impl WindowsLanguages {
        pub fn new() -> Result<Self> {
            Ok(Self)
        }
    }

    fn hkl_language(hkl: HKL) -> LanguageId {
        LanguageId((hkl.0 as usize & 0xFFFF) as u32)
    }

    impl LanguageSource for WindowsLanguages {
        fn current(&self) -> Result<LanguageState> {
            // SAFETY: plain Win32 queries with no pointers passed in.
            let hkl = unsafe {
                let hwnd = GetForegroundWindow();
                let thread_id = GetWindowThreadProcessId(hwnd, None);
                GetKeyboardLayout(thread_id)
            };
            if hkl.0.is_null() {
                return Err(LanguageError::QueryFailed(
                    "GetKeyboardLayout returned no layout".into(),
                ));
            }
            Ok(LanguageState::from_id(hkl_language(hkl)))
        }

        fn installed(&self) -> Result<Vec<InstalledLanguage>> {
            // SAFETY: first call with no buffer only returns the count.
            let count = unsafe { GetKeyboardLayoutList(None) };
            if count <= 0 {
                return Err(LanguageError::QueryFailed(
                    "GetKeyboardLayoutList returned no layouts".into(),
                ));
            }
            let mut layouts = vec![HKL::default(); count as usize];
            // SAFETY: the buffer holds exactly `count` handles.
            let filled = unsafe { GetKeyboardLayoutList(Some(&mut layouts)) };
            layouts.truncate(filled.max(0) as usize);

            let mut languages: Vec<InstalledLanguage> = Vec::with_capacity(layouts.len());
            for hkl in layouts {
                let id = hkl_language(hkl);
                if !languages.iter().any(|l| l.id == id) {
                    languages.push(InstalledLanguage::from_id(id));
                }
            }
            Ok(languages)
        }

        fn advance(&self) {
            let alt = VK_MENU.0 as u8;
            let shift = VK_SHIFT.0 as u8;
            // SAFETY: synthesized key events carry no pointers.
            unsafe {
                keybd_event(alt, 0, KEYBD_EVENT_FLAGS(0), 0);
                keybd_event(shift, 0, KEYBD_EVENT_FLAGS(0), 0);
            }
            std::thread::sleep(CHORD_HOLD);
            // SAFETY: as above; releases the keys pressed before the sleep.
            unsafe {
                keybd_event(shift, 0, KEYEVENTF_KEYUP, 0);
                keybd_event(alt, 0, KEYEVENTF_KEYUP, 0);
            }
        }
    }
}

#[cfg(windows)]
pub use win32::WindowsLanguages;

// ── Placeholder for unsupported platforms ──

/// Backend that reports [`LanguageError::Unsupported`] for every query.
/// Enables compilation and `cargo test` on hosts without a backend.
#[cfg(not(windows))]
pub struct UnsupportedLanguages;

#[cfg(not(windows))]
impl UnsupportedLanguages {
    pub fn new() -> Result<Self> {
        Err(LanguageError::Unsupported)
    }
}

#[cfg(not(windows))]
impl LanguageSource for UnsupportedLanguages {
    fn current(&self) -> Result<LanguageState> {
        Err(LanguageError::Unsupported)
    }
    fn installed(&self) -> Result<Vec<InstalledLanguage>> {
        Err(LanguageError::Unsupported)
    }
    fn advance(&self) {}
}

/// Concrete language backend for the current platform.
#[cfg(windows)]
pub type PlatformLanguages = WindowsLanguages;
#[cfg(not(windows))]
pub type PlatformLanguages = UnsupportedLanguages;

/// Open the platform language backend.
pub fn open_languages() -> Result<PlatformLanguages> {
    PlatformLanguages::new()
}

// ── Test stub ──

/// Scriptable [`LanguageSource`] for unit and integration tests.
///
/// `advance()` moves the current language to the next installed one, the
/// way the Alt+Shift chord does on a real host.
#[doc(hidden)]
pub mod stub {
    use super::*;
    use std::cell::{Cell, RefCell};

    pub struct StubLanguages {
        pub current: RefCell<LanguageId>,
        pub installed: RefCell<Vec<LanguageId>>,
        /// Number of `advance()` calls so far.
        pub advances: Cell<u32>,
        /// If true, `current()` and `installed()` return an error.
        pub fail_queries: Cell<bool>,
    }

    impl StubLanguages {
        /// Installed languages in order; the first one is active.
        pub fn new(installed: &[u32]) -> Self {
            let installed: Vec<LanguageId> = installed.iter().copied().map(LanguageId).collect();
            Self {
                current: RefCell::new(installed.first().copied().unwrap_or(LanguageId(0))),
                installed: RefCell::new(installed),
                advances: Cell::new(0),
                fail_queries: Cell::new(false),
            }
        }

        pub fn set_current(&self, id: u32) {
            *self.current.borrow_mut() = LanguageId(id);
        }

        pub fn set_installed(&self, ids: &[u32]) {
            *self.installed.borrow_mut() = ids.iter().copied().map(LanguageId).collect();
        }

        fn check(&self) -> Result<()> {
            if self.fail_queries.get() {
                return Err(LanguageError::QueryFailed("stub: failure injected".into()));
            }
            Ok(())
        }
    }

    impl LanguageSource for StubLanguages {
        fn current(&self) -> Result<LanguageState> {
            self.check()?;
            Ok(LanguageState::from_id(*self.current.borrow()))
        }

        fn installed(&self) -> Result<Vec<InstalledLanguage>> {
            self.check()?;
            Ok(self
                .installed
                .borrow()
                .iter()
                .map(|&id| InstalledLanguage::from_id(id))
                .collect())
        }

        fn advance(&self) {
            self.advances.set(self.advances.get() + 1);
            let installed = self.installed.borrow();
            if installed.is_empty() {
                return;
            }
            let current = *self.current.borrow();
            let next = installed
                .iter()
                .position(|&id| id == current)
                .map_or(0, |i| (i + 1) % installed.len());
            *self.current.borrow_mut() = installed[next];
        }
    }
}
