//! Unified error type for the langlink-lib crate.
//!
//! [`LanglinkError`] wraps module-specific errors (`LinkError`, `LanguageError`)
//! and domain-specific error kinds (`Store`, `Config`).
//! `From` impls allow `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::language::LanguageError;
use crate::link::LinkError;

/// Unified error type for langlink-lib operations.
#[derive(Debug)]
pub enum LanglinkError {
    /// Serial link error (open, read, write).
    Link(LinkError),
    /// Keyboard language collaborator error.
    Language(LanguageError),
    /// Standard I/O error (store and snapshot persistence).
    Io(std::io::Error),
    /// Persisted state could not be encoded.
    Store(String),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for LanglinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanglinkError::Link(e) => write!(f, "{e}"),
            LanglinkError::Language(e) => write!(f, "{e}"),
            LanglinkError::Io(e) => write!(f, "I/O error: {e}"),
            LanglinkError::Store(e) => write!(f, "Store error: {e}"),
            LanglinkError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for LanglinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LanglinkError::Link(e) => Some(e),
            LanglinkError::Language(e) => Some(e),
            LanglinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for LanglinkError {
    fn from(e: LinkError) -> Self {
        LanglinkError::Link(e)
    }
}

impl From<LanguageError> for LanglinkError {
    fn from(e: LanguageError) -> Self {
        LanglinkError::Language(e)
    }
}

impl From<std::io::Error> for LanglinkError {
    fn from(e: std::io::Error) -> Self {
        LanglinkError::Io(e)
    }
}

impl LanglinkError {
    /// Whether this error came from the serial link (and the connection must be dropped).
    pub fn is_link(&self) -> bool {
        matches!(self, LanglinkError::Link(_))
    }
}

/// Crate-level Result alias using [`LanglinkError`].
pub type Result<T> = std::result::Result<T, LanglinkError>;
