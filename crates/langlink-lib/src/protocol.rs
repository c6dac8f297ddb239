//! Accessory wire protocol: newline-terminated UTF-8 text lines.
//!
//! Host → accessory:
//! - `<color>:<code>`: the active language changed (`<code>` alone if it has no color)
//! - `KEEP_ALIVE`: liveness heartbeat, sent on a fixed interval
//!
//! Accessory → host:
//! - `LANGUAGE_TOGGLE`: cycle the host to its next input language

use crate::color::Color;
use crate::link::{Connection, Result};

/// Heartbeat token.
pub const KEEP_ALIVE: &str = "KEEP_ALIVE";

/// Inbound request to cycle the host language.
pub const LANGUAGE_TOGGLE: &str = "LANGUAGE_TOGGLE";

/// Longest inbound line kept while waiting for its newline.
const MAX_LINE_LEN: usize = 256;

/// A message for the accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    LanguageChange { color: Option<Color>, code: String },
    KeepAlive,
}

impl Outbound {
    /// Wire form, including the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            Outbound::LanguageChange {
                color: Some(color),
                code,
            } => format!("{color}:{code}\n"),
            Outbound::LanguageChange { color: None, code } => format!("{code}\n"),
            Outbound::KeepAlive => format!("{KEEP_ALIVE}\n"),
        }
    }
}

/// A message from the accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    LanguageToggle,
}

/// Interpret one received line. Surrounding whitespace (including `\r`) is ignored.
pub fn parse_inbound(line: &str) -> Option<Inbound> {
    match line.trim() {
        LANGUAGE_TOGGLE => Some(Inbound::LanguageToggle),
        _ => None,
    }
}

/// Accumulates received bytes and splits them into lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_LINE_LEN && !self.buf.contains(&b'\n') {
            log::debug!("discarding {} bytes of unterminated input", self.buf.len());
            self.buf.clear();
        }
    }

    /// Pop the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Write one message. A failure means the connection is gone.
pub fn send(conn: &mut Connection, msg: &Outbound) -> Result<()> {
    conn.write_all(msg.encode().as_bytes())
}

/// Best-effort receive: one bounded read, then the first recognized line.
///
/// A read timeout is not an error, just `Ok(None)`. Unrecognized lines are
/// dropped.
pub fn try_receive(conn: &mut Connection) -> Result<Option<Inbound>> {
    if let Some(msg) = next_inbound(conn) {
        return Ok(Some(msg));
    }
    conn.fill()?;
    Ok(next_inbound(conn))
}

fn next_inbound(conn: &mut Connection) -> Option<Inbound> {
    while let Some(line) = conn.lines_mut().next_line() {
        match parse_inbound(&line) {
            Some(msg) => return Some(msg),
            None if line.trim().is_empty() => {}
            None => log::debug!("ignoring unknown accessory line: {:?}", line.trim()),
        }
    }
    None
}
