//! Serial link: port discovery and the live connection.
//!
//! The accessory is found by matching a configured pattern against each
//! enumerated port's description (or name). Absence is the normal state
//! while the accessory is unplugged, so it is reported as
//! [`LinkStatus::Unavailable`], not as an error.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::Serialize;

use crate::protocol::LineBuffer;

// ── Error type ──

/// Serial link errors.
///
/// String payloads follow the convention **"context: details"**, where
/// *context* is usually the port name.
#[derive(Debug)]
pub enum LinkError {
    OpenFailed(String),
    Io(io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::OpenFailed(e) => write!(f, "Failed to open serial port: {e}"),
            LinkError::Io(e) => write!(f, "Serial I/O failed: {e}"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

// ── Settings ──

/// How to find and open the accessory.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Case-insensitive substring of the port description or name.
    pub pattern: String,
    pub baud_rate: u32,
    /// Upper bound on every read; keeps the poll loop from blocking.
    pub read_timeout: Duration,
    /// Pause after opening; the accessory resets when the port opens.
    pub stabilize_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            pattern: "USB-SERIAL CH340".into(),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(10),
            stabilize_delay: Duration::from_secs(2),
        }
    }
}

// ── Backend ──

/// An enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// OS port name, e.g. `COM3` or `/dev/ttyUSB0`.
    pub name: String,
    /// Human-readable description, e.g. `USB-SERIAL CH340`.
    pub description: String,
}

/// Byte stream of an open port.
pub trait Transport: io::Read + io::Write {}

impl<T: io::Read + io::Write + ?Sized> Transport for T {}

/// Port enumeration and open, abstracted for tests.
pub trait SerialBackend {
    /// Enumerate ports. Enumeration failures yield an empty list.
    fn list_ports(&self) -> Vec<PortInfo>;
    fn open(&self, port: &str, settings: &LinkSettings) -> Result<Box<dyn Transport>>;
}

/// The host's real serial ports, via the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

fn describe(info: &serialport::SerialPortInfo) -> String {
    use serialport::SerialPortType;

    match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB device {:04x}:{:04x}", usb.vid, usb.pid)),
        SerialPortType::PciPort => "PCI serial port".into(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".into(),
        SerialPortType::Unknown => "n/a".into(),
    }
}

impl SerialBackend for SystemSerial {
    fn list_ports(&self) -> Vec<PortInfo> {
        match serialport::available_ports() {
            Ok(ports) => ports
                .iter()
                .map(|p| PortInfo {
                    name: p.port_name.clone(),
                    description: describe(p),
                })
                .collect(),
            Err(e) => {
                log::debug!("serial port enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn open(&self, port: &str, settings: &LinkSettings) -> Result<Box<dyn Transport>> {
        let stream = serialport::new(port, settings.baud_rate)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| LinkError::OpenFailed(format!("{port}: {e}")))?;
        Ok(Box::new(stream))
    }
}

// ── Connection ──

/// An open link to the accessory. Dropped on the first I/O fault.
pub struct Connection {
    port_name: String,
    stream: Box<dyn Transport>,
    lines: LineBuffer,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("port_name", &self.port_name)
            .field("buffered", &self.lines.len())
            .finish()
    }
}

impl Connection {
    pub fn new(port_name: impl Into<String>, stream: Box<dyn Transport>) -> Self {
        Self {
            port_name: port_name.into(),
            stream,
            lines: LineBuffer::default(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).map_err(LinkError::Io)?;
        self.stream.flush().map_err(LinkError::Io)
    }

    /// One bounded read into the line buffer. Returns the number of bytes read.
    pub(crate) fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; 64];
        match self.stream.read(&mut chunk) {
            Ok(n) => {
                self.lines.push(&chunk[..n]);
                Ok(n)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(LinkError::Io(e)),
        }
    }

    pub(crate) fn lines_mut(&mut self) -> &mut LineBuffer {
        &mut self.lines
    }
}

// ── Supervisor ──

/// Outcome of a discovery attempt.
#[derive(Debug)]
pub enum LinkStatus {
    /// No port matches the pattern.
    Unavailable,
    /// A port matches but could not be opened.
    Busy(String),
    Available(Connection),
}

impl LinkStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LinkStatus::Unavailable => "Unavailable",
            LinkStatus::Busy(_) => "Busy",
            LinkStatus::Available(_) => "Available",
        }
    }
}

/// A port with its match verdict, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct PortListing {
    #[serde(flatten)]
    pub port: PortInfo,
    pub matches: bool,
}

/// Finds and opens the accessory's port.
pub struct LinkSupervisor<B> {
    backend: B,
    settings: LinkSettings,
}

impl<B: SerialBackend> LinkSupervisor<B> {
    pub fn new(backend: B, settings: LinkSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Whether `port` looks like the accessory.
    pub fn matches(&self, port: &PortInfo) -> bool {
        let pattern = self.settings.pattern.trim().to_lowercase();
        !pattern.is_empty()
            && (port.description.to_lowercase().contains(&pattern)
                || port.name.to_lowercase().contains(&pattern))
    }

    /// First enumerated port matching the pattern.
    pub fn find_port(&self) -> Option<PortInfo> {
        self.backend.list_ports().into_iter().find(|p| self.matches(p))
    }

    /// All ports, each flagged with whether it matches.
    pub fn list_ports(&self) -> Vec<PortListing> {
        self.backend
            .list_ports()
            .into_iter()
            .map(|port| PortListing {
                matches: self.matches(&port),
                port,
            })
            .collect()
    }

    /// Whether a port with this name is still enumerated.
    pub fn is_present(&self, port_name: &str) -> bool {
        self.backend.list_ports().iter().any(|p| p.name == port_name)
    }

    /// Find the accessory and open it.
    ///
    /// Safe to call repeatedly while nothing is plugged in. On success this
    /// blocks for the stabilization delay before returning.
    pub fn discover_and_open(&self) -> LinkStatus {
        let Some(port) = self.find_port() else {
            log::debug!("no port matching \"{}\"", self.settings.pattern);
            return LinkStatus::Unavailable;
        };
        match self.backend.open(&port.name, &self.settings) {
            Ok(stream) => {
                if !self.settings.stabilize_delay.is_zero() {
                    std::thread::sleep(self.settings.stabilize_delay);
                }
                log::info!("opened {} ({})", port.name, port.description);
                LinkStatus::Available(Connection::new(port.name, stream))
            }
            Err(e) => {
                log::debug!("{} could not be opened: {e}", port.name);
                LinkStatus::Busy(e.to_string())
            }
        }
    }
}

// ── Mock backend for testing ──

/// In-memory serial backend for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Shared state of the simulated cable.
    #[derive(Debug, Default)]
    pub struct Wire {
        /// Everything the host wrote, across all connections.
        pub written: Vec<u8>,
        /// Chunks the accessory will deliver, one per read.
        pub inbound: VecDeque<Vec<u8>>,
        /// If true, writes fail with `BrokenPipe`.
        pub fail_writes: bool,
        /// If true, reads fail with `BrokenPipe`.
        pub fail_reads: bool,
    }

    pub struct MockPort {
        wire: Rc<RefCell<Wire>>,
    }

    impl io::Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.wire.borrow_mut();
            if wire.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock: read fault"));
            }
            let Some(mut chunk) = wire.inbound.pop_front() else {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "mock: no data"));
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                wire.inbound.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    impl io::Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut wire = self.wire.borrow_mut();
            if wire.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock: write fault"));
            }
            wire.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockBackend {
        pub ports: RefCell<Vec<PortInfo>>,
        /// If true, `open` fails as if another process holds the port.
        pub busy: Cell<bool>,
        /// Number of successful opens.
        pub opens: Cell<u32>,
        /// Number of enumerations.
        pub scans: Cell<u32>,
        pub wire: Rc<RefCell<Wire>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_port(name: &str, description: &str) -> Self {
            let backend = Self::new();
            backend.add_port(name, description);
            backend
        }

        pub fn add_port(&self, name: &str, description: &str) {
            self.ports.borrow_mut().push(PortInfo {
                name: name.into(),
                description: description.into(),
            });
        }

        /// Simulate unplugging everything.
        pub fn unplug(&self) {
            self.ports.borrow_mut().clear();
        }

        /// Queue bytes for the host to read.
        pub fn push_inbound(&self, data: &str) {
            self.wire
                .borrow_mut()
                .inbound
                .push_back(data.as_bytes().to_vec());
        }

        /// Lines written by the host so far, without terminators.
        pub fn written_lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.wire.borrow().written)
                .lines()
                .map(str::to_string)
                .collect()
        }

        pub fn clear_written(&self) {
            self.wire.borrow_mut().written.clear();
        }
    }

    impl SerialBackend for MockBackend {
        fn list_ports(&self) -> Vec<PortInfo> {
            self.scans.set(self.scans.get() + 1);
            self.ports.borrow().clone()
        }

        fn open(&self, port: &str, _settings: &LinkSettings) -> Result<Box<dyn Transport>> {
            if self.busy.get() {
                return Err(LinkError::OpenFailed(format!("{port}: mock: access denied")));
            }
            self.opens.set(self.opens.get() + 1);
            Ok(Box::new(MockPort {
                wire: Rc::clone(&self.wire),
            }))
        }
    }
}
