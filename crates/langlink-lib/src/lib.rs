//! langlink: mirrors the active keyboard language onto a serial-attached accessory.

pub mod color;
pub mod config;
pub mod error;
pub mod installed;
pub mod interval;
pub mod language;
pub mod link;
pub mod monitor;
pub mod protocol;
pub mod reconnect;
pub mod store;

pub use error::LanglinkError;
