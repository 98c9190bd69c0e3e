//! TraintasticDIY protocol
//!
//! Binary framed messages over TCP or the loopback simulation; see
//! [`messages`] for the wire format and [`kernel`] for the session behaviour.

pub mod config;
pub mod io_handler;
pub mod kernel;
pub mod messages;

/// Default TCP port of a TraintasticDIY device.
pub const DEFAULT_DEVICE_PORT: u16 = 5741;
