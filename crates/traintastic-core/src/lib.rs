//! Traintastic core protocol
//!
//! Shared foundation for the Traintastic model-railway control system: the
//! framed TCP wire protocol spoken between server and clients, the typed
//! values and attributes of the reflective object model, and the error
//! taxonomy used on both sides of the connection.
//!
//! ## Architecture Overview
//!
//! The system is split across three crates:
//!
//! - `traintastic-core` (this crate): wire codec and shared types, no IO
//! - `traintastic-server`: the world, sessions, and hardware kernels
//! - `traintastic-client`: mirror objects for remote rendering and control
//!
//! A frame is an 8-byte header followed by a block-structured payload; see
//! [`message`] for the exact layout and [`value`] for how property values of
//! each [`enums::PropertyType`] are encoded.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod enums;
pub mod errors;
pub mod message;
pub mod types;
pub mod value;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use enums::{
    AttributeName, Direction, InterfaceItemType, InterfaceStatus, PropertyFlags, PropertyType,
    TriState,
};
pub use errors::{CoreError, ErrorCode, Result};
pub use message::{Command, FrameHeader, Message, MessageFlags, Reader, HEADER_SIZE};
pub use types::{Handle, RequestId};
pub use value::Value;

/// Default TCP port of the server; the UDP discovery responder listens on the
/// same port number.
pub const DEFAULT_PORT: u16 = 5740;

/// Time-to-live for discovery datagrams.
pub const DISCOVERY_TTL: u32 = 3;
