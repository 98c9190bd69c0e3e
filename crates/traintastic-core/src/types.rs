//! Core identifier types
//!
//! Newtypes for the opaque identifiers exchanged over the session protocol.

use core::fmt;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

/// Opaque per-session identifier of a leased object.
///
/// Handles are allocated by the server when an object or table model is
/// leased and are only meaningful within the session that leased them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(u32);

impl Handle {
    /// Reserved value, never assigned to a leased object.
    pub const INVALID: Self = Self(0);

    /// Create a handle from its raw wire value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw wire value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Whether this handle refers to a leased object.
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Next handle in allocation order, skipping [`Handle::INVALID`] on wrap.
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Request Id
// ----------------------------------------------------------------------------

/// 16-bit request identifier pairing a response with its request.
///
/// Allocation wraps around; the issuing side must not reuse an id while a
/// request with that id is still outstanding. Events carry id zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequestId(u16);

impl RequestId {
    /// Id carried by event frames.
    pub const NONE: Self = Self(0);

    /// Create a request id from its raw wire value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Raw wire value.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Next id in wraparound order.
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_invalid() {
        assert!(!Handle::INVALID.is_valid());
        assert!(Handle::new(1).is_valid());
    }

    #[test]
    fn test_handle_next_skips_invalid() {
        assert_eq!(Handle::new(u32::MAX).next(), Handle::new(1));
        assert_eq!(Handle::new(1).next(), Handle::new(2));
    }

    #[test]
    fn test_request_id_wraps() {
        assert_eq!(RequestId::new(u16::MAX).next(), RequestId::new(0));
    }
}
