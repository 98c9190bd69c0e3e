//! Error taxonomy
//!
//! Every failure in the core protocol is a tagged kind, never an untyped
//! string. [`ErrorCode`] is the subset that crosses the wire in error
//! responses; [`CoreError`] is the in-process taxonomy shared by server and
//! client.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Wire Error Code
// ----------------------------------------------------------------------------

/// One-byte error code carried in the payload of an error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Other = 1,
    AuthenticationFailed = 2,
    NewSessionFailed = 3,
    UnknownClass = 4,
    UnknownObject = 5,
    InvalidHandle = 6,
    Failed = 7,
}

impl ErrorCode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Other),
            2 => Ok(Self::AuthenticationFailed),
            3 => Ok(Self::NewSessionFailed),
            4 => Ok(Self::UnknownClass),
            5 => Ok(Self::UnknownObject),
            6 => Ok(Self::InvalidHandle),
            7 => Ok(Self::Failed),
            _ => Err(CoreError::malformed("unknown error code")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ----------------------------------------------------------------------------
// Core Error
// ----------------------------------------------------------------------------

/// Error taxonomy of the core protocol.
///
/// Errors within a single message are bounded to that message; the session
/// stays up. Transport-level errors close the connection and, for kernels,
/// transition the owning interface to offline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Truncation, oversize, or payload type mismatch; closes the connection.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: &'static str },

    /// Login rejected; the server closes after the response.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Server refused to create a session.
    #[error("new session failed")]
    NewSessionFailed,

    /// Requested class id is not registered with the factory.
    #[error("unknown class: {class_id}")]
    UnknownClass { class_id: String },

    /// Requested object id does not exist in the world tree.
    #[error("unknown object: {object_id}")]
    UnknownObject { object_id: String },

    /// Operation on a released or never-leased handle.
    #[error("invalid handle {handle}")]
    InvalidHandle { handle: u32 },

    /// Controller rejected an address outside the channel's range.
    #[error("address {address} out of range [{min}, {max}]")]
    AddressOutOfRange { address: u32, min: u32, max: u32 },

    /// Underlying IO failure.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The hardware handshake reported this capability absent.
    #[error("feature unavailable: {feature}")]
    FeatureUnavailable { feature: &'static str },
}

impl CoreError {
    /// Create a malformed-frame error with a static reason.
    pub fn malformed(reason: &'static str) -> Self {
        Self::MalformedFrame { reason }
    }

    /// The wire code for this error, used when building an error response.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::AuthenticationFailed => ErrorCode::AuthenticationFailed,
            Self::NewSessionFailed => ErrorCode::NewSessionFailed,
            Self::UnknownClass { .. } => ErrorCode::UnknownClass,
            Self::UnknownObject { .. } => ErrorCode::UnknownObject,
            Self::InvalidHandle { .. } => ErrorCode::InvalidHandle,
            Self::AddressOutOfRange { .. } => ErrorCode::Failed,
            _ => ErrorCode::Other,
        }
    }
}

pub type Result<T> = core::result::Result<T, CoreError>;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_round_trip() {
        for code in [
            ErrorCode::Other,
            ErrorCode::AuthenticationFailed,
            ErrorCode::NewSessionFailed,
            ErrorCode::UnknownClass,
            ErrorCode::UnknownObject,
            ErrorCode::InvalidHandle,
            ErrorCode::Failed,
        ] {
            assert_eq!(ErrorCode::from_u8(code.as_u8()).unwrap(), code);
        }
        assert!(ErrorCode::from_u8(0).is_err());
    }

    #[test]
    fn test_error_code_mapping() {
        let err = CoreError::UnknownObject {
            object_id: "world.clock".into(),
        };
        assert_eq!(err.error_code(), ErrorCode::UnknownObject);
    }
}
