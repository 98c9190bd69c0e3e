//! Shared protocol enumerations
//!
//! Raw-byte enums exchanged on the wire and the property flag bitset. Each
//! enum converts from its wire byte with an explicit match so that unknown
//! values surface as [`CoreError::MalformedFrame`] instead of being silently
//! reinterpreted.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

// ----------------------------------------------------------------------------
// Interface Item Type
// ----------------------------------------------------------------------------

/// Kind of a named member of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceItemType {
    Property = 1,
    Method = 2,
    Event = 3,
}

impl InterfaceItemType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Property),
            2 => Ok(Self::Method),
            3 => Ok(Self::Event),
            _ => Err(CoreError::malformed("unknown interface item type")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ----------------------------------------------------------------------------
// Property Type
// ----------------------------------------------------------------------------

/// Value type of a property slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PropertyType {
    Boolean = 1,
    Integer = 2,
    Float = 3,
    String = 4,
    Object = 5,
    Enum = 6,
    Set = 7,
}

impl PropertyType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Boolean),
            2 => Ok(Self::Integer),
            3 => Ok(Self::Float),
            4 => Ok(Self::String),
            5 => Ok(Self::Object),
            6 => Ok(Self::Enum),
            7 => Ok(Self::Set),
            _ => Err(CoreError::malformed("unknown property type")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ----------------------------------------------------------------------------
// Property Flags
// ----------------------------------------------------------------------------

/// Access and persistence flags of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags(u16);

impl PropertyFlags {
    pub const READ_WRITE: Self = Self(0x0001);
    pub const READ_ONLY: Self = Self(0x0002);
    pub const STORE: Self = Self(0x0010);
    pub const NO_STORE: Self = Self(0x0020);
    pub const SUB_OBJECT: Self = Self(0x0100);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::READ_WRITE)
    }

    pub const fn is_stored(self) -> bool {
        self.contains(Self::STORE)
    }

    pub const fn is_sub_object(self) -> bool {
        self.contains(Self::SUB_OBJECT)
    }
}

impl core::ops::BitOr for PropertyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ----------------------------------------------------------------------------
// Attribute Name
// ----------------------------------------------------------------------------

/// Metadata slot attached to an interface item.
///
/// Attributes change at runtime independently of the item's value and are
/// pushed to clients through their own event command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttributeName {
    Enabled = 0,
    Visible = 1,
    DisplayName = 2,
    Min = 3,
    Max = 4,
    AllowedValues = 5,
}

impl AttributeName {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Enabled),
            1 => Ok(Self::Visible),
            2 => Ok(Self::DisplayName),
            3 => Ok(Self::Min),
            4 => Ok(Self::Max),
            5 => Ok(Self::AllowedValues),
            _ => Err(CoreError::malformed("unknown attribute name")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ----------------------------------------------------------------------------
// TriState
// ----------------------------------------------------------------------------

/// Hardware I/O state whose liveness is not always known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TriState {
    #[default]
    Undefined = 0,
    False = 1,
    True = 2,
}

impl TriState {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Undefined),
            1 => Ok(Self::False),
            2 => Ok(Self::True),
            _ => Err(CoreError::malformed("unknown tri-state value")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Enum type name used when a tri-state travels as an enum property.
    pub const TYPE_NAME: &'static str = "tri_state";
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

// ----------------------------------------------------------------------------
// Interface Status
// ----------------------------------------------------------------------------

/// Connection status of a hardware interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum InterfaceStatus {
    #[default]
    Offline = 0,
    Initializing = 1,
    Online = 2,
    Error = 3,
}

impl InterfaceStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Enum type name used when the status travels as an enum property.
    pub const TYPE_NAME: &'static str = "interface_status";
}

// ----------------------------------------------------------------------------
// Direction
// ----------------------------------------------------------------------------

/// Travel direction of a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    #[default]
    Forward = 0,
    Reverse = 1,
}

impl Direction {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Forward),
            1 => Ok(Self::Reverse),
            _ => Err(CoreError::malformed("unknown direction")),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }

    /// Enum type name used when a direction travels as an enum property.
    pub const TYPE_NAME: &'static str = "direction";
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_round_trip() {
        for t in [
            PropertyType::Boolean,
            PropertyType::Integer,
            PropertyType::Float,
            PropertyType::String,
            PropertyType::Object,
            PropertyType::Enum,
            PropertyType::Set,
        ] {
            assert_eq!(PropertyType::from_u8(t.as_u8()).unwrap(), t);
        }
        assert!(PropertyType::from_u8(0xFF).is_err());
    }

    #[test]
    fn test_property_flags() {
        let flags = PropertyFlags::READ_WRITE | PropertyFlags::STORE;
        assert!(flags.is_writable());
        assert!(flags.is_stored());
        assert!(!flags.is_sub_object());
    }

    #[test]
    fn test_tri_state_from_bool() {
        assert_eq!(TriState::from(true), TriState::True);
        assert_eq!(TriState::from(false), TriState::False);
    }
}
