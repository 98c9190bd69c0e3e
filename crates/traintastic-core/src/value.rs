//! Property values
//!
//! A [`Value`] is the typed payload of a property slot, together with its
//! wire encoding. The encoding per [`PropertyType`]:
//!
//! - `Boolean`: one byte
//! - `Integer`: `i64` little-endian
//! - `Float`: `f64` IEEE-754 little-endian
//! - `String`: length-prefixed UTF-8
//! - `Object`: the referenced object id as a length-prefixed string; this is
//!   a placeholder until the representation is specified — readers must
//!   ignore it and render sub-objects from the id alone
//! - `Enum`: enum type name, then `i64` value
//! - `Set`: set type name, then `u64` bits

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::enums::PropertyType;
use crate::errors::Result;
use crate::message::{Message, Reader};

// ----------------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------------

/// Typed value of a property or attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Object(String),
    Enum { type_name: String, value: i64 },
    Set { type_name: String, value: u64 },
}

impl Value {
    /// The property type tag matching this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Integer(_) => PropertyType::Integer,
            Self::Float(_) => PropertyType::Float,
            Self::String(_) => PropertyType::String,
            Self::Object(_) => PropertyType::Object,
            Self::Enum { .. } => PropertyType::Enum,
            Self::Set { .. } => PropertyType::Set,
        }
    }

    /// Build an enum value with a static type name.
    pub fn enumeration(type_name: &str, value: i64) -> Self {
        Self::Enum {
            type_name: type_name.to_owned(),
            value,
        }
    }

    /// Append this value to a message, without a leading type tag.
    pub fn write_to(&self, message: &mut Message) {
        match self {
            Self::Boolean(v) => message.write_bool(*v),
            Self::Integer(v) => message.write_i64(*v),
            Self::Float(v) => message.write_f64(*v),
            Self::String(v) => message.write_string(v),
            Self::Object(id) => message.write_string(id),
            Self::Enum { type_name, value } => {
                message.write_string(type_name);
                message.write_i64(*value);
            }
            Self::Set { type_name, value } => {
                message.write_string(type_name);
                message.write_u64(*value);
            }
        }
    }

    /// Read a value of the given type from the cursor.
    pub fn read_from(reader: &mut Reader<'_>, property_type: PropertyType) -> Result<Self> {
        Ok(match property_type {
            PropertyType::Boolean => Self::Boolean(reader.read_bool()?),
            PropertyType::Integer => Self::Integer(reader.read_i64()?),
            PropertyType::Float => Self::Float(reader.read_f64()?),
            PropertyType::String => Self::String(reader.read_string()?),
            PropertyType::Object => Self::Object(reader.read_string()?),
            PropertyType::Enum => Self::Enum {
                type_name: reader.read_string()?,
                value: reader.read_i64()?,
            },
            PropertyType::Set => Self::Set {
                type_name: reader.read_string()?,
                value: reader.read_u64()?,
            },
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum_value(&self) -> Option<i64> {
        match self {
            Self::Enum { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => v.fmt(f),
            Self::Integer(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::String(v) => v.fmt(f),
            Self::Object(id) => id.fmt(f),
            Self::Enum { type_name, value } => write!(f, "{type_name}:{value}"),
            Self::Set { type_name, value } => write!(f, "{type_name}:{value:#x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Command;
    use crate::types::RequestId;

    #[test]
    fn test_value_round_trip() {
        let values = [
            Value::Boolean(true),
            Value::Integer(-42),
            Value::Float(3.25),
            Value::String("hello".into()),
            Value::Object("world.clock".into()),
            Value::enumeration("direction", 1),
            Value::Set {
                type_name: "world_state".into(),
                value: 0b101,
            },
        ];

        let mut m = Message::new_response(Command::GetObject, RequestId::new(1));
        for value in &values {
            m.write_u8(value.property_type().as_u8());
            value.write_to(&mut m);
        }

        let decoded = Message::from_bytes(&m.to_bytes()).unwrap();
        let mut r = decoded.reader();
        for value in &values {
            let ptype = PropertyType::from_u8(r.read_u8().unwrap()).unwrap();
            assert_eq!(&Value::read_from(&mut r, ptype).unwrap(), value);
        }
        assert!(r.at_end());
    }
}
