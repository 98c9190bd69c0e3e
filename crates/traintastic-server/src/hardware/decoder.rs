//! Decoder objects
//!
//! A decoder is a plain data object; the server bridges its property writes
//! to the owning interface's `decoder_changed` with the matching change flag.

use traintastic_core::{AttributeName, Direction, PropertyFlags, Value};

use crate::core::object::ObjectCore;
use crate::hardware::controller::DecoderChangeFlags;
use crate::hardware::object_list::DataObject;

/// NMRA long address bound.
pub const DCC_ADDRESS_MIN: i64 = 1;
pub const DCC_ADDRESS_MAX: i64 = 10239;

pub const CLASS_ID: &str = "decoder";

/// Build a decoder bound to an interface.
pub fn create(id: &str, name: &str, address: i64, interface_id: &str) -> DataObject {
    let mut core = ObjectCore::new(CLASS_ID, id);
    core.add_property(
        "name",
        Value::from(name),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
    );
    core.add_property_with_attributes(
        "address",
        Value::Integer(address),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        vec![
            (AttributeName::Min, Value::Integer(DCC_ADDRESS_MIN)),
            (AttributeName::Max, Value::Integer(DCC_ADDRESS_MAX)),
        ],
    );
    core.add_property(
        "direction",
        Value::enumeration(Direction::TYPE_NAME, Direction::Forward.as_u8() as i64),
        PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
    );
    core.add_property_with_attributes(
        "throttle",
        Value::Float(0.0),
        PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
        vec![
            (AttributeName::Min, Value::Float(0.0)),
            (AttributeName::Max, Value::Float(1.0)),
        ],
    );
    core.add_property(
        "emergency_stop",
        Value::Boolean(false),
        PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
    );
    core.add_property(
        "interface",
        Value::Object(interface_id.to_owned()),
        PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
    );
    DataObject::new(core)
}

/// Which change flag a write to the given property raises.
pub fn change_flags_for(property: &str) -> Option<DecoderChangeFlags> {
    match property {
        "emergency_stop" => Some(DecoderChangeFlags::EMERGENCY_STOP),
        "direction" => Some(DecoderChangeFlags::DIRECTION),
        "throttle" => Some(DecoderChangeFlags::THROTTLE),
        _ => None,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::Object;

    #[test]
    fn test_decoder_shape() {
        let decoder = create("decoder_1", "BR 01", 3, "diy_1");
        let core = decoder.core();
        assert_eq!(core.class_id(), "decoder");
        assert_eq!(core.property("address").unwrap().value().as_integer(), Some(3));
        assert!(!core.property("interface").unwrap().flags().is_writable());
    }

    #[test]
    fn test_change_flag_mapping() {
        assert_eq!(
            change_flags_for("throttle"),
            Some(DecoderChangeFlags::THROTTLE)
        );
        assert_eq!(change_flags_for("name"), None);
    }
}
