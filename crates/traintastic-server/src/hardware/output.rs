//! Output objects
//!
//! An accessory output: clients write the requested `value`, the server
//! forwards it through the controller, and the kernel confirms the actual
//! `state` with the next inbound state report.

use traintastic_core::{AttributeName, PropertyFlags, TriState, Value};

use crate::core::object::ObjectCore;
use crate::hardware::object_list::DataObject;

pub const CLASS_ID: &str = "output";

/// Build an output bound to an interface channel.
pub fn create(
    id: &str,
    name: &str,
    channel: u32,
    address: i64,
    (address_min, address_max): (u32, u32),
    interface_id: &str,
) -> DataObject {
    let mut core = ObjectCore::new(CLASS_ID, id);
    core.add_property(
        "name",
        Value::from(name),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
    );
    core.add_property(
        "channel",
        Value::Integer(channel as i64),
        PropertyFlags::READ_ONLY | PropertyFlags::STORE,
    );
    core.add_property_with_attributes(
        "address",
        Value::Integer(address),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        vec![
            (AttributeName::Min, Value::Integer(address_min as i64)),
            (AttributeName::Max, Value::Integer(address_max as i64)),
        ],
    );
    core.add_property(
        "value",
        Value::Boolean(false),
        PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
    );
    core.add_property(
        "state",
        Value::enumeration(TriState::TYPE_NAME, TriState::Undefined.as_u8() as i64),
        PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
    );
    core.add_property(
        "interface",
        Value::Object(interface_id.to_owned()),
        PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
    );
    DataObject::new(core)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::Object;

    #[test]
    fn test_output_shape() {
        let output = create("output_1", "Turnout 1", 0, 50, (1, 65535), "diy_1");
        let core = output.core();
        assert!(core.property("value").unwrap().flags().is_writable());
        assert!(!core.property("state").unwrap().flags().is_writable());
        assert_eq!(core.property("address").unwrap().value().as_integer(), Some(50));
    }
}
