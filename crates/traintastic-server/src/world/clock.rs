//! World clock object

use traintastic_core::{AttributeName, PropertyFlags, Value};

use crate::core::object::ObjectCore;
use crate::hardware::object_list::DataObject;

pub const CLASS_ID: &str = "clock";

/// Build the fast clock; time is frozen until a timetable driver advances it.
pub fn create(id: &str) -> DataObject {
    let mut core = ObjectCore::new(CLASS_ID, id);
    core.add_property_with_attributes(
        "hour",
        Value::Integer(0),
        PropertyFlags::READ_ONLY | PropertyFlags::STORE,
        vec![
            (AttributeName::Min, Value::Integer(0)),
            (AttributeName::Max, Value::Integer(23)),
        ],
    );
    core.add_property_with_attributes(
        "minute",
        Value::Integer(0),
        PropertyFlags::READ_ONLY | PropertyFlags::STORE,
        vec![
            (AttributeName::Min, Value::Integer(0)),
            (AttributeName::Max, Value::Integer(59)),
        ],
    );
    core.add_property(
        "freeze",
        Value::Boolean(true),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
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
    fn test_clock_shape() {
        let clock = create("world.clock");
        let hour = clock.core().property("hour").unwrap();
        assert!(!hour.flags().is_writable());
        assert_eq!(hour.attribute(AttributeName::Max).unwrap().as_integer(), Some(23));
        let value = hour.value().as_integer().unwrap();
        assert!((0..=23).contains(&value));
    }
}
