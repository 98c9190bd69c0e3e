//! Input objects
//!
//! A feedback input: its `value` is owned by the kernel and only ever set
//! through the controller; clients can move it between addresses and, on
//! simulation interfaces, inject a synthetic edge.

use std::any::Any;

use traintastic_core::{AttributeName, PropertyFlags, TriState, Value};

use crate::core::object::{
    MethodError, MethodOutcome, Object, ObjectCore, WorldAction,
};

pub const CLASS_ID: &str = "input";

pub struct Input {
    core: ObjectCore,
}

impl Input {
    /// Build an input bound to an interface channel.
    pub fn new(
        id: &str,
        name: &str,
        channel: u32,
        address: i64,
        (address_min, address_max): (u32, u32),
        interface_id: &str,
    ) -> Self {
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
            Value::enumeration(TriState::TYPE_NAME, TriState::Undefined.as_u8() as i64),
            PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
        );
        core.add_property(
            "interface",
            Value::Object(interface_id.to_owned()),
            PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
        );
        core.add_method("simulate_change");
        Self { core }
    }

    pub fn channel(&self) -> u32 {
        self.core
            .property("channel")
            .and_then(|p| p.value().as_integer())
            .unwrap_or_default() as u32
    }

    pub fn address(&self) -> u32 {
        self.core
            .property("address")
            .and_then(|p| p.value().as_integer())
            .unwrap_or_default() as u32
    }

    fn interface_id(&self) -> String {
        match self.core.property("interface").map(|p| p.value().clone()) {
            Some(Value::Object(id)) => id,
            _ => String::new(),
        }
    }
}

impl Object for Input {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ObjectCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn call_method(&mut self, name: &str) -> Result<MethodOutcome, MethodError> {
        if name == "simulate_change" {
            Ok(MethodOutcome::action(WorldAction::SimulateInputChange {
                interface_id: self.interface_id(),
                channel: self.channel(),
                address: self.address(),
            }))
        } else {
            Err(MethodError::UnknownMethod)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_shape() {
        let input = Input::new("input_1", "Sensor 1", 0, 100, (1, 65535), "diy_1");
        assert_eq!(input.address(), 100);
        assert_eq!(input.channel(), 0);
        assert!(!input.core().property("value").unwrap().flags().is_writable());
    }

    #[test]
    fn test_simulate_change_method() {
        let mut input = Input::new("input_1", "Sensor 1", 0, 100, (1, 65535), "diy_1");
        let outcome = input.call_method("simulate_change").unwrap();
        assert!(matches!(
            outcome.action,
            Some(WorldAction::SimulateInputChange {
                channel: 0,
                address: 100,
                ..
            })
        ));
        assert!(matches!(
            input.call_method("nope"),
            Err(MethodError::UnknownMethod)
        ));
    }
}
