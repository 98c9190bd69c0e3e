//! Train objects

use std::any::Any;

use traintastic_core::{PropertyFlags, Value};

use crate::core::object::{
    MethodError, MethodOutcome, Object, ObjectCore, WorldAction,
};

pub const CLASS_ID: &str = "train";

pub struct Train {
    core: ObjectCore,
}

impl Train {
    pub fn new(id: &str, name: &str) -> Self {
        let mut core = ObjectCore::new(CLASS_ID, id);
        core.add_property(
            "name",
            Value::from(name),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );
        core.add_method("remove");
        Self { core }
    }
}

impl Object for Train {
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
        if name == "remove" {
            Ok(MethodOutcome::action(WorldAction::RemoveObject {
                object_id: self.core.id().to_owned(),
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
    fn test_remove_method() {
        let mut train = Train::new("train_1", "NS 1200");
        let outcome = train.call_method("remove").unwrap();
        assert!(matches!(
            outcome.action,
            Some(WorldAction::RemoveObject { ref object_id }) if object_id == "train_1"
        ));
    }
}
