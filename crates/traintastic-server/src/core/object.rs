//! Reflective object model
//!
//! Every domain object carries an [`ObjectCore`]: its stable id, class id and
//! an ordered list of interface items. Property access is a name lookup into
//! that list; there is no compile-time schema. Concrete objects wrap a core
//! and override the write/call hooks where a mutation has domain side
//! effects (an interface going online, a method touching the world).
//!
//! Mutations report what changed as [`ItemEvent`]s; the server fans those out
//! to the sessions that lease the object. Attribute changes and value changes
//! are reported independently.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use traintastic_core::{AttributeName, InterfaceItemType, PropertyFlags, PropertyType, Value};

use crate::core::table_model::TableObject;
use crate::hardware::controller::{DecoderController, InputController, OutputController};

/// Shared ownership of an object in the world tree; single-threaded by
/// design, only ever touched from the main loop.
pub type ObjectRef = Rc<RefCell<dyn Object>>;

/// Wrap a concrete object for insertion into the registry.
pub fn new_object_ref<T: Object + 'static>(object: T) -> ObjectRef {
    Rc::new(RefCell::new(object))
}

// ----------------------------------------------------------------------------
// Item Events
// ----------------------------------------------------------------------------

/// A change to one interface item, to be pushed to subscribed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEvent {
    /// The item's value changed.
    Value { name: &'static str },
    /// One attribute of the item changed; the value did not.
    Attribute {
        name: &'static str,
        attribute: AttributeName,
    },
}

/// An [`ItemEvent`] tagged with the object it belongs to, for changes that
/// span objects (a controller updating an input it owns).
#[derive(Debug, Clone)]
pub struct ObjectItemEvent {
    pub object_id: String,
    pub event: ItemEvent,
}

// ----------------------------------------------------------------------------
// Write / Call Outcomes
// ----------------------------------------------------------------------------

/// Why a property write was rejected. Rejections are bounded to the message
/// that caused them: the server logs and drops, the session stays up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPropertyError {
    UnknownItem,
    ReadOnly,
    Disabled,
    TypeMismatch,
    OutOfRange,
}

/// Why a method call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodError {
    UnknownMethod,
    Failed,
}

/// Work a method asks the server to do on its behalf; methods themselves
/// only see their own object.
#[derive(Debug, Clone)]
pub enum WorldAction {
    /// Append a new entry to a list object.
    AddListEntry { list_id: String },
    /// Remove an object from the world; leased handles are revoked.
    RemoveObject { object_id: String },
    /// Ask a controller to inject a simulated input edge.
    SimulateInputChange {
        interface_id: String,
        channel: u32,
        address: u32,
    },
}

/// Result of a successful method call.
#[derive(Debug, Clone, Default)]
pub struct MethodOutcome {
    pub events: Vec<ItemEvent>,
    pub action: Option<WorldAction>,
}

impl MethodOutcome {
    pub fn action(action: WorldAction) -> Self {
        Self {
            events: Vec::new(),
            action: Some(action),
        }
    }
}

// ----------------------------------------------------------------------------
// Interface Items
// ----------------------------------------------------------------------------

/// A property slot: typed value, access flags and attribute map.
#[derive(Debug, Clone)]
pub struct Property {
    property_type: PropertyType,
    flags: PropertyFlags,
    value: Value,
    attributes: Vec<(AttributeName, Value)>,
}

impl Property {
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn attributes(&self) -> &[(AttributeName, Value)] {
        &self.attributes
    }

    pub fn attribute(&self, name: AttributeName) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(attr, _)| *attr == name)
            .map(|(_, value)| value)
    }

    /// Whether writes are currently accepted for this slot.
    pub fn is_enabled(&self) -> bool {
        self.attribute(AttributeName::Enabled)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    fn accepts(&self, value: &Value) -> bool {
        if value.property_type() != self.property_type {
            return false;
        }
        match (&self.value, value) {
            (Value::Enum { type_name: a, .. }, Value::Enum { type_name: b, .. }) => a == b,
            (Value::Set { type_name: a, .. }, Value::Set { type_name: b, .. }) => a == b,
            _ => true,
        }
    }

    fn in_range(&self, value: &Value) -> bool {
        let (min, max) = (
            self.attribute(AttributeName::Min),
            self.attribute(AttributeName::Max),
        );
        match value {
            Value::Integer(v) => {
                min.and_then(Value::as_integer).map_or(true, |m| *v >= m)
                    && max.and_then(Value::as_integer).map_or(true, |m| *v <= m)
            }
            Value::Float(v) => {
                min.and_then(Value::as_float).map_or(true, |m| *v >= m)
                    && max.and_then(Value::as_float).map_or(true, |m| *v <= m)
            }
            _ => true,
        }
    }
}

/// A named member of an object.
#[derive(Debug, Clone)]
pub struct InterfaceItem {
    name: &'static str,
    kind: ItemKind,
}

#[derive(Debug, Clone)]
pub enum ItemKind {
    Property(Property),
    Method,
    Event,
}

impl InterfaceItem {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn item_type(&self) -> InterfaceItemType {
        match self.kind {
            ItemKind::Property(_) => InterfaceItemType::Property,
            ItemKind::Method => InterfaceItemType::Method,
            ItemKind::Event => InterfaceItemType::Event,
        }
    }

    pub fn as_property(&self) -> Option<&Property> {
        match &self.kind {
            ItemKind::Property(p) => Some(p),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Object Core
// ----------------------------------------------------------------------------

/// Identity and interface items of an object.
#[derive(Debug)]
pub struct ObjectCore {
    id: String,
    class_id: &'static str,
    items: Vec<InterfaceItem>,
}

impl ObjectCore {
    pub fn new(class_id: &'static str, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_id,
            items: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class_id(&self) -> &'static str {
        self.class_id
    }

    pub fn items(&self) -> &[InterfaceItem] {
        &self.items
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(InterfaceItem::as_property)
    }

    fn property_mut(&mut self, name: &str) -> Option<(&'static str, &mut Property)> {
        self.items.iter_mut().find(|item| item.name == name).and_then(
            |item| match &mut item.kind {
                ItemKind::Property(p) => Some((item.name, p)),
                _ => None,
            },
        )
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.name == name && matches!(item.kind, ItemKind::Method))
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn add_property(&mut self, name: &'static str, value: Value, flags: PropertyFlags) {
        self.add_property_with_attributes(name, value, flags, Vec::new());
    }

    pub fn add_property_with_attributes(
        &mut self,
        name: &'static str,
        value: Value,
        flags: PropertyFlags,
        attributes: Vec<(AttributeName, Value)>,
    ) {
        debug_assert!(self.items.iter().all(|item| item.name != name));
        self.items.push(InterfaceItem {
            name,
            kind: ItemKind::Property(Property {
                property_type: value.property_type(),
                flags,
                value,
                attributes,
            }),
        });
    }

    pub fn add_method(&mut self, name: &'static str) {
        self.items.push(InterfaceItem {
            name,
            kind: ItemKind::Method,
        });
    }

    pub fn add_event(&mut self, name: &'static str) {
        self.items.push(InterfaceItem {
            name,
            kind: ItemKind::Event,
        });
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Client-originated write: validates access, enabled state, type and
    /// range. Returns the events to broadcast; a write of the current value
    /// changes nothing and broadcasts nothing.
    pub fn write_property(
        &mut self,
        name: &str,
        value: Value,
    ) -> Result<Vec<ItemEvent>, SetPropertyError> {
        let (item_name, property) = self
            .property_mut(name)
            .ok_or(SetPropertyError::UnknownItem)?;
        if !property.flags.is_writable() {
            return Err(SetPropertyError::ReadOnly);
        }
        if !property.is_enabled() {
            return Err(SetPropertyError::Disabled);
        }
        if !property.accepts(&value) {
            return Err(SetPropertyError::TypeMismatch);
        }
        if !property.in_range(&value) {
            return Err(SetPropertyError::OutOfRange);
        }
        if property.value == value {
            return Ok(Vec::new());
        }
        property.value = value;
        Ok(vec![ItemEvent::Value { name: item_name }])
    }

    /// Domain-originated write: bypasses access checks, still idempotent.
    pub fn set_value_internal(&mut self, name: &str, value: Value) -> Vec<ItemEvent> {
        match self.property_mut(name) {
            Some((item_name, property)) => {
                debug_assert!(property.accepts(&value));
                if property.value == value {
                    Vec::new()
                } else {
                    property.value = value;
                    vec![ItemEvent::Value { name: item_name }]
                }
            }
            None => {
                debug_assert!(false, "unknown property {name}");
                Vec::new()
            }
        }
    }

    /// Change one attribute of a property; independent of value changes.
    pub fn set_attribute(
        &mut self,
        name: &str,
        attribute: AttributeName,
        value: Value,
    ) -> Vec<ItemEvent> {
        match self.property_mut(name) {
            Some((item_name, property)) => {
                if let Some(slot) = property
                    .attributes
                    .iter_mut()
                    .find(|(attr, _)| *attr == attribute)
                {
                    if slot.1 == value {
                        return Vec::new();
                    }
                    slot.1 = value;
                } else {
                    property.attributes.push((attribute, value));
                }
                vec![ItemEvent::Attribute {
                    name: item_name,
                    attribute,
                }]
            }
            None => {
                debug_assert!(false, "unknown property {name}");
                Vec::new()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Object Trait
// ----------------------------------------------------------------------------

/// A node in the world tree.
///
/// The default hooks implement a plain data object; concrete types override
/// them where a mutation has side effects. Capability casts return `None`
/// unless the object implements the contract, the registry-era equivalent of
/// the original's `dynamic_pointer_cast` checks.
pub trait Object: Any {
    fn core(&self) -> &ObjectCore;
    fn core_mut(&mut self) -> &mut ObjectCore;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Client-originated property write.
    fn set_property(&mut self, name: &str, value: Value) -> Result<Vec<ItemEvent>, SetPropertyError> {
        self.core_mut().write_property(name, value)
    }

    /// Client-originated zero-argument method call.
    fn call_method(&mut self, name: &str) -> Result<MethodOutcome, MethodError> {
        if self.core().has_method(name) {
            Err(MethodError::Failed)
        } else {
            Err(MethodError::UnknownMethod)
        }
    }

    /// World power/run state changed.
    fn world_event(&mut self, _power_on: bool) -> Vec<ItemEvent> {
        Vec::new()
    }

    fn as_table(&self) -> Option<&dyn TableObject> {
        None
    }

    fn as_decoder_controller(&mut self) -> Option<&mut dyn DecoderController> {
        None
    }

    fn as_input_controller(&mut self) -> Option<&mut dyn InputController> {
        None
    }

    fn as_output_controller(&mut self) -> Option<&mut dyn OutputController> {
        None
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_core() -> ObjectCore {
        let mut core = ObjectCore::new("sample", "sample_1");
        core.add_property(
            "name",
            Value::from("a"),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );
        core.add_property_with_attributes(
            "speed",
            Value::Integer(0),
            PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
            vec![
                (AttributeName::Min, Value::Integer(0)),
                (AttributeName::Max, Value::Integer(126)),
            ],
        );
        core.add_property(
            "status",
            Value::Integer(0),
            PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
        );
        core
    }

    #[test]
    fn test_write_changes_and_reports() {
        let mut core = sample_core();
        let events = core.write_property("name", Value::from("b")).unwrap();
        assert_eq!(events, vec![ItemEvent::Value { name: "name" }]);
        assert_eq!(core.property("name").unwrap().value().as_str(), Some("b"));
    }

    #[test]
    fn test_write_same_value_is_silent() {
        let mut core = sample_core();
        assert!(core.write_property("name", Value::from("a")).unwrap().is_empty());
    }

    #[test]
    fn test_write_read_only_rejected() {
        let mut core = sample_core();
        assert_eq!(
            core.write_property("status", Value::Integer(1)),
            Err(SetPropertyError::ReadOnly)
        );
    }

    #[test]
    fn test_write_disabled_rejected() {
        let mut core = sample_core();
        core.set_attribute("name", AttributeName::Enabled, Value::Boolean(false));
        assert_eq!(
            core.write_property("name", Value::from("b")),
            Err(SetPropertyError::Disabled)
        );
    }

    #[test]
    fn test_write_type_mismatch_rejected() {
        let mut core = sample_core();
        assert_eq!(
            core.write_property("name", Value::Integer(1)),
            Err(SetPropertyError::TypeMismatch)
        );
    }

    #[test]
    fn test_write_out_of_range_rejected() {
        let mut core = sample_core();
        assert_eq!(
            core.write_property("speed", Value::Integer(127)),
            Err(SetPropertyError::OutOfRange)
        );
        assert!(core.write_property("speed", Value::Integer(126)).is_ok());
    }

    #[test]
    fn test_attribute_change_is_independent_event() {
        let mut core = sample_core();
        let events = core.set_attribute("name", AttributeName::Enabled, Value::Boolean(false));
        assert_eq!(
            events,
            vec![ItemEvent::Attribute {
                name: "name",
                attribute: AttributeName::Enabled,
            }]
        );
        // Same attribute value again: no event.
        assert!(core
            .set_attribute("name", AttributeName::Enabled, Value::Boolean(false))
            .is_empty());
    }
}
