//! Object mirrors
//!
//! A mirror is the client-side shadow of a leased server object: its handle,
//! class id and interface items, kept current by property/attribute change
//! events. Change handlers are identified by opaque tokens returned at
//! connect time and consumed at disconnect; handlers must not register or
//! unregister other handlers from inside a callback.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use traintastic_core::{
    AttributeName, Command, Handle, InterfaceItemType, Message, PropertyFlags, PropertyType, Value,
};

/// Token identifying one connected change handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalToken(pub(crate) u64);

// ----------------------------------------------------------------------------
// Mirror Data
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MirrorProperty {
    pub property_type: PropertyType,
    pub flags: PropertyFlags,
    pub value: Value,
    pub attributes: Vec<(AttributeName, Value)>,
}

#[derive(Debug, Clone)]
pub struct MirrorItem {
    pub name: String,
    pub item_type: InterfaceItemType,
    pub property: Option<MirrorProperty>,
}

type ValueHandler = Box<dyn Fn(&Value) + Send>;
type AttributeHandler = Box<dyn Fn(AttributeName, &Value) + Send>;

struct MirrorState {
    items: Vec<MirrorItem>,
}

#[derive(Default)]
struct Handlers {
    next_token: u64,
    value_handlers: Vec<(SignalToken, String, ValueHandler)>,
    attribute_handlers: Vec<(SignalToken, String, AttributeHandler)>,
}

struct ObjectMirrorInner {
    handle: Mutex<Handle>,
    class_id: String,
    state: Mutex<MirrorState>,
    handlers: Mutex<Handlers>,
    tx: UnboundedSender<Vec<u8>>,
}

/// Client-side shadow of one leased object.
#[derive(Clone)]
pub struct ObjectMirror {
    inner: Arc<ObjectMirrorInner>,
}

impl std::fmt::Debug for ObjectMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectMirror")
            .field("class_id", &self.inner.class_id)
            .finish()
    }
}

impl ObjectMirror {
    pub(crate) fn new(
        handle: Handle,
        class_id: String,
        items: Vec<MirrorItem>,
        tx: UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectMirrorInner {
                handle: Mutex::new(handle),
                class_id,
                state: Mutex::new(MirrorState { items }),
                handlers: Mutex::new(Handlers::default()),
                tx,
            }),
        }
    }

    pub fn handle(&self) -> Handle {
        *self.inner.handle.lock().unwrap()
    }

    pub(crate) fn invalidate(&self) {
        *self.inner.handle.lock().unwrap() = Handle::INVALID;
    }

    pub fn class_id(&self) -> &str {
        &self.inner.class_id
    }

    pub fn item_names(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .map(|item| item.name.clone())
            .collect()
    }

    pub fn item(&self, name: &str) -> Option<MirrorItem> {
        self.inner
            .state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|item| item.name == name)
            .cloned()
    }

    /// Current value of a property item.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.item(name)?.property.map(|p| p.value)
    }

    /// Current value of one attribute of a property item.
    pub fn attribute(&self, name: &str, attribute: AttributeName) -> Option<Value> {
        self.item(name)?
            .property?
            .attributes
            .into_iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, value)| value)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Fire an `ObjectSetProperty` event; the new value is confirmed by the
    /// server's `ObjectPropertyChanged` broadcast, never locally assumed.
    pub fn set_value(&self, name: &str, value: Value) {
        let handle = self.handle();
        if !handle.is_valid() {
            return;
        }
        let mut event = Message::new_event(Command::ObjectSetProperty);
        event.write_u32(handle.value());
        event.write_string(name);
        event.write_u8(value.property_type().as_u8());
        value.write_to(&mut event);
        let _ = self.inner.tx.send(event.to_bytes());
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set_value(name, Value::Boolean(value));
    }

    pub fn set_integer(&self, name: &str, value: i64) {
        self.set_value(name, Value::Integer(value));
    }

    pub fn set_float(&self, name: &str, value: f64) {
        self.set_value(name, Value::Float(value));
    }

    pub fn set_string(&self, name: &str, value: &str) {
        self.set_value(name, Value::from(value));
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    /// Connect a handler to value changes of one property.
    pub fn on_value_changed(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Value) + Send + 'static,
    ) -> SignalToken {
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.next_token += 1;
        let token = SignalToken(handlers.next_token);
        handlers
            .value_handlers
            .push((token, name.into(), Box::new(handler)));
        token
    }

    /// Connect a handler to attribute changes of one property.
    pub fn on_attribute_changed(
        &self,
        name: impl Into<String>,
        handler: impl Fn(AttributeName, &Value) + Send + 'static,
    ) -> SignalToken {
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.next_token += 1;
        let token = SignalToken(handlers.next_token);
        handlers
            .attribute_handlers
            .push((token, name.into(), Box::new(handler)));
        token
    }

    /// Disconnect a handler; the token is consumed.
    pub fn disconnect(&self, token: SignalToken) {
        let mut handlers = self.inner.handlers.lock().unwrap();
        handlers.value_handlers.retain(|(t, _, _)| *t != token);
        handlers.attribute_handlers.retain(|(t, _, _)| *t != token);
    }

    // ------------------------------------------------------------------
    // Event application (called by the connection task)
    // ------------------------------------------------------------------

    pub(crate) fn apply_value_changed(&self, name: &str, value: Value) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(property) = state
                .items
                .iter_mut()
                .find(|item| item.name == name)
                .and_then(|item| item.property.as_mut())
            {
                property.value = value.clone();
            } else {
                return;
            }
        }
        let handlers = self.inner.handlers.lock().unwrap();
        for (_, property, handler) in &handlers.value_handlers {
            if property == name {
                handler(&value);
            }
        }
    }

    pub(crate) fn apply_attribute_changed(
        &self,
        name: &str,
        attribute: AttributeName,
        value: Value,
    ) {
        {
            let mut state = self.inner.state.lock().unwrap();
            let Some(property) = state
                .items
                .iter_mut()
                .find(|item| item.name == name)
                .and_then(|item| item.property.as_mut())
            else {
                return;
            };
            match property
                .attributes
                .iter_mut()
                .find(|(a, _)| *a == attribute)
            {
                Some(slot) => slot.1 = value.clone(),
                None => property.attributes.push((attribute, value.clone())),
            }
        }
        let handlers = self.inner.handlers.lock().unwrap();
        for (_, property, handler) in &handlers.attribute_handlers {
            if property == name {
                handler(attribute, &value);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Parsing
// ----------------------------------------------------------------------------

/// Parse the object block of a `GetObject` response.
pub(crate) fn read_object(
    message: &Message,
    tx: UnboundedSender<Vec<u8>>,
) -> traintastic_core::Result<(Handle, ObjectMirror)> {
    let mut reader = message.reader();
    reader.read_block()?; // object
    let handle = Handle::new(reader.read_u32()?);
    let class_id = reader.read_string()?;

    let mut items = Vec::new();
    reader.read_block()?; // items
    while !reader.end_of_block() {
        reader.read_block()?; // item
        let name = reader.read_string()?;
        let item_type = InterfaceItemType::from_u8(reader.read_u8()?)?;
        let property = if item_type == InterfaceItemType::Property {
            let property_type = PropertyType::from_u8(reader.read_u8()?)?;
            let flags = PropertyFlags::new(reader.read_u16()?);
            let value = Value::read_from(&mut reader, property_type)?;

            reader.read_block()?; // attributes
            let count = reader.read_u32()?;
            let mut attributes = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let attribute = AttributeName::from_u8(reader.read_u8()?)?;
                let value_type = PropertyType::from_u8(reader.read_u8()?)?;
                attributes.push((attribute, Value::read_from(&mut reader, value_type)?));
            }
            reader.read_block_end()?;

            Some(MirrorProperty {
                property_type,
                flags,
                value,
                attributes,
            })
        } else {
            None
        };
        items.push(MirrorItem {
            name,
            item_type,
            property,
        });
        reader.read_block_end()?; // item
    }
    reader.read_block_end()?; // items
    reader.read_block_end()?; // object

    Ok((handle, ObjectMirror::new(handle, class_id, items, tx)))
}
