//! Per-client session state
//!
//! A session walks `AwaitingLogin → Authenticated → InSession` and from any
//! state to `Closing`. It owns the handle lease table (objects and table
//! models share one allocator), the per-table-model windows, and the outgoing
//! frame channel of its connection. All session processing happens on the
//! main loop; the connection tasks only move bytes.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use traintastic_core::{
    AttributeName, Command, Handle, Message, Value,
};

use crate::core::connection::Outgoing;
use crate::core::object::Object;
use crate::core::table_model::TableWindow;

pub type SessionId = u64;

// ----------------------------------------------------------------------------
// State Machine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingLogin,
    Authenticated,
    InSession,
    Closing,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct Session {
    state: SessionState,
    uuid: Option<Uuid>,
    username: Option<String>,
    tx: UnboundedSender<Outgoing>,
    next_handle: Handle,
    objects_by_handle: HashMap<Handle, String>,
    handles_by_object: HashMap<String, Handle>,
    tables: HashMap<Handle, TableWindow>,
}

impl Session {
    pub fn new(tx: UnboundedSender<Outgoing>) -> Self {
        Self {
            state: SessionState::AwaitingLogin,
            uuid: None,
            username: None,
            tx,
            next_handle: Handle::INVALID,
            objects_by_handle: HashMap::new(),
            handles_by_object: HashMap::new(),
            tables: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn authenticate(&mut self, username: String) {
        self.username = Some(username);
        self.state = SessionState::Authenticated;
    }

    pub fn begin(&mut self, uuid: Uuid) {
        self.uuid = Some(uuid);
        self.state = SessionState::InSession;
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Queue a frame for this client; per-handle order is the send order.
    pub fn send(&self, message: &Message) {
        let _ = self.tx.send(Outgoing::Frame(message.to_bytes()));
    }

    /// Ask the connection to close after flushing queued frames.
    pub fn close(&mut self) {
        self.state = SessionState::Closing;
        let _ = self.tx.send(Outgoing::Close);
    }

    // ------------------------------------------------------------------
    // Handle leasing
    // ------------------------------------------------------------------

    fn allocate_handle(&mut self) -> Handle {
        self.next_handle = self.next_handle.next();
        self.next_handle
    }

    /// Lease a handle for an object; a second lease of the same object
    /// returns the handle already held. Releasing and re-leasing yields a
    /// fresh handle.
    pub fn lease_object(&mut self, object_id: &str) -> Handle {
        if let Some(&handle) = self.handles_by_object.get(object_id) {
            return handle;
        }
        let handle = self.allocate_handle();
        self.objects_by_handle.insert(handle, object_id.to_owned());
        self.handles_by_object.insert(object_id.to_owned(), handle);
        handle
    }

    /// Revoke a handle; events referencing it afterwards are dropped.
    pub fn release_object(&mut self, handle: Handle) -> Option<String> {
        let object_id = self.objects_by_handle.remove(&handle)?;
        self.handles_by_object.remove(&object_id);
        Some(object_id)
    }

    pub fn object_id(&self, handle: Handle) -> Option<&str> {
        self.objects_by_handle.get(&handle).map(String::as_str)
    }

    pub fn object_handle(&self, object_id: &str) -> Option<Handle> {
        self.handles_by_object.get(object_id).copied()
    }

    /// Force-release an object that is being removed from the world.
    pub fn revoke_object(&mut self, object_id: &str) -> Option<Handle> {
        let handle = self.handles_by_object.remove(object_id)?;
        self.objects_by_handle.remove(&handle);
        Some(handle)
    }

    // ------------------------------------------------------------------
    // Table model windows
    // ------------------------------------------------------------------

    pub fn lease_table(&mut self, window: TableWindow) -> Handle {
        let handle = self.allocate_handle();
        self.tables.insert(handle, window);
        handle
    }

    pub fn table(&self, handle: Handle) -> Option<&TableWindow> {
        self.tables.get(&handle)
    }

    pub fn table_mut(&mut self, handle: Handle) -> Option<&mut TableWindow> {
        self.tables.get_mut(&handle)
    }

    pub fn release_table(&mut self, handle: Handle) -> Option<TableWindow> {
        self.tables.remove(&handle)
    }

    /// Every leased table window of this session.
    pub fn tables(&self) -> impl Iterator<Item = (Handle, &TableWindow)> {
        self.tables.iter().map(|(&handle, window)| (handle, window))
    }

    /// Handles of every table window projecting the given object.
    pub fn tables_for_object(&self, object_id: &str) -> Vec<Handle> {
        self.tables
            .iter()
            .filter(|(_, window)| window.object_id == object_id)
            .map(|(&handle, _)| handle)
            .collect()
    }

    pub fn revoke_tables_for_object(&mut self, object_id: &str) -> Vec<Handle> {
        let handles = self.tables_for_object(object_id);
        for handle in &handles {
            self.tables.remove(handle);
        }
        handles
    }
}

// ----------------------------------------------------------------------------
// Serialization
// ----------------------------------------------------------------------------

/// Append the full object description: class id plus every interface item
/// with its current value and attributes.
pub fn write_object(message: &mut Message, handle: Handle, object: &dyn Object) {
    let core = object.core();
    message.start_block(); // object
    message.write_u32(handle.value());
    message.write_string(core.class_id());

    message.start_block(); // items
    for item in core.items() {
        message.start_block(); // item
        message.write_string(item.name());
        message.write_u8(item.item_type().as_u8());
        if let Some(property) = item.as_property() {
            message.write_u8(property.property_type().as_u8());
            message.write_u16(property.flags().as_u16());
            property.value().write_to(message);

            message.start_block(); // attributes
            message.write_u32(property.attributes().len() as u32);
            for (attribute, value) in property.attributes() {
                message.write_u8(attribute.as_u8());
                message.write_u8(value.property_type().as_u8());
                value.write_to(message);
            }
            message.end_block();
        }
        message.end_block();
    }
    message.end_block();

    message.end_block();
}

/// Build the `ObjectPropertyChanged` event.
pub fn property_changed_event(handle: Handle, name: &str, value: &Value) -> Message {
    let mut event = Message::new_event(Command::ObjectPropertyChanged);
    event.write_u32(handle.value());
    event.write_string(name);
    event.write_u8(value.property_type().as_u8());
    value.write_to(&mut event);
    event
}

/// Build the `ObjectAttributeChanged` event.
pub fn attribute_changed_event(
    handle: Handle,
    name: &str,
    attribute: AttributeName,
    value: &Value,
) -> Message {
    let mut event = Message::new_event(Command::ObjectAttributeChanged);
    event.write_u32(handle.value());
    event.write_string(name);
    event.write_u8(attribute.as_u8());
    event.write_u8(value.property_type().as_u8());
    value.write_to(&mut event);
    event
}

/// Build the `TableModelRowCountChanged` event.
pub fn row_count_changed_event(handle: Handle, row_count: u32) -> Message {
    let mut event = Message::new_event(Command::TableModelRowCountChanged);
    event.write_u32(handle.value());
    event.write_u32(row_count);
    event
}

/// Build the `TableModelColumnHeadersChanged` event.
pub fn column_headers_changed_event(handle: Handle, headers: &[String]) -> Message {
    let mut event = Message::new_event(Command::TableModelColumnHeadersChanged);
    event.write_u32(handle.value());
    event.write_u32(headers.len() as u32);
    for header in headers {
        event.write_string(header);
    }
    event
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn session() -> Session {
        let (tx, _rx) = unbounded_channel();
        Session::new(tx)
    }

    #[test]
    fn test_state_machine() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::AwaitingLogin);
        s.authenticate("admin".into());
        assert_eq!(s.state(), SessionState::Authenticated);
        s.begin(Uuid::from_bytes([1; 16]));
        assert_eq!(s.state(), SessionState::InSession);
        assert!(s.uuid().is_some());
        s.close();
        assert_eq!(s.state(), SessionState::Closing);
    }

    #[test]
    fn test_lease_is_stable_while_held() {
        let mut s = session();
        let a = s.lease_object("world.clock");
        let b = s.lease_object("world.clock");
        assert_eq!(a, b);
    }

    #[test]
    fn test_release_then_release_yields_fresh_handle() {
        let mut s = session();
        let a = s.lease_object("world.clock");
        assert_eq!(s.release_object(a), Some("world.clock".to_owned()));
        let b = s.lease_object("world.clock");
        assert_ne!(a, b);
        assert!(a.is_valid() && b.is_valid());
    }

    #[test]
    fn test_release_unknown_handle() {
        let mut s = session();
        assert_eq!(s.release_object(Handle::new(99)), None);
    }

    #[test]
    fn test_object_and_table_handles_share_allocator() {
        let mut s = session();
        let a = s.lease_object("trains");
        let b = s.lease_table(crate::core::table_model::TableWindow::new(
            "trains".to_owned(),
            0,
        ));
        assert_ne!(a, b);
        assert_eq!(s.tables_for_object("trains"), vec![b]);
    }
}
