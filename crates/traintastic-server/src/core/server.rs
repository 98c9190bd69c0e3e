//! Server root
//!
//! [`Server`] is the single-threaded owner of the object registry and every
//! session; it runs on the main loop thread and is only ever entered through
//! posted tasks. [`ServerRuntime`] wires the pieces together: it binds the
//! sockets, spawns the tokio connection tasks and the discovery responder,
//! and runs the main loop on its own thread.

use std::collections::HashMap;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

use traintastic_core::{
    Command, CoreError, ErrorCode, Handle, Message, PropertyType, TriState, Value, DISCOVERY_TTL,
};

use crate::core::connection::{run_acceptor, run_discovery, Outgoing};
use crate::core::event_loop::{EventLoop, EventLoopHandle};
use crate::core::object::{ItemEvent, MethodError, Object, ObjectItemEvent, WorldAction};
use crate::core::registry::{CreateCtx, ObjectRegistry};
use crate::core::session::{
    attribute_changed_event, property_changed_event, row_count_changed_event, write_object,
    Session, SessionId, SessionState,
};
use crate::core::settings::Settings;
use crate::core::table_model::{write_region_cells, TableObject, TableRegion, TableWindow};
use crate::hardware::controller::DEFAULT_CHANNEL;
use crate::hardware::decoder;
use crate::hardware::interface::DiyInterface;
use crate::hardware::object_list::ObjectList;
use crate::hardware::protocol::diy::messages::{
    input_tri_state, output_tri_state, FeatureFlags, InputState, OutputState,
};
use crate::world::train::Train;
use crate::world::world::{create_world, next_train_id, TRAINS_ID, WORLD_ID};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Server State
// ----------------------------------------------------------------------------

pub struct Server {
    registry: ObjectRegistry,
    sessions: HashMap<SessionId, Session>,
    events: EventLoopHandle<Server>,
    username: String,
    credential: Option<[u8; 32]>,
    settings: Settings,
    shutdown: bool,
}

impl Server {
    pub fn new(settings: Settings, events: EventLoopHandle<Server>) -> Self {
        let mut registry = ObjectRegistry::new();
        registry.register_class("train", |_, _, id| {
            crate::core::object::new_object_ref(Train::new(id, "New train"))
        });

        Self {
            registry,
            sessions: HashMap::new(),
            events,
            username: settings.username.clone(),
            credential: settings.password_digest(),
            settings,
            shutdown: false,
        }
    }

    pub fn build_world(&mut self) {
        let events = self.events.clone();
        create_world(&mut self.registry, &events, &self.settings);
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    // ------------------------------------------------------------------
    // Client lifecycle
    // ------------------------------------------------------------------

    pub fn client_connected(&mut self, id: SessionId, tx: UnboundedSender<Outgoing>) {
        self.sessions.insert(id, Session::new(tx));
    }

    pub fn client_gone(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(client = id, "session dropped");
        }
    }

    /// Protocol violation: close the connection, drop the session.
    pub fn client_protocol_error(&mut self, id: SessionId) {
        if let Some(mut session) = self.sessions.remove(&id) {
            session.close();
        }
    }

    // ------------------------------------------------------------------
    // Message dispatch
    // ------------------------------------------------------------------

    pub fn process_message(&mut self, id: SessionId, message: Message) {
        if !self.sessions.contains_key(&id) {
            return;
        }
        match self.dispatch(id, &message) {
            Ok(()) => {}
            Err(err) => self.handle_dispatch_error(id, &message, err),
        }
    }

    fn handle_dispatch_error(&mut self, id: SessionId, message: &Message, err: CoreError) {
        match &err {
            CoreError::MalformedFrame { .. } => {
                warn!(client = id, "{err}");
                self.client_protocol_error(id);
            }
            CoreError::AuthenticationFailed | CoreError::NewSessionFailed => {
                if let Some(session) = self.sessions.get(&id) {
                    session.send(&Message::new_error_response(
                        message.command(),
                        message.request_id(),
                        err.error_code(),
                    ));
                }
                self.client_protocol_error(id);
            }
            _ if message.is_request() => {
                debug!(client = id, "request failed: {err}");
                if let Some(session) = self.sessions.get(&id) {
                    session.send(&Message::new_error_response(
                        message.command(),
                        message.request_id(),
                        err.error_code(),
                    ));
                }
            }
            _ => {
                // Errors in events are bounded to the event.
                debug!(client = id, "event dropped: {err}");
            }
        }
    }

    fn dispatch(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        if message.is_request() {
            match message.command() {
                Command::Login => self.cmd_login(id, message),
                Command::NewSession => self.cmd_new_session(id, message),
                Command::GetObject => self.cmd_get_object(id, message),
                Command::GetTableModel => self.cmd_get_table_model(id, message),
                Command::ObjectCallMethod => self.cmd_call_method(id, message),
                _ => Err(CoreError::malformed("unexpected request command")),
            }
        } else if message.is_event() {
            match message.command() {
                Command::ReleaseObject => self.ev_release_object(id, message),
                Command::ObjectSetProperty => self.ev_set_property(id, message),
                Command::ReleaseTableModel => self.ev_release_table_model(id, message),
                Command::TableModelSetRegion => self.ev_table_set_region(id, message),
                _ => Err(CoreError::malformed("unexpected event command")),
            }
        } else {
            Err(CoreError::malformed("response from client"))
        }
    }

    fn session(&self, id: SessionId) -> &Session {
        self.sessions.get(&id).expect("session checked by caller")
    }

    fn session_mut(&mut self, id: SessionId) -> &mut Session {
        self.sessions.get_mut(&id).expect("session checked by caller")
    }

    fn require_state(&self, id: SessionId, state: SessionState) -> Result<(), CoreError> {
        if self.session(id).state() == state {
            Ok(())
        } else {
            Err(CoreError::malformed("command in wrong session state"))
        }
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    fn cmd_login(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        self.require_state(id, SessionState::AwaitingLogin)?;
        let mut reader = message.reader();
        let username = reader.read_string()?;
        let password = reader.read_byte_string()?.to_vec();

        let accepted = username == self.username
            && match &self.credential {
                None => password.is_empty(),
                Some(digest) => password.as_slice() == digest,
            };
        if !accepted {
            return Err(CoreError::AuthenticationFailed);
        }

        let session = self.session_mut(id);
        session.authenticate(username);
        session.send(&Message::new_response(message.command(), message.request_id()));
        Ok(())
    }

    fn cmd_new_session(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        if self.session(id).state() != SessionState::Authenticated {
            return Err(CoreError::NewSessionFailed);
        }
        let uuid = Uuid::new_v4();
        let session = self.session_mut(id);
        session.begin(uuid);
        let mut response = Message::new_response(message.command(), message.request_id());
        response.write_uuid(&uuid);
        session.send(&response);
        info!(
            client = id,
            user = session.username().unwrap_or(""),
            session = %uuid,
            "session started"
        );
        Ok(())
    }

    fn cmd_get_object(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        self.require_state(id, SessionState::InSession)?;
        let object_id = message.reader().read_string()?;
        let object = self.registry.get_or_err(&object_id)?;

        let session = self.session_mut(id);
        let handle = session.lease_object(&object_id);
        let mut response = Message::new_response(message.command(), message.request_id());
        write_object(&mut response, handle, &*object.borrow());
        session.send(&response);
        Ok(())
    }

    fn cmd_get_table_model(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        self.require_state(id, SessionState::InSession)?;
        let object_id = message.reader().read_string()?;
        let object = self.registry.get_or_err(&object_id)?;

        let borrowed = object.borrow();
        let Some(table) = borrowed.as_table() else {
            return Err(CoreError::UnknownObject { object_id });
        };
        let headers = table.column_headers();
        let row_count = table.row_count();
        let table_class_id = table.table_class_id();
        drop(borrowed);

        let session = self.session_mut(id);
        let handle = session.lease_table(TableWindow::new(object_id, row_count));
        let mut response = Message::new_response(message.command(), message.request_id());
        response.start_block();
        response.write_u32(handle.value());
        response.write_string(table_class_id);
        response.write_u32(headers.len() as u32);
        for header in &headers {
            response.write_string(header);
        }
        response.write_u32(row_count);
        response.end_block();
        session.send(&response);
        Ok(())
    }

    fn cmd_call_method(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        self.require_state(id, SessionState::InSession)?;
        let mut reader = message.reader();
        let handle = Handle::new(reader.read_u32()?);
        let name = reader.read_string()?;

        let object_id = self
            .session(id)
            .object_id(handle)
            .ok_or(CoreError::InvalidHandle {
                handle: handle.value(),
            })?
            .to_owned();
        let object = self.registry.get_or_err(&object_id)?;

        let outcome = match object.borrow_mut().call_method(&name) {
            Ok(outcome) => outcome,
            Err(err @ (MethodError::UnknownMethod | MethodError::Failed)) => {
                debug!(object = %object_id, method = %name, "method call failed: {err:?}");
                self.session(id).send(&Message::new_error_response(
                    message.command(),
                    message.request_id(),
                    ErrorCode::Failed,
                ));
                return Ok(());
            }
        };

        for event in outcome.events {
            self.broadcast_item_event(&object_id, event);
        }
        if let Some(action) = outcome.action {
            self.execute_world_action(action);
        }
        self.session(id)
            .send(&Message::new_response(message.command(), message.request_id()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    fn ev_release_object(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        let handle = Handle::new(message.reader().read_u32()?);
        if self.session_mut(id).release_object(handle).is_none() {
            return Err(CoreError::InvalidHandle {
                handle: handle.value(),
            });
        }
        Ok(())
    }

    fn ev_set_property(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        let mut reader = message.reader();
        let handle = Handle::new(reader.read_u32()?);
        let name = reader.read_string()?;
        let property_type = PropertyType::from_u8(reader.read_u8()?)?;
        let value = Value::read_from(&mut reader, property_type)?;

        let object_id = self
            .session(id)
            .object_id(handle)
            .ok_or(CoreError::InvalidHandle {
                handle: handle.value(),
            })?
            .to_owned();
        self.set_object_property(&object_id, &name, value);
        Ok(())
    }

    fn ev_release_table_model(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        let handle = Handle::new(message.reader().read_u32()?);
        if self.session_mut(id).release_table(handle).is_none() {
            return Err(CoreError::InvalidHandle {
                handle: handle.value(),
            });
        }
        Ok(())
    }

    fn ev_table_set_region(&mut self, id: SessionId, message: &Message) -> Result<(), CoreError> {
        let mut reader = message.reader();
        let handle = Handle::new(reader.read_u32()?);
        let region = TableRegion {
            column_min: reader.read_u32()?,
            column_max: reader.read_u32()?,
            row_min: reader.read_u32()?,
            row_max: reader.read_u32()?,
        };

        let session = self.session_mut(id);
        let Some(window) = session.table_mut(handle) else {
            return Err(CoreError::InvalidHandle {
                handle: handle.value(),
            });
        };
        window.region = Some(region);
        let object_id = window.object_id.clone();

        self.push_region_update(id, handle, &object_id, region);
        Ok(())
    }

    /// Send one `TableModelUpdateRegion` for the window's subscribed region.
    fn push_region_update(
        &self,
        id: SessionId,
        handle: Handle,
        object_id: &str,
        region: TableRegion,
    ) {
        let Some(object) = self.registry.get(object_id) else {
            return;
        };
        let borrowed = object.borrow();
        let Some(table) = borrowed.as_table() else {
            return;
        };
        let Some(clamped) = region.clamped(table.column_headers().len() as u32, table.row_count())
        else {
            return;
        };
        let mut event = Message::new_event(Command::TableModelUpdateRegion);
        write_region_cells(&mut event, handle, table, &self.registry, clamped);
        self.session(id).send(&event);
    }

    // ------------------------------------------------------------------
    // Property writes & fan-out
    // ------------------------------------------------------------------

    /// Apply a property write and fan out whatever actually changed.
    pub fn set_object_property(&mut self, object_id: &str, name: &str, value: Value) {
        let Some(object) = self.registry.get(object_id) else {
            debug!(object = object_id, "write to unknown object dropped");
            return;
        };
        let result = object.borrow_mut().set_property(name, value);
        match result {
            Ok(events) => {
                let changed = !events.is_empty();
                for event in events {
                    self.broadcast_item_event(object_id, event);
                }
                if changed {
                    self.run_write_hooks(object_id, name);
                }
            }
            Err(reject) => {
                debug!(object = object_id, property = name, "write rejected: {reject:?}");
            }
        }
    }

    /// Domain side effects of a completed write that span objects.
    fn run_write_hooks(&mut self, object_id: &str, name: &str) {
        let Some(object) = self.registry.get(object_id) else {
            return;
        };
        let class_id = object.borrow().core().class_id();

        match (class_id, name) {
            ("decoder", _) => {
                if let Some(changes) = decoder::change_flags_for(name) {
                    if let Some(interface_id) = self.interface_of(object_id) {
                        if let Some(interface) = self.registry.get(&interface_id) {
                            if let Some(controller) =
                                interface.borrow_mut().as_decoder_controller()
                            {
                                controller.decoder_changed(&self.registry, object_id, changes, 0);
                            }
                        }
                    }
                }
            }
            ("output", "value") => {
                let requested = object
                    .borrow()
                    .core()
                    .property("value")
                    .and_then(|p| p.value().as_bool())
                    .unwrap_or(false);
                let (channel, address) = io_channel_address(&*object.borrow());
                if let Some(interface_id) = self.interface_of(object_id) {
                    if let Some(interface) = self.registry.get(&interface_id) {
                        if let Some(controller) = interface.borrow_mut().as_output_controller() {
                            if !controller.set_output_value(channel, address, requested) {
                                debug!(object = object_id, "output request not forwarded");
                            }
                        }
                    }
                }
            }
            ("input", "address") => {
                if let Some(interface_id) = self.interface_of(object_id) {
                    if let Some(interface) = self.registry.get(&interface_id) {
                        if let Some(controller) = interface.borrow_mut().as_input_controller() {
                            if let Err(err) = controller.add_input(&self.registry, object_id) {
                                warn!(object = object_id, "address change rejected: {err}");
                            }
                        }
                    }
                }
            }
            ("output", "address") => {
                if let Some(interface_id) = self.interface_of(object_id) {
                    if let Some(interface) = self.registry.get(&interface_id) {
                        if let Some(controller) = interface.borrow_mut().as_output_controller() {
                            if let Err(err) = controller.add_output(&self.registry, object_id) {
                                warn!(object = object_id, "address change rejected: {err}");
                            }
                        }
                    }
                }
            }
            _ if object_id == WORLD_ID && name == "power_on" => {
                let power_on = object
                    .borrow()
                    .core()
                    .property("power_on")
                    .and_then(|p| p.value().as_bool())
                    .unwrap_or(false);
                self.fan_out_world_event(power_on);
            }
            _ => {}
        }
    }

    fn fan_out_world_event(&mut self, power_on: bool) {
        let ids: Vec<String> = self.registry.ids().cloned().collect();
        for id in ids {
            let Some(object) = self.registry.get(&id) else {
                continue;
            };
            let events = object.borrow_mut().world_event(power_on);
            for event in events {
                self.broadcast_item_event(&id, event);
            }
        }
    }

    fn interface_of(&self, object_id: &str) -> Option<String> {
        let object = self.registry.get(object_id)?;
        let borrowed = object.borrow();
        match borrowed.core().property("interface")?.value() {
            Value::Object(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Push one item change to every session holding a handle on the object,
    /// then refresh any table windows whose list contains it.
    pub fn broadcast_item_event(&self, object_id: &str, event: ItemEvent) {
        let Some(object) = self.registry.get(object_id) else {
            return;
        };
        let borrowed = object.borrow();

        match event {
            ItemEvent::Value { name } => {
                let Some(property) = borrowed.core().property(name) else {
                    return;
                };
                let value = property.value().clone();
                drop(borrowed);
                for session in self.sessions.values() {
                    if let Some(handle) = session.object_handle(object_id) {
                        session.send(&property_changed_event(handle, name, &value));
                    }
                }
            }
            ItemEvent::Attribute { name, attribute } => {
                let Some(value) = borrowed
                    .core()
                    .property(name)
                    .and_then(|p| p.attribute(attribute).cloned())
                else {
                    return;
                };
                drop(borrowed);
                for session in self.sessions.values() {
                    if let Some(handle) = session.object_handle(object_id) {
                        session.send(&attribute_changed_event(handle, name, attribute, &value));
                    }
                }
            }
        }

        if matches!(event, ItemEvent::Value { .. }) {
            self.refresh_windows_for_member(object_id);
        }
    }

    fn broadcast_object_events(&self, events: Vec<ObjectItemEvent>) {
        for ObjectItemEvent { object_id, event } in events {
            self.broadcast_item_event(&object_id, event);
        }
    }

    /// A cell of some projected list may have changed: push the subscribed
    /// region of every window whose list contains the member.
    fn refresh_windows_for_member(&self, member_id: &str) {
        let mut updates = Vec::new();
        for (&session_id, session) in &self.sessions {
            for (handle, window) in session.tables() {
                let Some(region) = window.region else {
                    continue;
                };
                let contains = self
                    .registry
                    .with::<ObjectList, _>(&window.object_id, |list| {
                        list.contains_member(member_id)
                    })
                    .unwrap_or(false);
                if contains {
                    updates.push((session_id, handle, window.object_id.clone(), region));
                }
            }
        }
        for (session_id, handle, object_id, region) in updates {
            self.push_region_update(session_id, handle, &object_id, region);
        }
    }

    /// Row membership of a list changed: push the new row count and the
    /// subscribed region to every window on it.
    pub fn notify_table_changed(&mut self, list_id: &str) {
        let row_count = {
            let Some(object) = self.registry.get(list_id) else {
                return;
            };
            let borrowed = object.borrow();
            let Some(table) = borrowed.as_table() else {
                return;
            };
            table.row_count()
        };

        let mut updates = Vec::new();
        for (&session_id, session) in &self.sessions {
            for handle in session.tables_for_object(list_id) {
                updates.push((session_id, handle));
            }
        }
        for (session_id, handle) in updates {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };
            let Some(window) = session.table_mut(handle) else {
                continue;
            };
            let region = window.region;
            if window.last_row_count != row_count {
                window.last_row_count = row_count;
                session.send(&row_count_changed_event(handle, row_count));
            }
            if let Some(region) = region {
                self.push_region_update(session_id, handle, list_id, region);
            }
        }
    }

    // ------------------------------------------------------------------
    // World actions
    // ------------------------------------------------------------------

    fn execute_world_action(&mut self, action: WorldAction) {
        match action {
            WorldAction::AddListEntry { list_id } => {
                if list_id == TRAINS_ID {
                    let id = next_train_id(&self.registry);
                    let ctx = CreateCtx {
                        events: self.events.clone(),
                    };
                    if self.registry.create("train", &id, &ctx).is_ok() {
                        self.registry
                            .with::<ObjectList, _>(TRAINS_ID, |list| list.add_member(&id));
                        self.notify_table_changed(TRAINS_ID);
                    }
                }
            }
            WorldAction::RemoveObject { object_id } => self.remove_object(&object_id),
            WorldAction::SimulateInputChange {
                interface_id,
                channel,
                address,
            } => {
                if let Some(interface) = self.registry.get(&interface_id) {
                    if let Some(controller) = interface.borrow_mut().as_input_controller() {
                        controller.input_simulate_change(channel, address);
                    }
                }
            }
        }
    }

    fn remove_object(&mut self, object_id: &str) {
        // Drop it from any list that carries it, revoke leased handles, then
        // let the last reference go.
        let list_ids: Vec<String> = self.registry.ids().cloned().collect();
        let mut changed_lists = Vec::new();
        for list_id in list_ids {
            let removed = self
                .registry
                .with::<ObjectList, _>(&list_id, |list| list.remove_member(object_id))
                .unwrap_or(false);
            if removed {
                changed_lists.push(list_id);
            }
        }
        for session in self.sessions.values_mut() {
            session.revoke_object(object_id);
        }
        self.registry.remove(object_id);
        for list_id in changed_lists {
            self.notify_table_changed(&list_id);
        }
    }

    // ------------------------------------------------------------------
    // Kernel callbacks
    // ------------------------------------------------------------------

    pub fn interface_started(&mut self, interface_id: &str) {
        info!(id = interface_id, "interface online");
        let events = self
            .registry
            .with::<DiyInterface, _>(interface_id, |interface| interface.kernel_started())
            .unwrap_or_default();
        for event in events {
            self.broadcast_item_event(interface_id, event);
        }
    }

    pub fn interface_transport_failed(&mut self, interface_id: &str, reason: &str) {
        warn!(id = interface_id, "transport failed: {reason}");
        let events = self
            .registry
            .with::<DiyInterface, _>(interface_id, |interface| interface.kernel_failed())
            .unwrap_or_default();
        for event in events {
            self.broadcast_item_event(interface_id, event);
        }
    }

    pub fn kernel_input_changed(&mut self, interface_id: &str, address: u16, state: InputState) {
        if state == InputState::Invalid {
            let known = self
                .registry
                .with::<DiyInterface, _>(interface_id, |interface| {
                    interface.has_input_address(address as u32)
                })
                .unwrap_or(false);
            if known {
                warn!(id = interface_id, address, "input address is invalid");
            }
            return;
        }
        let events = self.update_input(interface_id, address as u32, input_tri_state(state));
        self.broadcast_object_events(events);
    }

    pub fn kernel_output_changed(&mut self, interface_id: &str, address: u16, state: OutputState) {
        if state == OutputState::Invalid {
            let known = self
                .registry
                .with::<DiyInterface, _>(interface_id, |interface| {
                    interface.has_output_address(address as u32)
                })
                .unwrap_or(false);
            if known {
                warn!(id = interface_id, address, "output address is invalid");
            }
            return;
        }
        let Some(interface) = self.registry.get(interface_id) else {
            return;
        };
        let events = interface
            .borrow_mut()
            .as_output_controller()
            .map(|controller| {
                controller.update_output_value(
                    &self.registry,
                    DEFAULT_CHANNEL,
                    address as u32,
                    output_tri_state(state),
                )
            })
            .unwrap_or_default();
        self.broadcast_object_events(events);
    }

    fn update_input(
        &mut self,
        interface_id: &str,
        address: u32,
        value: TriState,
    ) -> Vec<ObjectItemEvent> {
        let Some(interface) = self.registry.get(interface_id) else {
            return Vec::new();
        };
        let events = interface
            .borrow_mut()
            .as_input_controller()
            .map(|controller| {
                controller.update_input_value(&self.registry, DEFAULT_CHANNEL, address, value)
            })
            .unwrap_or_default();
        events
    }

    pub fn kernel_features_received(&mut self, interface_id: &str, flags: FeatureFlags) {
        self.registry
            .with::<DiyInterface, _>(interface_id, |interface| {
                interface.prime_state_queries(flags)
            });
    }
}

fn io_channel_address(object: &dyn crate::core::object::Object) -> (u32, u32) {
    let core = object.core();
    let channel = core
        .property("channel")
        .and_then(|p| p.value().as_integer())
        .unwrap_or_default() as u32;
    let address = core
        .property("address")
        .and_then(|p| p.value().as_integer())
        .unwrap_or_default() as u32;
    (channel, address)
}

// ----------------------------------------------------------------------------
// Server Runtime
// ----------------------------------------------------------------------------

/// Wires sockets, tokio tasks and the main loop thread together.
pub struct ServerRuntime {
    handle: EventLoopHandle<Server>,
    world_thread: Option<std::thread::JoinHandle<()>>,
    local_addr: SocketAddr,
    discovery_addr: Option<SocketAddr>,
}

impl ServerRuntime {
    /// Bind the sockets, build the world and start serving.
    pub async fn start(settings: Settings) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", settings.tcp_port)).await?;
        let local_addr = listener.local_addr()?;

        let (event_loop, handle) = EventLoop::new();

        let discovery_addr = if settings.discovery_enabled {
            match UdpSocket::bind(("0.0.0.0", settings.tcp_port)).await {
                Ok(socket) => {
                    let _ = socket.set_ttl(DISCOVERY_TTL);
                    let addr = socket.local_addr().ok();
                    tokio::spawn(run_discovery(
                        socket,
                        settings.server_name.clone(),
                        local_addr.port(),
                    ));
                    addr
                }
                Err(err) => {
                    warn!("discovery responder disabled: {err}");
                    None
                }
            }
        } else {
            None
        };

        tokio::spawn(run_acceptor(listener, handle.clone()));

        let thread_settings = settings;
        let thread_handle = handle.clone();
        let world_thread = std::thread::Builder::new()
            .name("world".to_owned())
            .spawn(move || {
                let mut server = Server::new(thread_settings, thread_handle);
                server.build_world();
                event_loop.run(&mut server, Server::shutdown_requested);
            })?;

        info!(%local_addr, "server listening");
        Ok(Self {
            handle,
            world_thread: Some(world_thread),
            local_addr,
            discovery_addr,
        })
    }

    pub fn handle(&self) -> EventLoopHandle<Server> {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery_addr
    }

    /// Stop the main loop and join its thread.
    pub fn shutdown(mut self) {
        self.handle.post(Server::request_shutdown);
        if let Some(thread) = self.world_thread.take() {
            let _ = thread.join();
        }
    }
}
