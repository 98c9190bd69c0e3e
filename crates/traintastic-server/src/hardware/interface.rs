//! TraintasticDIY interface object
//!
//! The interface is the domain face of one connected device: it owns the
//! kernel while online, implements the three controller contracts, and keeps
//! the address maps the kernel's state priming and update routing work from.
//! Going online builds a fresh kernel with the configured IO handler; going
//! offline stops and drops it.

use std::any::Any;
use std::collections::HashMap;

use tracing::{debug, warn};

use traintastic_core::{
    AttributeName, InterfaceStatus, PropertyFlags, Result, TriState, Value,
};

use crate::core::event_loop::EventLoopHandle;
use crate::core::object::{
    ItemEvent, new_object_ref, Object, ObjectCore, ObjectItemEvent, ObjectRef, SetPropertyError,
};
use crate::core::registry::ObjectRegistry;
use crate::core::server::Server;
use crate::hardware::controller::{
    check_address_in_range, DecoderChangeFlags, DecoderController, InputController,
    OutputController,
};
use crate::hardware::decoder::{DCC_ADDRESS_MAX, DCC_ADDRESS_MIN};
use crate::hardware::object_list::{ListColumn, ObjectList};
use crate::hardware::protocol::diy::config::DiyConfig;
use crate::hardware::protocol::diy::io_handler::{IoHandler, SimulationIoHandler, TcpIoHandler};
use crate::hardware::protocol::diy::kernel::{
    Kernel, KernelEvents, IO_ADDRESS_MAX, IO_ADDRESS_MIN,
};
use crate::hardware::protocol::diy::messages::{
    DiyMessage, FeatureFlags, InputState, OutputState,
};
use crate::hardware::protocol::diy::DEFAULT_DEVICE_PORT;

pub const CLASS_ID: &str = "interface.traintastic_diy";

// ----------------------------------------------------------------------------
// Interface Object
// ----------------------------------------------------------------------------

pub struct DiyInterface {
    core: ObjectCore,
    events: EventLoopHandle<Server>,
    kernel: Option<Kernel>,
    simulation: bool,
    kernel_config: DiyConfig,
    decoder_ids: Vec<String>,
    input_addresses: HashMap<u32, String>,
    output_addresses: HashMap<u32, String>,
}

impl DiyInterface {
    /// Build the interface and its list sub-objects, registering everything.
    pub fn create(
        registry: &mut ObjectRegistry,
        events: EventLoopHandle<Server>,
        id: &str,
        hostname: &str,
        simulation: bool,
        kernel_config: DiyConfig,
    ) -> ObjectRef {
        let columns = vec![ListColumn::Id, ListColumn::Name, ListColumn::Address];
        for (suffix, class_id, table_class_id) in [
            ("decoders", "decoder_list", "decoder_list_table_model"),
            ("inputs", "input_list", "input_list_table_model"),
            ("outputs", "output_list", "output_list_table_model"),
        ] {
            registry.insert(new_object_ref(ObjectList::new(
                class_id,
                table_class_id,
                format!("{id}.{suffix}"),
                columns.clone(),
            )));
        }

        let mut core = ObjectCore::new(CLASS_ID, id);
        core.add_property(
            "name",
            Value::from("TraintasticDIY"),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );
        core.add_property(
            "hostname",
            Value::from(hostname),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );
        core.add_property(
            "online",
            Value::Boolean(false),
            PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
        );
        core.add_property(
            "status",
            status_value(InterfaceStatus::Offline),
            PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
        );
        for name in ["decoders", "inputs", "outputs"] {
            core.add_property(
                name,
                Value::Object(format!("{id}.{name}")),
                PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE | PropertyFlags::SUB_OBJECT,
            );
        }
        core.add_property(
            "notes",
            Value::from(""),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );

        let interface = new_object_ref(Self {
            core,
            events,
            kernel: None,
            simulation,
            kernel_config,
            decoder_ids: Vec::new(),
            input_addresses: HashMap::new(),
            output_addresses: HashMap::new(),
        });
        registry.insert(interface.clone());
        interface
    }

    pub fn is_online(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn has_input_address(&self, address: u32) -> bool {
        self.input_addresses.contains_key(&address)
    }

    pub fn has_output_address(&self, address: u32) -> bool {
        self.output_addresses.contains_key(&address)
    }

    fn list_id(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.core.id())
    }

    fn hostname(&self) -> String {
        self.core
            .property("hostname")
            .and_then(|p| p.value().as_str().map(str::to_owned))
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Online / Offline
    // ------------------------------------------------------------------

    fn apply_online(&mut self, online: bool) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        if online && self.kernel.is_none() {
            events.extend(
                self.core
                    .set_value_internal("status", status_value(InterfaceStatus::Initializing)),
            );
            match self.start_kernel() {
                Ok(kernel) => {
                    self.kernel = Some(kernel);
                    events.extend(self.core.set_attribute(
                        "hostname",
                        AttributeName::Enabled,
                        Value::Boolean(false),
                    ));
                }
                Err(err) => {
                    warn!(id = %self.core.id(), "going online failed: {err}");
                    events.extend(
                        self.core
                            .set_value_internal("status", status_value(InterfaceStatus::Offline)),
                    );
                    events.extend(self.core.set_value_internal("online", Value::Boolean(false)));
                }
            }
        } else if !online {
            if let Some(mut kernel) = self.kernel.take() {
                kernel.stop();
            }
            events.extend(
                self.core
                    .set_value_internal("status", status_value(InterfaceStatus::Offline)),
            );
            events.extend(self.core.set_attribute(
                "hostname",
                AttributeName::Enabled,
                Value::Boolean(true),
            ));
        }
        events
    }

    fn start_kernel(&mut self) -> Result<Kernel> {
        let mut kernel = Kernel::new(self.kernel_config.clone(), self.simulation);
        kernel.set_log_id(self.core.id());

        let io_handler: Box<dyn IoHandler> = if self.simulation {
            Box::new(SimulationIoHandler::new())
        } else {
            let hostname = self.hostname();
            let address = if hostname.contains(':') {
                hostname
            } else {
                format!("{hostname}:{DEFAULT_DEVICE_PORT}")
            };
            Box::new(TcpIoHandler::new(address))
        };
        kernel.set_io_handler(io_handler);
        kernel.set_events(Box::new(KernelBridge {
            events: self.events.clone(),
            interface_id: self.core.id().to_owned(),
        }));
        kernel.start()?;
        Ok(kernel)
    }

    /// Called when the kernel reports the session up.
    pub fn kernel_started(&mut self) -> Vec<ItemEvent> {
        self.core
            .set_value_internal("status", status_value(InterfaceStatus::Online))
    }

    /// Called when the kernel's transport broke; the interface goes offline,
    /// the server stays up.
    pub fn kernel_failed(&mut self) -> Vec<ItemEvent> {
        if let Some(mut kernel) = self.kernel.take() {
            kernel.stop();
        }
        let mut events = self
            .core
            .set_value_internal("status", status_value(InterfaceStatus::Offline));
        events.extend(self.core.set_value_internal("online", Value::Boolean(false)));
        events.extend(self.core.set_attribute(
            "hostname",
            AttributeName::Enabled,
            Value::Boolean(true),
        ));
        events
    }

    /// Feature handshake done: prime the kernel caches with one state query
    /// per known address.
    pub fn prime_state_queries(&self, flags: FeatureFlags) {
        let Some(kernel) = &self.kernel else {
            return;
        };
        let handle = kernel.handle();
        if flags.has_input() {
            let mut addresses: Vec<_> = self.input_addresses.keys().copied().collect();
            addresses.sort_unstable();
            for address in addresses {
                handle.post_send(DiyMessage::GetInputState(address as u16));
            }
        }
        if flags.has_output() {
            let mut addresses: Vec<_> = self.output_addresses.keys().copied().collect();
            addresses.sort_unstable();
            for address in addresses {
                handle.post_send(DiyMessage::GetOutputState(address as u16));
            }
        }
    }
}

/// Write a kernel-confirmed tri-state into the object mapped at `address`.
fn io_value_events(
    addresses: &HashMap<u32, String>,
    registry: &ObjectRegistry,
    address: u32,
    value: TriState,
    property: &str,
) -> Vec<ObjectItemEvent> {
    let Some(object_id) = addresses.get(&address) else {
        return Vec::new();
    };
    let Some(object) = registry.get(object_id) else {
        return Vec::new();
    };
    let events = object.borrow_mut().core_mut().set_value_internal(
        property,
        Value::enumeration(TriState::TYPE_NAME, value.as_u8() as i64),
    );
    events
        .into_iter()
        .map(|event| ObjectItemEvent {
            object_id: object_id.clone(),
            event,
        })
        .collect()
}

fn status_value(status: InterfaceStatus) -> Value {
    Value::enumeration(InterfaceStatus::TYPE_NAME, status.as_u8() as i64)
}

fn property_integer(registry: &ObjectRegistry, object_id: &str, name: &str) -> Option<i64> {
    registry
        .get(object_id)?
        .borrow()
        .core()
        .property(name)?
        .value()
        .as_integer()
}

// ----------------------------------------------------------------------------
// Object Impl
// ----------------------------------------------------------------------------

impl Object for DiyInterface {
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

    fn set_property(
        &mut self,
        name: &str,
        value: Value,
    ) -> std::result::Result<Vec<ItemEvent>, SetPropertyError> {
        if name == "online" {
            let requested = value.as_bool().ok_or(SetPropertyError::TypeMismatch)?;
            let mut events = self.core.write_property(name, value)?;
            if !events.is_empty() {
                events.extend(self.apply_online(requested));
            }
            Ok(events)
        } else {
            self.core.write_property(name, value)
        }
    }

    fn world_event(&mut self, power_on: bool) -> Vec<ItemEvent> {
        // The DIY wire has no power or stop opcodes; other kernels map this
        // to their emergency-stop/go exchange.
        if self.kernel.is_some() {
            debug!(id = %self.core.id(), power_on, "world event ignored by protocol");
        }
        Vec::new()
    }

    fn as_decoder_controller(&mut self) -> Option<&mut dyn DecoderController> {
        Some(self)
    }

    fn as_input_controller(&mut self) -> Option<&mut dyn InputController> {
        Some(self)
    }

    fn as_output_controller(&mut self) -> Option<&mut dyn OutputController> {
        Some(self)
    }
}

// ----------------------------------------------------------------------------
// Controller Impls
// ----------------------------------------------------------------------------

impl DecoderController for DiyInterface {
    fn add_decoder(&mut self, registry: &ObjectRegistry, decoder_id: &str) -> Result<()> {
        let address = property_integer(registry, decoder_id, "address").unwrap_or_default();
        check_address_in_range(
            address.clamp(0, u32::MAX as i64) as u32,
            (DCC_ADDRESS_MIN as u32, DCC_ADDRESS_MAX as u32),
        )?;
        if !self.decoder_ids.iter().any(|id| id == decoder_id) {
            self.decoder_ids.push(decoder_id.to_owned());
            registry.with::<ObjectList, _>(&self.list_id("decoders"), |list| {
                list.add_member(decoder_id)
            });
        }
        Ok(())
    }

    fn remove_decoder(&mut self, registry: &ObjectRegistry, decoder_id: &str) {
        self.decoder_ids.retain(|id| id != decoder_id);
        registry.with::<ObjectList, _>(&self.list_id("decoders"), |list| {
            list.remove_member(decoder_id)
        });
    }

    fn decoder_changed(
        &mut self,
        _registry: &ObjectRegistry,
        decoder_id: &str,
        changes: DecoderChangeFlags,
        _function_number: u32,
    ) {
        // Forward only when online; the DIY wire has no decoder opcodes, so
        // the intent ends here.
        if self.kernel.is_some() {
            debug!(
                id = %self.core.id(),
                decoder = decoder_id,
                changes = changes.as_u8(),
                "decoder change not supported by protocol"
            );
        }
    }
}

impl InputController for DiyInterface {
    fn input_address_min_max(&self, _channel: u32) -> (u32, u32) {
        (IO_ADDRESS_MIN as u32, IO_ADDRESS_MAX as u32)
    }

    fn add_input(&mut self, registry: &ObjectRegistry, input_id: &str) -> Result<()> {
        let channel = property_integer(registry, input_id, "channel").unwrap_or_default() as u32;
        let address = property_integer(registry, input_id, "address").unwrap_or_default() as u32;
        check_address_in_range(address, self.input_address_min_max(channel))?;
        self.input_addresses.retain(|_, id| id != input_id);
        self.input_addresses.insert(address, input_id.to_owned());
        registry.with::<ObjectList, _>(&self.list_id("inputs"), |list| list.add_member(input_id));
        Ok(())
    }

    fn remove_input(&mut self, registry: &ObjectRegistry, input_id: &str) {
        self.input_addresses.retain(|_, id| id != input_id);
        registry
            .with::<ObjectList, _>(&self.list_id("inputs"), |list| list.remove_member(input_id));
    }

    fn input_simulate_change(&mut self, channel: u32, address: u32) {
        if let Some(kernel) = &self.kernel {
            if check_address_in_range(address, self.input_address_min_max(channel)).is_ok() {
                kernel.simulate_input_change(address as u16);
            }
        }
    }

    fn update_input_value(
        &mut self,
        registry: &ObjectRegistry,
        _channel: u32,
        address: u32,
        value: TriState,
    ) -> Vec<ObjectItemEvent> {
        io_value_events(&self.input_addresses, registry, address, value, "value")
    }
}

impl OutputController for DiyInterface {
    fn output_address_min_max(&self, _channel: u32) -> (u32, u32) {
        (IO_ADDRESS_MIN as u32, IO_ADDRESS_MAX as u32)
    }

    fn add_output(&mut self, registry: &ObjectRegistry, output_id: &str) -> Result<()> {
        let channel = property_integer(registry, output_id, "channel").unwrap_or_default() as u32;
        let address = property_integer(registry, output_id, "address").unwrap_or_default() as u32;
        check_address_in_range(address, self.output_address_min_max(channel))?;
        self.output_addresses.retain(|_, id| id != output_id);
        self.output_addresses.insert(address, output_id.to_owned());
        registry.with::<ObjectList, _>(&self.list_id("outputs"), |list| list.add_member(output_id));
        Ok(())
    }

    fn remove_output(&mut self, registry: &ObjectRegistry, output_id: &str) {
        self.output_addresses.retain(|_, id| id != output_id);
        registry
            .with::<ObjectList, _>(&self.list_id("outputs"), |list| list.remove_member(output_id));
    }

    fn set_output_value(&mut self, channel: u32, address: u32, value: bool) -> bool {
        match &self.kernel {
            Some(kernel) => {
                check_address_in_range(address, self.output_address_min_max(channel)).is_ok()
                    && kernel.set_output(address as u16, value)
            }
            None => false,
        }
    }

    fn update_output_value(
        &mut self,
        registry: &ObjectRegistry,
        _channel: u32,
        address: u32,
        value: TriState,
    ) -> Vec<ObjectItemEvent> {
        io_value_events(&self.output_addresses, registry, address, value, "state")
    }
}

// ----------------------------------------------------------------------------
// Kernel Bridge
// ----------------------------------------------------------------------------

/// Posts kernel notifications onto the main loop; holds no object reference,
/// only the interface id.
struct KernelBridge {
    events: EventLoopHandle<Server>,
    interface_id: String,
}

impl KernelEvents for KernelBridge {
    fn started(&self) {
        let id = self.interface_id.clone();
        self.events.post(move |server| server.interface_started(&id));
    }

    fn info(&self, text: String) {
        tracing::info!(id = %self.interface_id, "{text}");
    }

    fn input_changed(&self, address: u16, state: InputState) {
        let id = self.interface_id.clone();
        self.events
            .post(move |server| server.kernel_input_changed(&id, address, state));
    }

    fn output_changed(&self, address: u16, state: OutputState) {
        let id = self.interface_id.clone();
        self.events
            .post(move |server| server.kernel_output_changed(&id, address, state));
    }

    fn features_received(&self, flags: FeatureFlags) {
        let id = self.interface_id.clone();
        self.events
            .post(move |server| server.kernel_features_received(&id, flags));
    }

    fn transport_failed(&self, reason: String) {
        let id = self.interface_id.clone();
        self.events
            .post(move |server| server.interface_transport_failed(&id, &reason));
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_loop::EventLoop;
    use crate::core::table_model::TableObject;
    use crate::hardware::input::Input;

    fn build() -> (ObjectRegistry, ObjectRef) {
        let mut registry = ObjectRegistry::new();
        let (_loop, handle) = EventLoop::new();
        let interface = DiyInterface::create(
            &mut registry,
            handle,
            "diy_1",
            "localhost",
            true,
            DiyConfig::default(),
        );
        (registry, interface)
    }

    fn add_input_at(registry: &mut ObjectRegistry, interface: &ObjectRef, id: &str, address: i64) {
        registry.insert(new_object_ref(Input::new(
            id,
            id,
            0,
            address,
            (IO_ADDRESS_MIN as u32, IO_ADDRESS_MAX as u32),
            "diy_1",
        )));
        let mut interface = interface.borrow_mut();
        let controller = interface.as_input_controller().unwrap();
        controller.add_input(registry, id).unwrap();
    }

    #[test]
    fn test_add_input_validates_address() {
        let (mut registry, interface) = build();
        // The input claims address 0, below the channel minimum.
        let core = {
            let mut core = crate::core::object::ObjectCore::new("input", "bad_input");
            core.add_property(
                "channel",
                Value::Integer(0),
                traintastic_core::PropertyFlags::READ_ONLY,
            );
            core.add_property(
                "address",
                Value::Integer(0),
                traintastic_core::PropertyFlags::READ_WRITE,
            );
            core
        };
        registry.insert(new_object_ref(crate::hardware::object_list::DataObject::new(core)));

        let mut interface = interface.borrow_mut();
        let controller = interface.as_input_controller().unwrap();
        assert!(matches!(
            controller.add_input(&registry, "bad_input"),
            Err(traintastic_core::CoreError::AddressOutOfRange { address: 0, .. })
        ));
    }

    #[test]
    fn test_add_input_registers_address_and_list_member() {
        let (mut registry, interface) = build();
        add_input_at(&mut registry, &interface, "input_9", 9);

        let borrowed = interface.borrow();
        let concrete = borrowed.as_any().downcast_ref::<DiyInterface>().unwrap();
        assert!(concrete.has_input_address(9));
        drop(borrowed);

        let list = registry.get("diy_1.inputs").unwrap();
        let list = list.borrow();
        assert_eq!(list.as_table().unwrap().row_count(), 1);
    }

    #[test]
    fn test_update_input_value_routes_to_mapped_object() {
        let (mut registry, interface) = build();
        add_input_at(&mut registry, &interface, "input_9", 9);

        let mut borrowed = interface.borrow_mut();
        let controller = borrowed.as_input_controller().unwrap();
        let events = controller.update_input_value(&registry, 0, 9, TriState::True);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].object_id, "input_9");

        // Unknown address: nothing to update.
        assert!(controller
            .update_input_value(&registry, 0, 10, TriState::True)
            .is_empty());

        drop(borrowed);
        let input = registry.get("input_9").unwrap();
        let input = input.borrow();
        assert_eq!(
            input.core().property("value").unwrap().value().as_enum_value(),
            Some(TriState::True.as_u8() as i64)
        );
    }

    #[test]
    fn test_remove_input_clears_address() {
        let (mut registry, interface) = build();
        add_input_at(&mut registry, &interface, "input_9", 9);

        let mut borrowed = interface.borrow_mut();
        let controller = borrowed.as_input_controller().unwrap();
        controller.remove_input(&registry, "input_9");
        drop(borrowed);

        let borrowed = interface.borrow();
        let concrete = borrowed.as_any().downcast_ref::<DiyInterface>().unwrap();
        assert!(!concrete.has_input_address(9));
    }

    #[test]
    fn test_set_output_value_requires_kernel() {
        let (_registry, interface) = build();
        let mut borrowed = interface.borrow_mut();
        let controller = borrowed.as_output_controller().unwrap();
        assert!(!controller.set_output_value(0, 50, true));
    }
}
