//! The world object and world construction
//!
//! The world is the root of the object tree. Toggling `power_on` fans a world
//! event out to every interface; the server owns that routing so the world
//! object itself stays a plain reflective object.

use traintastic_core::{PropertyFlags, Value};

use crate::core::event_loop::EventLoopHandle;
use crate::core::object::{new_object_ref, Object, ObjectCore};
use crate::core::registry::ObjectRegistry;
use crate::core::server::Server;
use crate::core::settings::Settings;
use crate::hardware::decoder;
use crate::hardware::input::Input;
use crate::hardware::interface::DiyInterface;
use crate::hardware::object_list::{DataObject, ListColumn, ObjectList};
use crate::hardware::output;
use crate::hardware::protocol::diy::config::DiyConfig;
use crate::world::clock;
use crate::world::train::Train;

pub const WORLD_ID: &str = "world";
pub const CLASS_ID: &str = "world";
pub const CLOCK_ID: &str = "world.clock";
pub const TRAINS_ID: &str = "trains";

/// Build the object tree: world, clock, train list and, when configured, one
/// DIY interface with a starter set of hardware objects.
pub fn create_world(
    registry: &mut ObjectRegistry,
    events: &EventLoopHandle<Server>,
    settings: &Settings,
) {
    registry.insert(new_object_ref(clock::create(CLOCK_ID)));

    let trains = ObjectList::new(
        "train_list",
        "train_list_table_model",
        TRAINS_ID,
        vec![ListColumn::Id, ListColumn::Name],
    )
    .with_add_method();
    registry.insert(new_object_ref(trains));
    for (id, name) in [
        ("train_1", "NS 1200"),
        ("train_2", "BR 01"),
        ("train_3", "TGV"),
    ] {
        add_train(registry, id, name);
    }

    let mut core = ObjectCore::new(CLASS_ID, WORLD_ID);
    core.add_property(
        "name",
        Value::from(settings.world_name.as_str()),
        PropertyFlags::READ_WRITE | PropertyFlags::STORE,
    );
    core.add_property(
        "power_on",
        Value::Boolean(false),
        PropertyFlags::READ_WRITE | PropertyFlags::NO_STORE,
    );
    core.add_property(
        "clock",
        Value::Object(CLOCK_ID.to_owned()),
        PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE | PropertyFlags::SUB_OBJECT,
    );
    core.add_property(
        "trains",
        Value::Object(TRAINS_ID.to_owned()),
        PropertyFlags::READ_ONLY | PropertyFlags::NO_STORE,
    );
    core.add_event("power_changed");
    registry.insert(new_object_ref(DataObject::new(core)));

    if let Some(diy) = &settings.diy_interface {
        let interface_id = "diy_1";
        let interface = DiyInterface::create(
            registry,
            events.clone(),
            interface_id,
            &diy.hostname,
            diy.simulation,
            DiyConfig {
                heartbeat_timeout: std::time::Duration::from_millis(diy.heartbeat_timeout_ms),
                debug_log_rx_tx: diy.debug_log_rx_tx,
                debug_log_heartbeat: diy.debug_log_heartbeat,
            },
        );

        // Starter hardware set; a loaded world replaces these.
        let mut interface = interface.borrow_mut();
        let input_range = interface
            .as_input_controller()
            .map(|c| c.input_address_min_max(0))
            .unwrap_or((1, u16::MAX as u32));
        let output_range = interface
            .as_output_controller()
            .map(|c| c.output_address_min_max(0))
            .unwrap_or((1, u16::MAX as u32));

        for (id, name, address) in [("input_1", "Sensor 1", 100), ("input_2", "Sensor 2", 101)] {
            registry.insert(new_object_ref(Input::new(
                id,
                name,
                0,
                address,
                input_range,
                interface_id,
            )));
            if let Some(controller) = interface.as_input_controller() {
                let _ = controller.add_input(registry, id);
            }
        }
        for (id, name, address) in [("output_1", "Turnout 1", 50)] {
            registry.insert(new_object_ref(output::create(
                id,
                name,
                0,
                address,
                output_range,
                interface_id,
            )));
            if let Some(controller) = interface.as_output_controller() {
                let _ = controller.add_output(registry, id);
            }
        }
        registry.insert(new_object_ref(decoder::create(
            "decoder_1",
            "BR 01",
            3,
            interface_id,
        )));
        if let Some(controller) = interface.as_decoder_controller() {
            let _ = controller.add_decoder(registry, "decoder_1");
        }
    }
}

/// Create a train and append it to the list; returns its id.
pub fn add_train(registry: &mut ObjectRegistry, id: &str, name: &str) -> String {
    registry.insert(new_object_ref(Train::new(id, name)));
    registry.with::<ObjectList, _>(TRAINS_ID, |list| list.add_member(id));
    id.to_owned()
}

/// Allocate the next free `train_N` id.
pub fn next_train_id(registry: &ObjectRegistry) -> String {
    let mut n = 1;
    loop {
        let id = format!("train_{n}");
        if !registry.contains(&id) {
            return id;
        }
        n += 1;
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

    fn build() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        let (_loop, handle) = EventLoop::new();
        create_world(&mut registry, &handle, &Settings::default());
        registry
    }

    #[test]
    fn test_world_tree_exists() {
        let registry = build();
        for id in [WORLD_ID, CLOCK_ID, TRAINS_ID, "train_1", "train_3"] {
            assert!(registry.contains(id), "{id} missing");
        }
    }

    #[test]
    fn test_trains_table_shape() {
        let registry = build();
        let trains = registry.get(TRAINS_ID).unwrap();
        let trains = trains.borrow();
        let table = trains.as_table().unwrap();
        assert_eq!(table.column_headers(), vec!["Id", "Name"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.cell_text(&registry, 0, 0), "train_1");
        assert_eq!(table.cell_text(&registry, 1, 0), "NS 1200");
    }

    #[test]
    fn test_next_train_id_skips_existing() {
        let registry = build();
        assert_eq!(next_train_id(&registry), "train_4");
    }

    #[test]
    fn test_default_world_has_simulation_interface() {
        let registry = build();
        assert!(registry.contains("diy_1"));
        assert!(registry.contains("diy_1.inputs"));
        assert!(registry.contains("input_1"));
        let inputs = registry.get("diy_1.inputs").unwrap();
        let inputs = inputs.borrow();
        assert_eq!(inputs.as_table().unwrap().row_count(), 2);
    }
}
