//! World persistence seams
//!
//! The container format (an xz-compressed tar of JSON documents) lives
//! outside this crate; the core consumes readers and savers through these
//! traits only. What gets stored is derived from the reflective model: every
//! property flagged `Store`, one JSON document per object, plus `state.json`.

use std::collections::HashMap;

use serde_json::{json, Value as Json};
use thiserror::Error;

use traintastic_core::Value;

use crate::core::object::Object;
use crate::core::registry::ObjectRegistry;

#[derive(Debug, Error)]
pub enum WorldIoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing document: {0}")]
    Missing(String),
    #[error("bad document {path}: {reason}")]
    Format { path: String, reason: String },
}

// ----------------------------------------------------------------------------
// Traits
// ----------------------------------------------------------------------------

/// Read access to the documents of one world container.
pub trait WorldReader {
    fn read_file(&self, path: &str) -> Result<Json, WorldIoError>;
    fn contains(&self, path: &str) -> bool;
}

/// Write access to the documents of one world container.
pub trait WorldSaver {
    fn write_file(&mut self, path: &str, document: &Json) -> Result<(), WorldIoError>;
    fn delete_file(&mut self, path: &str) -> Result<(), WorldIoError>;
}

/// In-memory store, used by tests and as staging before containerisation.
#[derive(Debug, Default)]
pub struct MemoryWorldStore {
    files: HashMap<String, Json>,
}

impl MemoryWorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl WorldReader for MemoryWorldStore {
    fn read_file(&self, path: &str) -> Result<Json, WorldIoError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| WorldIoError::Missing(path.to_owned()))
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

impl WorldSaver for MemoryWorldStore {
    fn write_file(&mut self, path: &str, document: &Json) -> Result<(), WorldIoError> {
        self.files.insert(path.to_owned(), document.clone());
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> Result<(), WorldIoError> {
        self.files.remove(path);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Save / Load
// ----------------------------------------------------------------------------

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Boolean(v) => json!(v),
        Value::Integer(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::String(v) => json!(v),
        Value::Object(id) => json!(id),
        Value::Enum { value, .. } => json!(value),
        Value::Set { value, .. } => json!(value),
    }
}

fn value_from_json(current: &Value, document: &Json) -> Option<Value> {
    match current {
        Value::Boolean(_) => document.as_bool().map(Value::Boolean),
        Value::Integer(_) => document.as_i64().map(Value::Integer),
        Value::Float(_) => document.as_f64().map(Value::Float),
        Value::String(_) => document.as_str().map(Value::from),
        Value::Object(_) => document.as_str().map(|s| Value::Object(s.to_owned())),
        Value::Enum { type_name, .. } => document.as_i64().map(|value| Value::Enum {
            type_name: type_name.clone(),
            value,
        }),
        Value::Set { type_name, .. } => document.as_u64().map(|value| Value::Set {
            type_name: type_name.clone(),
            value,
        }),
    }
}

/// Write every stored property of every object, one document per object.
pub fn save_world(registry: &ObjectRegistry, saver: &mut dyn WorldSaver) -> Result<(), WorldIoError> {
    for id in registry.ids() {
        let object = registry.get(id).expect("id from registry iteration");
        let object = object.borrow();
        let core = object.core();

        let mut properties = serde_json::Map::new();
        for item in core.items() {
            if let Some(property) = item.as_property() {
                if property.flags().is_stored() && !property.flags().is_sub_object() {
                    properties.insert(item.name().to_owned(), value_to_json(property.value()));
                }
            }
        }
        if properties.is_empty() {
            continue;
        }
        let document = json!({
            "class_id": core.class_id(),
            "properties": Json::Object(properties),
        });
        saver.write_file(&format!("{id}.json"), &document)?;
    }
    Ok(())
}

/// Apply stored properties onto an already built object tree.
pub fn load_world(registry: &ObjectRegistry, reader: &dyn WorldReader) -> Result<(), WorldIoError> {
    for id in registry.ids() {
        let path = format!("{id}.json");
        if !reader.contains(&path) {
            continue;
        }
        let document = reader.read_file(&path)?;
        let Some(properties) = document.get("properties").and_then(Json::as_object) else {
            return Err(WorldIoError::Format {
                path,
                reason: "no properties object".to_owned(),
            });
        };

        let object = registry.get(id).expect("id from registry iteration");
        let mut object = object.borrow_mut();
        let core = object.core_mut();
        for (name, json_value) in properties {
            let Some(property) = core.property(name) else {
                continue;
            };
            if !property.flags().is_stored() {
                continue;
            }
            if let Some(value) = value_from_json(property.value(), json_value) {
                core.set_value_internal(name, value);
            }
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_loop::EventLoop;
    use crate::core::settings::Settings;
    use crate::world::world::create_world;

    fn build() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        let (_loop, handle) = EventLoop::new();
        create_world(&mut registry, &handle, &Settings::default());
        registry
    }

    #[test]
    fn test_save_then_load_round_trips_stored_properties() {
        let registry = build();
        registry.get("train_1").unwrap().borrow_mut().core_mut().set_value_internal(
            "name",
            Value::from("renamed"),
        );

        let mut store = MemoryWorldStore::new();
        save_world(&registry, &mut store).unwrap();
        assert!(store.contains("train_1.json"));
        assert!(store.contains("world.json"));

        let fresh = build();
        load_world(&fresh, &store).unwrap();
        let train = fresh.get("train_1").unwrap();
        let train = train.borrow();
        assert_eq!(
            train.core().property("name").unwrap().value().as_str(),
            Some("renamed")
        );
    }

    #[test]
    fn test_no_store_properties_are_not_saved() {
        let registry = build();
        let mut store = MemoryWorldStore::new();
        save_world(&registry, &mut store).unwrap();
        let doc = store.read_file("world.json").unwrap();
        let properties = doc.get("properties").unwrap().as_object().unwrap();
        assert!(properties.contains_key("name"));
        assert!(!properties.contains_key("power_on"));
    }

    #[test]
    fn test_missing_file_errors() {
        let store = MemoryWorldStore::new();
        assert!(matches!(
            store.read_file("nope.json"),
            Err(WorldIoError::Missing(_))
        ));
    }
}
