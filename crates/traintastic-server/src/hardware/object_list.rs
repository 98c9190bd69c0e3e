//! List objects
//!
//! A list object owns the ordered membership of a family of objects (trains,
//! decoders, inputs, outputs) and projects it as a table. Which columns a
//! list shows is configured per list, the way each interface picks its own
//! column subset in the original.

use std::any::Any;

use crate::core::object::{MethodError, MethodOutcome, Object, ObjectCore, WorldAction};
use crate::core::registry::ObjectRegistry;
use crate::core::table_model::TableObject;

// ----------------------------------------------------------------------------
// Columns
// ----------------------------------------------------------------------------

/// Column of a list table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListColumn {
    Id,
    Name,
    Address,
    Channel,
}

impl ListColumn {
    pub fn header(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::Address => "Address",
            Self::Channel => "Channel",
        }
    }

    fn text(self, registry: &ObjectRegistry, member_id: &str) -> String {
        let property = match self {
            Self::Id => return member_id.to_owned(),
            Self::Name => "name",
            Self::Address => "address",
            Self::Channel => "channel",
        };
        registry
            .get(member_id)
            .and_then(|object| {
                object
                    .borrow()
                    .core()
                    .property(property)
                    .map(|p| p.value().to_string())
            })
            .unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// Object List
// ----------------------------------------------------------------------------

/// Ordered membership of a family of objects, projected as a table.
pub struct ObjectList {
    core: ObjectCore,
    table_class_id: &'static str,
    columns: Vec<ListColumn>,
    members: Vec<String>,
    /// When set, the `add` method asks the server to append a new entry.
    addable: bool,
}

impl ObjectList {
    pub fn new(
        class_id: &'static str,
        table_class_id: &'static str,
        id: impl Into<String>,
        columns: Vec<ListColumn>,
    ) -> Self {
        Self {
            core: ObjectCore::new(class_id, id),
            table_class_id,
            columns,
            members: Vec::new(),
            addable: false,
        }
    }

    /// Expose an `add` method that creates a new entry.
    pub fn with_add_method(mut self) -> Self {
        self.core.add_method("add");
        self.addable = true;
        self
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn contains_member(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }

    pub fn add_member(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.contains_member(&id) {
            self.members.push(id);
        }
    }

    pub fn remove_member(&mut self, id: &str) -> bool {
        match self.members.iter().position(|m| m == id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }
}

impl Object for ObjectList {
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
        if name == "add" && self.addable {
            Ok(MethodOutcome::action(WorldAction::AddListEntry {
                list_id: self.core.id().to_owned(),
            }))
        } else if self.core.has_method(name) {
            Err(MethodError::Failed)
        } else {
            Err(MethodError::UnknownMethod)
        }
    }

    fn as_table(&self) -> Option<&dyn TableObject> {
        Some(self)
    }
}

impl TableObject for ObjectList {
    fn table_class_id(&self) -> &'static str {
        self.table_class_id
    }

    fn column_headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header().to_owned()).collect()
    }

    fn row_count(&self) -> u32 {
        self.members.len() as u32
    }

    fn cell_text(&self, registry: &ObjectRegistry, column: u32, row: u32) -> String {
        match (
            self.columns.get(column as usize),
            self.members.get(row as usize),
        ) {
            (Some(column), Some(member_id)) => column.text(registry, member_id),
            _ => String::new(),
        }
    }
}

/// Build a plain-data object: core only, default hooks.
pub struct DataObject {
    core: ObjectCore,
}

impl DataObject {
    pub fn new(core: ObjectCore) -> Self {
        Self { core }
    }
}

impl Object for DataObject {
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
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::object::new_object_ref;
    use traintastic_core::{PropertyFlags, Value};

    fn train(id: &str, name: &str) -> DataObject {
        let mut core = ObjectCore::new("train", id);
        core.add_property(
            "name",
            Value::from(name),
            PropertyFlags::READ_WRITE | PropertyFlags::STORE,
        );
        DataObject::new(core)
    }

    #[test]
    fn test_table_projection() {
        let mut registry = ObjectRegistry::new();
        registry.insert(new_object_ref(train("train_1", "NS 1200")));

        let mut list = ObjectList::new(
            "train_list",
            "train_list_table_model",
            "trains",
            vec![ListColumn::Id, ListColumn::Name],
        );
        list.add_member("train_1");

        assert_eq!(list.column_headers(), vec!["Id", "Name"]);
        assert_eq!(list.row_count(), 1);
        assert_eq!(list.cell_text(&registry, 0, 0), "train_1");
        assert_eq!(list.cell_text(&registry, 1, 0), "NS 1200");
        assert_eq!(list.cell_text(&registry, 2, 0), "");
    }

    #[test]
    fn test_membership_is_deduplicated() {
        let mut list = ObjectList::new("train_list", "train_list_table_model", "trains", vec![]);
        list.add_member("train_1");
        list.add_member("train_1");
        assert_eq!(list.members().len(), 1);
        assert!(list.remove_member("train_1"));
        assert!(!list.remove_member("train_1"));
    }
}
