//! Table models
//!
//! A table model is a windowed projection of a list-like object. The list
//! object implements [`TableObject`]; the per-session window (handle, region,
//! last pushed row count) lives with the session. Cells outside the
//! subscribed region are never materialised.

use traintastic_core::{Handle, Message};

use crate::core::registry::ObjectRegistry;

// ----------------------------------------------------------------------------
// Table Object
// ----------------------------------------------------------------------------

/// A list-like object that can be projected as a table.
pub trait TableObject {
    /// Class id reported for table models of this object.
    fn table_class_id(&self) -> &'static str;

    fn column_headers(&self) -> Vec<String>;

    fn row_count(&self) -> u32;

    /// Text of one cell; resolves member objects through the registry.
    fn cell_text(&self, registry: &ObjectRegistry, column: u32, row: u32) -> String;
}

// ----------------------------------------------------------------------------
// Region
// ----------------------------------------------------------------------------

/// Inclusive cell region subscribed by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRegion {
    pub column_min: u32,
    pub column_max: u32,
    pub row_min: u32,
    pub row_max: u32,
}

impl TableRegion {
    /// Intersect with the table's current dimensions; `None` when nothing of
    /// the region is left.
    pub fn clamped(self, column_count: u32, row_count: u32) -> Option<Self> {
        if column_count == 0 || row_count == 0 {
            return None;
        }
        let clamped = Self {
            column_min: self.column_min,
            column_max: self.column_max.min(column_count - 1),
            row_min: self.row_min,
            row_max: self.row_max.min(row_count - 1),
        };
        (clamped.column_min <= clamped.column_max && clamped.row_min <= clamped.row_max)
            .then_some(clamped)
    }
}

// ----------------------------------------------------------------------------
// Window
// ----------------------------------------------------------------------------

/// Per-session state of one leased table model.
#[derive(Debug, Clone)]
pub struct TableWindow {
    pub object_id: String,
    pub region: Option<TableRegion>,
    /// Row count last pushed to the client, to suppress no-op updates.
    pub last_row_count: u32,
}

impl TableWindow {
    pub fn new(object_id: String, row_count: u32) -> Self {
        Self {
            object_id,
            region: None,
            last_row_count: row_count,
        }
    }
}

/// Append the cells of `region` to an update-region event, row-major.
pub fn write_region_cells(
    message: &mut Message,
    handle: Handle,
    table: &dyn TableObject,
    registry: &ObjectRegistry,
    region: TableRegion,
) {
    message.write_u32(handle.value());
    message.write_u32(region.column_min);
    message.write_u32(region.column_max);
    message.write_u32(region.row_min);
    message.write_u32(region.row_max);
    for row in region.row_min..=region.row_max {
        for column in region.column_min..=region.column_max {
            message.write_string(&table.cell_text(registry, column, row));
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
    fn test_region_clamp_within_bounds() {
        let region = TableRegion {
            column_min: 0,
            column_max: 1,
            row_min: 0,
            row_max: 2,
        };
        assert_eq!(region.clamped(2, 3), Some(region));
    }

    #[test]
    fn test_region_clamp_truncates_rows() {
        let region = TableRegion {
            column_min: 0,
            column_max: 5,
            row_min: 0,
            row_max: 9,
        };
        let clamped = region.clamped(2, 3).unwrap();
        assert_eq!(clamped.column_max, 1);
        assert_eq!(clamped.row_max, 2);
    }

    #[test]
    fn test_region_clamp_empty_table() {
        let region = TableRegion {
            column_min: 0,
            column_max: 1,
            row_min: 0,
            row_max: 1,
        };
        assert_eq!(region.clamped(2, 0), None);
    }

    #[test]
    fn test_region_clamp_fully_outside() {
        let region = TableRegion {
            column_min: 0,
            column_max: 1,
            row_min: 5,
            row_max: 9,
        };
        assert_eq!(region.clamped(2, 3), None);
    }
}
