//! Table-structure primitives of the database block: columns, cells and the
//! persisted property shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::view::ViewData;

/// Column type tag of the synthetic title column.
pub const TITLE_COLUMN_TYPE: &str = "title";

/// Default display name for a fresh database block.
pub const DEFAULT_TITLE: &str = "Database";

/// A column of a database block.
///
/// `data` is a type-specific configuration blob (e.g. select options); the
/// engine copies it verbatim and never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Unique within the owning block's column sequence.
    pub id: String,
    /// Type tag selecting the column behavior variant ("title", "select", ...).
    #[serde(rename = "type")]
    pub column_type: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Column {
    /// The synthetic title column for a database block. Its id is always the
    /// owning block's own id and it sits at logical position 0.
    pub fn title(block_id: impl Into<String>) -> Self {
        Self {
            id: block_id.into(),
            column_type: TITLE_COLUMN_TYPE.to_string(),
            name: "Title".to_string(),
            data: serde_json::Map::new(),
        }
    }

    pub fn is_title(&self) -> bool {
        self.column_type == TITLE_COLUMN_TYPE
    }
}

/// A column supplied to `add_column`, before an id has been assigned.
///
/// When `id` is supplied and already present among the block's columns the
/// add is an idempotent no-op returning that id.
#[derive(Debug, Clone, Default)]
pub struct ColumnInit {
    pub id: Option<String>,
    pub column_type: String,
    pub name: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ColumnInit {
    pub fn new(column_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            column_type: column_type.into(),
            name: name.into(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn into_column(self, id: String) -> Column {
        Column {
            id,
            column_type: self.column_type,
            name: self.name,
            data: self.data,
        }
    }
}

/// Partial column update, shallow-merged into the existing column by
/// `update_column`. Absent fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ColumnPatch {
    pub name: Option<String>,
    pub column_type: Option<String>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ColumnPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Apply this patch on top of `column`, returning the merged column.
    pub fn apply(self, column: &Column) -> Column {
        Column {
            id: column.id.clone(),
            column_type: self.column_type.unwrap_or_else(|| column.column_type.clone()),
            name: self.name.unwrap_or_else(|| column.name.clone()),
            data: self.data.unwrap_or_else(|| column.data.clone()),
        }
    }
}

/// A single cell value. `value` is an opaque payload whose shape is governed
/// by the column's type; the engine copies it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(rename = "columnId")]
    pub column_id: String,
    pub value: serde_json::Value,
}

impl Cell {
    pub fn new(column_id: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            column_id: column_id.into(),
            value: value.into(),
        }
    }
}

/// Persisted cell storage: row id → column id → cell.
///
/// A missing row entry means "no cells yet", not an error. Entries under a
/// deleted column id are orphans and must be tolerated by readers.
pub type SerializedCells = HashMap<String, HashMap<String, Cell>>;

/// The document-serialized shape of a database block's properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseProps {
    pub title: String,
    pub views: Vec<ViewData>,
    pub columns: Vec<Column>,
    pub cells: SerializedCells,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn title_column_shape() {
        let col = Column::title("db-1");
        assert_eq!(col.id, "db-1");
        assert_eq!(col.column_type, TITLE_COLUMN_TYPE);
        assert!(col.is_title());
    }

    #[test]
    fn column_patch_keeps_unpatched_fields() {
        let col = Column {
            id: "c1".into(),
            column_type: "select".into(),
            name: "Status".into(),
            data: serde_json::Map::new(),
        };
        let merged = ColumnPatch::rename("State").apply(&col);
        assert_eq!(merged.name, "State");
        assert_eq!(merged.column_type, "select");
        assert_eq!(merged.id, "c1");
    }

    #[test]
    fn cell_serde_uses_camel_case_column_id() {
        let cell = Cell::new("c1", json!(5));
        let encoded = serde_json::to_value(&cell).unwrap();
        assert_eq!(encoded, json!({"columnId": "c1", "value": 5}));
    }
}
