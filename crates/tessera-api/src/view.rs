//! View definitions: a view is a named, typed presentation over a database
//! block's rows and columns.
//!
//! `ViewType` is a closed sum type. Adding a view type means adding a variant
//! here and an initializer entry in the engine's `ViewRegistry` — never
//! modifying the database model itself.

use serde::{Deserialize, Serialize};

/// Closed set of view type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Table,
}

impl ViewType {
    /// Every declared variant. The engine validates its view registry against
    /// this list at startup so a missing initializer fails loudly.
    pub const ALL: &'static [ViewType] = &[ViewType::Table];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Table => "table",
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-column layout state of a table view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableViewColumn {
    #[serde(rename = "columnId")]
    pub column_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default)]
    pub hide: bool,
}

impl TableViewColumn {
    pub fn new(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            width: None,
            hide: false,
        }
    }
}

/// Type-specific view state, tagged by the view's mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ViewMode {
    Table {
        columns: Vec<TableViewColumn>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filter: Option<serde_json::Value>,
    },
}

impl ViewMode {
    pub fn view_type(&self) -> ViewType {
        match self {
            ViewMode::Table { .. } => ViewType::Table,
        }
    }
}

/// One user-defined presentation over the database block's data.
///
/// Constructed only through the engine's view registry so every view carries
/// a unique caller-supplied id and a mode matching its type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewData {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub mode: ViewMode,
}

impl ViewData {
    pub fn view_type(&self) -> ViewType {
        self.mode.view_type()
    }
}

/// Partial view update, shallow-merged by `update_view`.
#[derive(Debug, Clone, Default)]
pub struct ViewPatch {
    pub name: Option<String>,
    pub mode: Option<ViewMode>,
}

impl ViewPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            mode: None,
        }
    }

    pub fn apply(self, view: &ViewData) -> ViewData {
        ViewData {
            id: view.id.clone(),
            name: self.name.unwrap_or_else(|| view.name.clone()),
            mode: self.mode.unwrap_or_else(|| view.mode.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_data_serializes_with_flat_mode_tag() {
        let view = ViewData {
            id: "v1".into(),
            name: "Table".into(),
            mode: ViewMode::Table {
                columns: vec![TableViewColumn::new("c1")],
                filter: None,
            },
        };
        let encoded = serde_json::to_value(&view).unwrap();
        assert_eq!(encoded["mode"], "table");
        assert_eq!(encoded["columns"][0]["columnId"], "c1");

        let decoded: ViewData = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, view);
    }

    #[test]
    fn view_patch_preserves_id() {
        let view = ViewData {
            id: "v1".into(),
            name: "Table".into(),
            mode: ViewMode::Table {
                columns: vec![],
                filter: None,
            },
        };
        let patched = ViewPatch::rename("Tasks").apply(&view);
        assert_eq!(patched.id, "v1");
        assert_eq!(patched.name, "Tasks");
        assert_eq!(patched.view_type(), ViewType::Table);
    }
}
