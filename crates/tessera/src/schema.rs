//! Block schema declarations and the registry that enforces them.
//!
//! A schema declares a block type's shape: its flavour tag, default property
//! values, its role in the tree and which flavours it may nest under or
//! contain. The registry is consulted by [`crate::doc::Document::add_block`]
//! before any block is materialized.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_api::ModelError;

/// Structural role a block plays in the document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    /// Container that aggregates other blocks (notes, database blocks).
    Hub,
    /// Leaf-ish content block (paragraphs, list items).
    Content,
}

/// Declaration of one block type.
pub struct BlockSchema {
    pub flavour: &'static str,
    pub role: BlockRole,
    pub version: u32,
    /// Flavours this block may be placed under. Empty means top-level only.
    pub parent_flavours: &'static [&'static str],
    /// Flavours allowed as direct children.
    pub child_flavours: &'static [&'static str],
    /// Per-flavour default property values, materialized at block creation.
    defaults: fn() -> serde_json::Map<String, serde_json::Value>,
}

impl BlockSchema {
    pub fn defaults(&self) -> serde_json::Map<String, serde_json::Value> {
        (self.defaults)()
    }

    /// Whether `key` is a schema-declared property of this flavour.
    pub fn has_property(&self, key: &str) -> bool {
        self.defaults().contains_key(key)
    }
}

fn empty_defaults() -> serde_json::Map<String, serde_json::Value> {
    serde_json::Map::new()
}

fn paragraph_defaults() -> serde_json::Map<String, serde_json::Value> {
    let mut props = serde_json::Map::new();
    props.insert("text".to_string(), serde_json::Value::String(String::new()));
    props
}

fn database_defaults() -> serde_json::Map<String, serde_json::Value> {
    let mut props = serde_json::Map::new();
    props.insert("views".to_string(), serde_json::json!([]));
    props.insert("columns".to_string(), serde_json::json!([]));
    props.insert("cells".to_string(), serde_json::json!({}));
    props
}

/// Registry of block schemas, keyed by flavour.
#[derive(Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, Arc<BlockSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// The built-in flavours: `note`, `paragraph`, `list`, `database`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for schema in [
            BlockSchema {
                flavour: "note",
                role: BlockRole::Hub,
                version: 1,
                parent_flavours: &[],
                child_flavours: &["paragraph", "list", "database"],
                defaults: empty_defaults,
            },
            BlockSchema {
                flavour: "paragraph",
                role: BlockRole::Content,
                version: 1,
                parent_flavours: &["note", "paragraph", "list", "database"],
                child_flavours: &["paragraph", "list"],
                defaults: paragraph_defaults,
            },
            BlockSchema {
                flavour: "list",
                role: BlockRole::Content,
                version: 1,
                parent_flavours: &["note", "paragraph", "list", "database"],
                child_flavours: &["paragraph", "list"],
                defaults: paragraph_defaults,
            },
            BlockSchema {
                flavour: "database",
                role: BlockRole::Hub,
                version: 2,
                parent_flavours: &["note"],
                child_flavours: &["paragraph", "list"],
                defaults: database_defaults,
            },
        ] {
            // Built-in flavours are distinct by construction.
            registry
                .register(schema)
                .expect("built-in schema flavours must be unique");
        }
        registry
    }

    pub fn register(&mut self, schema: BlockSchema) -> Result<(), ModelError> {
        if self.schemas.contains_key(schema.flavour) {
            return Err(ModelError::DuplicateFlavour {
                flavour: schema.flavour.to_string(),
            });
        }
        self.schemas.insert(schema.flavour, Arc::new(schema));
        Ok(())
    }

    pub fn get(&self, flavour: &str) -> Result<Arc<BlockSchema>, ModelError> {
        self.schemas
            .get(flavour)
            .cloned()
            .ok_or_else(|| ModelError::UnknownFlavour {
                flavour: flavour.to_string(),
            })
    }

    /// Validate that a block of `child` flavour may be placed under a block
    /// of `parent` flavour.
    pub fn validate_placement(&self, child: &str, parent: &str) -> Result<(), ModelError> {
        let child_schema = self.get(child)?;
        let parent_schema = self.get(parent)?;

        let child_accepts = child_schema.parent_flavours.contains(&parent);
        let parent_accepts = parent_schema.child_flavours.contains(&child);
        if child_accepts && parent_accepts {
            Ok(())
        } else {
            Err(ModelError::InvalidParent {
                child: child.to_string(),
                parent: parent.to_string(),
            })
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_knows_database_flavour() {
        let registry = SchemaRegistry::builtin();
        let schema = registry.get("database").unwrap();
        assert_eq!(schema.role, BlockRole::Hub);
        assert_eq!(schema.version, 2);
        assert!(schema.has_property("columns"));
        assert!(schema.has_property("cells"));
        assert!(schema.has_property("views"));
    }

    #[test]
    fn duplicate_flavour_is_rejected() {
        let mut registry = SchemaRegistry::builtin();
        let err = registry
            .register(BlockSchema {
                flavour: "database",
                role: BlockRole::Hub,
                version: 1,
                parent_flavours: &[],
                child_flavours: &[],
                defaults: empty_defaults,
            })
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateFlavour { .. }));
    }

    #[test]
    fn database_only_nests_under_note() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.validate_placement("database", "note").is_ok());
        assert!(matches!(
            registry.validate_placement("database", "paragraph"),
            Err(ModelError::InvalidParent { .. })
        ));
    }

    #[test]
    fn unknown_flavour_is_an_error() {
        let registry = SchemaRegistry::builtin();
        assert!(matches!(
            registry.get("whiteboard"),
            Err(ModelError::UnknownFlavour { .. })
        ));
    }
}
