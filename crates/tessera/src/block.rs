//! Generic block model: a typed handle over one block in the document tree.

use std::sync::Arc;

use tracing::debug;

use crate::doc::Document;
use crate::schema::BlockSchema;
use tessera_api::ModelError;

/// A block node: an id, a flavour and schema-defined properties, backed by
/// the owning document. Created only by [`Document::add_block`]; a model
/// never exists without a containing document.
pub struct BlockModel {
    doc: Arc<Document>,
    id: String,
    schema: Arc<BlockSchema>,
}

impl std::fmt::Debug for BlockModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockModel")
            .field("id", &self.id)
            .field("flavour", &self.schema.flavour)
            .finish_non_exhaustive()
    }
}

impl BlockModel {
    pub(crate) fn new(doc: Arc<Document>, id: String, schema: Arc<BlockSchema>) -> Self {
        Self { doc, id, schema }
    }

    /// Re-attach a model to an existing block, e.g. after deserializing a
    /// document from a snapshot. Fails if the block is missing or its stored
    /// flavour does not match the requested one.
    pub fn attach(doc: Arc<Document>, block_id: &str, flavour: &str) -> Result<Self, ModelError> {
        let actual = doc.block_flavour(block_id)?;
        if actual != flavour {
            return Err(ModelError::FlavourMismatch {
                expected: flavour.to_string(),
                actual,
            });
        }
        let schema = doc.schemas().get(flavour)?;
        Ok(Self::new(doc, block_id.to_string(), schema))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flavour(&self) -> &str {
        self.schema.flavour
    }

    pub fn schema(&self) -> &BlockSchema {
        &self.schema
    }

    pub fn doc(&self) -> &Arc<Document> {
        &self.doc
    }

    /// Read one schema-declared property.
    pub fn property(&self, key: &str) -> Result<Option<serde_json::Value>, ModelError> {
        self.doc.get_prop_json(&self.id, key)
    }

    /// Read all schema-declared properties of this block.
    pub fn properties(&self) -> Result<serde_json::Map<String, serde_json::Value>, ModelError> {
        let mut props = serde_json::Map::new();
        for key in self.schema.defaults().keys() {
            if let Some(value) = self.doc.get_prop_json(&self.id, key)? {
                props.insert(key.clone(), value);
            }
        }
        Ok(props)
    }

    /// Update properties through a schema-validated, transactional write.
    /// Keys the schema does not declare are rejected before anything is
    /// written.
    pub fn update_properties(
        &self,
        partial: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ModelError> {
        for key in partial.keys() {
            if !self.schema.has_property(key) {
                return Err(ModelError::UnknownFlavourProperty {
                    flavour: self.schema.flavour.to_string(),
                    property: key.clone(),
                });
            }
        }
        debug!(
            "updating {} propert(ies) on block {}",
            partial.len(),
            self.id
        );
        self.doc.transact(|tx| {
            for (key, value) in partial {
                tx.set_json(&self.id, key, value)?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use anyhow::Result;
    use serde_json::json;

    fn paragraph() -> Result<BlockModel> {
        let doc = Arc::new(Document::new("test-doc", SchemaRegistry::builtin())?);
        let note = doc.add_block("note", None)?;
        Ok(doc.add_block("paragraph", Some(note.id()))?)
    }

    #[test]
    fn properties_start_at_schema_defaults() -> Result<()> {
        let block = paragraph()?;
        let props = block.properties()?;
        assert_eq!(props.get("text"), Some(&json!("")));
        Ok(())
    }

    #[test]
    fn update_properties_round_trips() -> Result<()> {
        let block = paragraph()?;
        let mut partial = serde_json::Map::new();
        partial.insert("text".to_string(), json!("hello"));
        block.update_properties(&partial)?;
        assert_eq!(block.property("text")?, Some(json!("hello")));
        Ok(())
    }

    #[test]
    fn undeclared_property_is_rejected_before_writing() -> Result<()> {
        let block = paragraph()?;
        let mut partial = serde_json::Map::new();
        partial.insert("text".to_string(), json!("changed"));
        partial.insert("bogus".to_string(), json!(1));
        assert!(block.update_properties(&partial).is_err());

        // Nothing was written, including the valid key.
        assert_eq!(block.property("text")?, Some(json!("")));
        Ok(())
    }

    #[test]
    fn attach_validates_flavour() -> Result<()> {
        let block = paragraph()?;
        let doc = block.doc().clone();
        let id = block.id().to_string();

        assert!(BlockModel::attach(doc.clone(), &id, "paragraph").is_ok());
        assert!(matches!(
            BlockModel::attach(doc, &id, "database"),
            Err(ModelError::FlavourMismatch { .. })
        ));
        Ok(())
    }
}
