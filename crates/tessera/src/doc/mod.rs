//! The shared document: a Loro-backed page object that owns block lifecycle
//! and is the sole execution context for structural mutation.
//!
//! Storage model (normalized, shared by all block models):
//! - root `LoroMap` `blocks_by_id`: block id → block `LoroMap`
//! - block map: `flavour`, `parent_id`, `created_at`, `updated_at` as LWW
//!   values; schema-declared properties as JSON strings; rich-text fields as
//!   `LoroText` sub-containers updated via Myers-diff.
//!
//! Every mutating operation runs through [`Document::transact`]: the closure
//! applies its edits, the Loro doc commits once, and exactly one batch of
//! [`BlockChange`] notifications fires afterwards.

mod change;

pub use change::{BlockChange, ChangeListener};

use std::sync::{Arc, Mutex};

use loro::{LoroDoc, LoroMap, LoroText, PeerID, UndoManager};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::block::BlockModel;
use crate::schema::SchemaRegistry;
use tessera_api::ModelError;

/// Root container holding all block maps, keyed by block id.
const BLOCKS_BY_ID: &str = "blocks_by_id";

/// Sentinel parent id for top-level blocks.
pub const NO_PARENT_ID: &str = "__no_parent__";

// Block map metadata keys.
const KEY_FLAVOUR: &str = "flavour";
const KEY_PARENT_ID: &str = "parent_id";
const KEY_CREATED_AT: &str = "created_at";
const KEY_UPDATED_AT: &str = "updated_at";

fn crdt_err(e: impl std::fmt::Display) -> ModelError {
    ModelError::Crdt(e.to_string())
}

/// Look up the nested map for one block, or fail with `BlockNotFound`.
fn block_map(doc: &LoroDoc, block_id: &str) -> Result<LoroMap, ModelError> {
    let blocks = doc.get_map(BLOCKS_BY_ID);
    match blocks.get(block_id) {
        Some(loro::ValueOrContainer::Container(loro::Container::Map(map))) => Ok(map),
        _ => Err(ModelError::BlockNotFound {
            id: block_id.to_string(),
        }),
    }
}

/// Read a JSON-encoded property from a block map. Absent keys yield `None`.
fn read_json<T: DeserializeOwned>(
    doc: &LoroDoc,
    block_id: &str,
    property: &str,
) -> Result<Option<T>, ModelError> {
    let map = block_map(doc, block_id)?;
    match map.get(property) {
        Some(loro::ValueOrContainer::Value(value)) => match value.as_string() {
            Some(encoded) => Ok(Some(serde_json::from_str(encoded.as_ref())?)),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn read_string(doc: &LoroDoc, block_id: &str, key: &str) -> Result<Option<String>, ModelError> {
    let map = block_map(doc, block_id)?;
    match map.get(key) {
        Some(loro::ValueOrContainer::Value(value)) => {
            Ok(value.as_string().map(|s| s.to_string()))
        }
        _ => Ok(None),
    }
}

/// Read a rich-text field. Missing containers read as the empty string.
fn read_text(doc: &LoroDoc, block_id: &str, key: &str) -> Result<String, ModelError> {
    let map = block_map(doc, block_id)?;
    match map.get(key) {
        Some(loro::ValueOrContainer::Container(loro::Container::Text(text))) => {
            Ok(text.to_string())
        }
        _ => Ok(String::new()),
    }
}

fn has_key(doc: &LoroDoc, block_id: &str, key: &str) -> Result<bool, ModelError> {
    Ok(block_map(doc, block_id)?.get(key).is_some())
}

/// Mutation context handed to [`Document::transact`] closures.
///
/// Records which `{block, property}` pairs were touched; the document fires
/// them as one batch after the commit. Validation should precede any write:
/// a closure that errors out must not have mutated the document.
pub struct TransactionCtx<'a> {
    doc: &'a LoroDoc,
    changes: RefCell<Vec<BlockChange>>,
}

impl TransactionCtx<'_> {
    /// Write a property as a JSON string and record the change.
    pub fn set_json(
        &self,
        block_id: &str,
        property: &str,
        value: &impl Serialize,
    ) -> Result<(), ModelError> {
        let map = block_map(self.doc, block_id)?;
        let encoded = serde_json::to_string(value)?;
        map.insert(property, loro::LoroValue::from(encoded.as_str()))
            .map_err(crdt_err)?;
        self.record(block_id, property);
        Ok(())
    }

    /// Read a JSON-encoded property inside the transaction.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        block_id: &str,
        property: &str,
    ) -> Result<Option<T>, ModelError> {
        read_json(self.doc, block_id, property)
    }

    /// Update a rich-text field via CRDT diff, so concurrent edits merge at
    /// character granularity instead of overwriting.
    pub fn set_text(&self, block_id: &str, key: &str, text: &str) -> Result<(), ModelError> {
        let map = block_map(self.doc, block_id)?;
        let container = map
            .get_or_create_container(key, LoroText::new())
            .map_err(crdt_err)?;
        container
            .update(text, Default::default())
            .map_err(|e| ModelError::Crdt(format!("text update failed: {e:?}")))?;
        self.record(block_id, key);
        Ok(())
    }

    /// Record a change without writing, for callers that mutate containers
    /// directly.
    pub fn record(&self, block_id: &str, property: &str) {
        self.changes
            .borrow_mut()
            .push(BlockChange::property(block_id, property));
    }

    fn create_block_map(&self, block_id: &str) -> Result<LoroMap, ModelError> {
        let blocks = self.doc.get_map(BLOCKS_BY_ID);
        blocks
            .get_or_create_container(block_id, LoroMap::new())
            .map_err(crdt_err)
    }
}

/// The shared page object.
///
/// Owns the Loro document, the undo checkpoint boundary, the schema registry
/// and the change-notification fan-out. Models hold an `Arc<Document>` and
/// never touch the CRDT directly.
pub struct Document {
    doc_id: String,
    peer_id: PeerID,
    doc: Mutex<LoroDoc>,
    undo: Mutex<UndoManager>,
    schemas: SchemaRegistry,
    change_tx: broadcast::Sender<Vec<BlockChange>>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, schemas: SchemaRegistry) -> Result<Self, ModelError> {
        let doc_id = doc_id.into();
        let peer_id = rand::random::<u64>();
        let doc = LoroDoc::new();
        doc.set_peer_id(peer_id).map_err(crdt_err)?;
        let undo = UndoManager::new(&doc);

        info!("created document '{}' with peer_id {}", doc_id, peer_id);

        let (change_tx, _) = broadcast::channel(64);
        Ok(Self {
            doc_id,
            peer_id,
            doc: Mutex::new(doc),
            undo: Mutex::new(undo),
            schemas,
            change_tx,
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Rebuild a document from an exported snapshot.
    pub fn from_snapshot(
        doc_id: impl Into<String>,
        schemas: SchemaRegistry,
        snapshot: &[u8],
    ) -> Result<Self, ModelError> {
        let document = Self::new(doc_id, schemas)?;
        {
            let doc = document.doc.lock().unwrap();
            doc.import(snapshot).map_err(crdt_err)?;
        }
        Ok(document)
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn peer_id(&self) -> PeerID {
        self.peer_id
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Generate a globally unique block/view id.
    pub fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Run `f` as one atomic batch: all edits commit together and observers
    /// see exactly one batch of change notifications afterwards.
    pub fn transact<F, R>(&self, f: F) -> Result<R, ModelError>
    where
        F: FnOnce(&TransactionCtx) -> Result<R, ModelError>,
    {
        let changes;
        let result;
        {
            let doc = self.doc.lock().unwrap();
            let ctx = TransactionCtx {
                doc: &doc,
                changes: RefCell::new(Vec::new()),
            };
            result = f(&ctx)?;
            doc.commit();
            changes = ctx.changes.into_inner();
        }
        if !changes.is_empty() {
            debug!("transaction committed with {} change(s)", changes.len());
            self.publish(changes);
        }
        Ok(result)
    }

    /// Undo checkpoint: seals whatever came before into its own undo step so
    /// the next transaction is undoable as a discrete user-visible action.
    pub fn capture_sync(&self) {
        self.doc.lock().unwrap().commit();
        let mut undo = self.undo.lock().unwrap();
        if let Err(e) = undo.record_new_checkpoint() {
            warn!("failed to record undo checkpoint: {}", e);
        }
    }

    /// Undo the latest checkpointed step. Returns whether anything applied.
    pub fn undo(&self) -> Result<bool, ModelError> {
        let applied = self.undo.lock().unwrap().undo().map_err(crdt_err)?;
        if applied {
            self.publish(vec![BlockChange::Refresh]);
        }
        Ok(applied)
    }

    pub fn redo(&self) -> Result<bool, ModelError> {
        let applied = self.undo.lock().unwrap().redo().map_err(crdt_err)?;
        if applied {
            self.publish(vec![BlockChange::Refresh]);
        }
        Ok(applied)
    }

    /// Insert a new block of `flavour` into the tree, materializing its
    /// schema defaults. Placement is validated against the schema registry.
    pub fn add_block(
        self: &Arc<Self>,
        flavour: &str,
        parent_id: Option<&str>,
    ) -> Result<BlockModel, ModelError> {
        let schema = self.schemas.get(flavour)?;
        if let Some(parent) = parent_id {
            let parent_flavour = self.block_flavour(parent)?;
            self.schemas.validate_placement(flavour, &parent_flavour)?;
        }

        let id = self.generate_id();
        let now = chrono::Utc::now().timestamp_millis();
        let defaults = schema.defaults();

        self.transact(|tx| {
            let map = tx.create_block_map(&id)?;
            map.insert(KEY_FLAVOUR, loro::LoroValue::from(flavour))
                .map_err(crdt_err)?;
            map.insert(
                KEY_PARENT_ID,
                loro::LoroValue::from(parent_id.unwrap_or(NO_PARENT_ID)),
            )
            .map_err(crdt_err)?;
            map.insert(KEY_CREATED_AT, loro::LoroValue::from(now))
                .map_err(crdt_err)?;
            map.insert(KEY_UPDATED_AT, loro::LoroValue::from(now))
                .map_err(crdt_err)?;
            for (key, value) in &defaults {
                tx.set_json(&id, key, value)?;
            }
            Ok(())
        })?;

        debug!("added block {} (flavour '{}')", id, flavour);
        Ok(BlockModel::new(Arc::clone(self), id, schema))
    }

    /// Remove a block from the tree. Unknown ids are a silent no-op.
    pub fn delete_block(&self, block_id: &str) -> Result<(), ModelError> {
        self.transact(|tx| {
            let blocks = tx.doc.get_map(BLOCKS_BY_ID);
            if blocks.get(block_id).is_none() {
                return Ok(());
            }
            blocks.delete(block_id).map_err(crdt_err)?;
            tx.record(block_id, "deleted");
            Ok(())
        })
    }

    /// Explicit re-publish of one top-level property. Used when a property
    /// was replaced wholesale (not edited in place) and observers must be
    /// told the top-level value changed.
    pub fn update_block(
        &self,
        block_id: &str,
        property: &str,
        value: &impl Serialize,
    ) -> Result<(), ModelError> {
        self.transact(|tx| tx.set_json(block_id, property, value))
    }

    /// Merge an update produced by a remote peer. Observers receive a
    /// coarse-grained refresh since the update's footprint is not re-derived.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), ModelError> {
        {
            let doc = self.doc.lock().unwrap();
            doc.import(update).map_err(crdt_err)?;
        }
        debug!("applied remote update of {} bytes", update.len());
        self.publish(vec![BlockChange::Refresh]);
        Ok(())
    }

    /// Export every local update (for shipping to a remote peer).
    pub fn export_updates(&self) -> Result<Vec<u8>, ModelError> {
        let doc = self.doc.lock().unwrap();
        doc.export(loro::ExportMode::updates_owned(Default::default()))
            .map_err(crdt_err)
    }

    pub fn export_snapshot(&self) -> Result<Vec<u8>, ModelError> {
        let doc = self.doc.lock().unwrap();
        doc.export(loro::ExportMode::Snapshot).map_err(crdt_err)
    }

    pub fn contains_block(&self, block_id: &str) -> bool {
        let doc = self.doc.lock().unwrap();
        doc.get_map(BLOCKS_BY_ID).get(block_id).is_some()
    }

    pub fn block_flavour(&self, block_id: &str) -> Result<String, ModelError> {
        let doc = self.doc.lock().unwrap();
        read_string(&doc, block_id, KEY_FLAVOUR)?.ok_or_else(|| ModelError::BlockNotFound {
            id: block_id.to_string(),
        })
    }

    /// Read a JSON-encoded property outside any transaction.
    pub fn get_prop_json<T: DeserializeOwned>(
        &self,
        block_id: &str,
        property: &str,
    ) -> Result<Option<T>, ModelError> {
        let doc = self.doc.lock().unwrap();
        read_json(&doc, block_id, property)
    }

    /// Read a rich-text field. Missing containers read as empty.
    pub fn get_text(&self, block_id: &str, key: &str) -> Result<String, ModelError> {
        let doc = self.doc.lock().unwrap();
        read_text(&doc, block_id, key)
    }

    pub(crate) fn has_prop(&self, block_id: &str, key: &str) -> Result<bool, ModelError> {
        let doc = self.doc.lock().unwrap();
        has_key(&doc, block_id, key)
    }

    /// Subscribe to change batches on an async channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<BlockChange>> {
        self.change_tx.subscribe()
    }

    /// Register a synchronous listener invoked inline after each commit.
    pub fn add_listener(&self, listener: ChangeListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn publish(&self, changes: Vec<BlockChange>) {
        {
            let listeners = self.listeners.lock().unwrap();
            for listener in listeners.iter() {
                listener(&changes);
            }
        }
        // Send failures just mean nobody is subscribed.
        let _ = self.change_tx.send(changes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use anyhow::Result;

    fn doc() -> Result<Arc<Document>> {
        Ok(Arc::new(Document::new(
            "test-doc",
            SchemaRegistry::builtin(),
        )?))
    }

    #[test]
    fn add_block_materializes_schema_defaults() -> Result<()> {
        let doc = doc()?;
        let note = doc.add_block("note", None)?;
        let db = doc.add_block("database", Some(note.id()))?;

        assert_eq!(doc.block_flavour(db.id())?, "database");
        let columns: Option<Vec<tessera_api::Column>> = doc.get_prop_json(db.id(), "columns")?;
        assert_eq!(columns, Some(vec![]));
        Ok(())
    }

    #[test]
    fn invalid_placement_is_rejected() -> Result<()> {
        let doc = doc()?;
        let note = doc.add_block("note", None)?;
        let paragraph = doc.add_block("paragraph", Some(note.id()))?;

        let err = doc
            .add_block("database", Some(paragraph.id()))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParent { .. }));
        Ok(())
    }

    #[test]
    fn delete_block_removes_it_and_tolerates_unknown_ids() -> Result<()> {
        let doc = doc()?;
        let note = doc.add_block("note", None)?;
        assert!(doc.contains_block(note.id()));

        doc.delete_block(note.id())?;
        assert!(!doc.contains_block(note.id()));

        doc.delete_block("nonexistent")?;
        Ok(())
    }

    #[test]
    fn transact_fires_one_batch_per_commit() -> Result<()> {
        let doc = doc()?;
        let note = doc.add_block("note", None)?;
        let mut rx = doc.subscribe();

        doc.transact(|tx| {
            tx.set_json(note.id(), "a", &1)?;
            tx.set_json(note.id(), "b", &2)?;
            Ok(())
        })?;

        let batch = rx.try_recv()?;
        assert_eq!(batch.len(), 2);
        assert!(rx.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn remote_update_round_trips_between_documents() -> Result<()> {
        let doc_a = doc()?;
        let note = doc_a.add_block("note", None)?;
        let update = doc_a.export_updates()?;

        let doc_b = doc()?;
        let mut rx = doc_b.subscribe();
        doc_b.apply_update(&update)?;

        assert!(doc_b.contains_block(note.id()));
        assert_eq!(rx.try_recv()?, vec![BlockChange::Refresh]);
        Ok(())
    }

    #[test]
    fn text_fields_merge_via_crdt_update() -> Result<()> {
        let doc = doc()?;
        let note = doc.add_block("note", None)?;

        doc.transact(|tx| tx.set_text(note.id(), "title", "Hello"))?;
        doc.transact(|tx| tx.set_text(note.id(), "title", "Hello world"))?;
        assert_eq!(doc.get_text(note.id(), "title")?, "Hello world");
        Ok(())
    }

    #[test]
    fn snapshot_restores_blocks() -> Result<()> {
        let doc_a = doc()?;
        let note = doc_a.add_block("note", None)?;
        let snapshot = doc_a.export_snapshot()?;

        let doc_b = Document::from_snapshot("copy", SchemaRegistry::builtin(), &snapshot)?;
        assert!(doc_b.contains_block(note.id()));
        Ok(())
    }
}
