//! Typed change notifications emitted by the document.
//!
//! Observers subscribe to structured `{block_id, property}` records instead
//! of matching on container paths, so a model can filter for exactly the
//! properties it cares about.

/// One structural change observed by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockChange {
    /// A top-level property of one block changed.
    Property { block_id: String, property: String },
    /// Coarse-grained change whose exact footprint is unknown: a remote
    /// update was merged or an undo/redo was applied. Treated as potentially
    /// touching every block and property.
    Refresh,
}

impl BlockChange {
    pub fn property(block_id: impl Into<String>, property: impl Into<String>) -> Self {
        BlockChange::Property {
            block_id: block_id.into(),
            property: property.into(),
        }
    }

    /// Whether this change may affect `property` of the block with `block_id`.
    pub fn touches(&self, block_id: &str, property: &str) -> bool {
        match self {
            BlockChange::Property {
                block_id: changed_block,
                property: changed_property,
            } => changed_block == block_id && changed_property == property,
            BlockChange::Refresh => true,
        }
    }
}

/// Synchronous in-process change observer, invoked once per committed
/// transaction with the full batch of changes.
pub type ChangeListener = Box<dyn Fn(&[BlockChange]) + Send + Sync>;
