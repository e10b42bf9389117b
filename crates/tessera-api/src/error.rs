//! Error taxonomy for the block-document engine.
//!
//! Most lookup misses are deliberately *not* errors: deleting an unknown view
//! or column is a silent no-op, and re-adding an existing column id is an
//! idempotent success. The variants here cover the failures that must be
//! surfaced rather than swallowed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    /// `update_cells` was called for a row that has no entry in the cell
    /// storage. Unlike `update_cell`, that operation does not lazily create
    /// rows; callers must initialize the row first.
    #[error("row '{row_id}' is not initialized in cell storage")]
    RowNotInitialized { row_id: String },

    #[error("no schema registered for flavour '{flavour}'")]
    UnknownFlavour { flavour: String },

    #[error("a schema for flavour '{flavour}' is already registered")]
    DuplicateFlavour { flavour: String },

    #[error("flavour '{child}' cannot be placed under flavour '{parent}'")]
    InvalidParent { child: String, parent: String },

    #[error("flavour '{flavour}' declares no property '{property}'")]
    UnknownFlavourProperty { flavour: String, property: String },

    #[error("expected a block of flavour '{expected}', found '{actual}'")]
    FlavourMismatch { expected: String, actual: String },

    #[error("block not found: {id}")]
    BlockNotFound { id: String },

    #[error("no view initializer registered for view type '{view_type}'")]
    ViewTypeNotRegistered { view_type: String },

    #[error("view initializer for '{expected}' produced state tagged '{actual}'")]
    ViewTypeMismatch { expected: String, actual: String },

    #[error("CRDT operation failed: {0}")]
    Crdt(String),

    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}
