//! The database block model: a schema-governed, CRDT-synchronized table of
//! rows, columns, cells and views with transactional mutation and
//! event-driven recomputation.
//!
//! The model exclusively owns its `columns`/`cells`/`views` payload; the
//! document owns its lifecycle and is the sole execution context for
//! structural mutation. Every mutating operation opens its own document
//! transaction, so observers only ever see committed states and each commit
//! fires one batch of change notifications.

mod views;

pub use views::{ViewInit, ViewRegistry};

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::debug;

use crate::block::BlockModel;
use crate::doc::Document;
use tessera_api::database::DEFAULT_TITLE;
use tessera_api::{
    Cell, Column, ColumnInit, ColumnPatch, DatabaseProps, InsertPosition, ModelError,
    SerializedCells, ViewData, ViewPatch, ViewType, insert_position_to_index,
};

pub const DATABASE_FLAVOUR: &str = "database";

// Top-level property names of a database block.
const PROP_TITLE: &str = "title";
const PROP_COLUMNS: &str = "columns";
const PROP_CELLS: &str = "cells";
const PROP_VIEWS: &str = "views";

/// Column id of the synthetic title cell returned by [`get_cell`].
///
/// The title column's value is always derived from row identity, never
/// stored.
///
/// [`get_cell`]: DatabaseBlockModel::get_cell
const TITLE_CELL_ID: &str = "title";

pub struct DatabaseBlockModel {
    block: BlockModel,
    views: ViewRegistry,
    props_tx: broadcast::Sender<()>,
}

impl DatabaseBlockModel {
    /// Materialize the model over an existing database block.
    ///
    /// Runs the one-time initialization regardless of construction path
    /// (fresh or deserialized):
    /// 1. subscribes to the document's change stream, filtered to this
    ///    block's `columns` and `cells` properties, and re-emits the model's
    ///    properties-changed signal on a match — so edits made indirectly
    ///    (e.g. a remote collaborator's merge) still trigger recomputation;
    /// 2. ensures the synthetic title column exists at position 0;
    /// 3. ensures at least one view exists (default: table).
    pub fn attach(block: BlockModel, views: ViewRegistry) -> Result<Self, ModelError> {
        if block.flavour() != DATABASE_FLAVOUR {
            return Err(ModelError::FlavourMismatch {
                expected: DATABASE_FLAVOUR.to_string(),
                actual: block.flavour().to_string(),
            });
        }
        views.validate()?;

        let (props_tx, _) = broadcast::channel(16);
        let block_id = block.id().to_string();
        let signal = props_tx.clone();
        block.doc().add_listener(Box::new(move |changes| {
            let relevant = changes.iter().any(|change| {
                change.touches(&block_id, PROP_COLUMNS) || change.touches(&block_id, PROP_CELLS)
            });
            if relevant {
                // Send failures just mean nobody is listening yet.
                let _ = signal.send(());
            }
        }));

        let model = Self {
            block,
            views,
            props_tx,
        };
        model.ensure_title_text()?;
        model.ensure_title_column()?;
        model.ensure_default_view()?;
        Ok(model)
    }

    /// Create a fresh database block under `parent_id` and attach a model.
    pub fn create(
        doc: &std::sync::Arc<Document>,
        parent_id: &str,
        views: ViewRegistry,
    ) -> Result<Self, ModelError> {
        let block = doc.add_block(DATABASE_FLAVOUR, Some(parent_id))?;
        Self::attach(block, views)
    }

    pub fn id(&self) -> &str {
        self.block.id()
    }

    pub fn block(&self) -> &BlockModel {
        &self.block
    }

    fn doc(&self) -> &std::sync::Arc<Document> {
        self.block.doc()
    }

    /// Subscribe to the model's properties-changed signal, emitted whenever
    /// its `columns` or `cells` change through any path.
    pub fn subscribe_props(&self) -> broadcast::Receiver<()> {
        self.props_tx.subscribe()
    }

    // ---- initialization ---------------------------------------------------

    fn ensure_title_text(&self) -> Result<(), ModelError> {
        if self.doc().has_prop(self.id(), PROP_TITLE)? {
            return Ok(());
        }
        let id = self.id().to_string();
        self.doc()
            .transact(|tx| tx.set_text(&id, PROP_TITLE, DEFAULT_TITLE))
    }

    fn ensure_title_column(&self) -> Result<(), ModelError> {
        let columns = self.columns()?;
        if columns.iter().any(|column| column.id == self.id()) {
            return Ok(());
        }
        debug!("inserting synthetic title column on block {}", self.id());
        let id = self.id().to_string();
        self.doc().transact(|tx| {
            let mut columns: Vec<Column> = tx.get_json(&id, PROP_COLUMNS)?.unwrap_or_default();
            columns.insert(0, Column::title(id.clone()));
            tx.set_json(&id, PROP_COLUMNS, &columns)
        })
    }

    fn ensure_default_view(&self) -> Result<(), ModelError> {
        if self.view_list()?.is_empty() {
            self.add_view(ViewType::Table)?;
        }
        Ok(())
    }

    // ---- views ------------------------------------------------------------

    /// The current view sequence, read-only.
    pub fn view_list(&self) -> Result<Vec<ViewData>, ModelError> {
        Ok(self
            .doc()
            .get_prop_json(self.id(), PROP_VIEWS)?
            .unwrap_or_default())
    }

    /// Append a new view of `view_type`, constructed through the view
    /// registry. Checkpoints undo first so the addition is undoable as a
    /// discrete step, decoupled from whatever the user did immediately
    /// before.
    pub fn add_view(&self, view_type: ViewType) -> Result<ViewData, ModelError> {
        self.doc().capture_sync();
        let view_id = self.doc().generate_id();
        let view = self.views.init(view_type, self, view_id)?;

        let id = self.id().to_string();
        let appended = view.clone();
        self.doc().transact(move |tx| {
            let mut views: Vec<ViewData> = tx.get_json(&id, PROP_VIEWS)?.unwrap_or_default();
            views.push(appended);
            tx.set_json(&id, PROP_VIEWS, &views)
        })?;
        Ok(view)
    }

    /// Remove the view with `view_id`. Unknown ids are a silent no-op.
    pub fn delete_view(&self, view_id: &str) -> Result<(), ModelError> {
        self.doc().capture_sync();
        let views = self.view_list()?;
        if !views.iter().any(|view| view.id == view_id) {
            return Ok(());
        }
        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut views: Vec<ViewData> = tx.get_json(&id, PROP_VIEWS)?.unwrap_or_default();
            views.retain(|view| view.id != view_id);
            tx.set_json(&id, PROP_VIEWS, &views)
        })
    }

    /// Shallow-merge the result of `update` into the view with `view_id`.
    /// Unknown ids are a silent no-op.
    ///
    /// View mutation here is a full-sequence replacement rather than an
    /// in-place nested edit, so after the transaction the whole `views`
    /// property is explicitly re-published to the document.
    pub fn update_view(
        &self,
        view_id: &str,
        update: impl FnOnce(&ViewData) -> ViewPatch,
    ) -> Result<(), ModelError> {
        let views = self.view_list()?;
        let Some(index) = views.iter().position(|view| view.id == view_id) else {
            return Ok(());
        };
        let merged = update(&views[index]).apply(&views[index]);

        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut views: Vec<ViewData> = tx.get_json(&id, PROP_VIEWS)?.unwrap_or_default();
            if index < views.len() {
                views[index] = merged;
            }
            tx.set_json(&id, PROP_VIEWS, &views)
        })?;
        self.apply_views_update()
    }

    /// Explicitly re-publish the whole `views` property.
    pub fn apply_views_update(&self) -> Result<(), ModelError> {
        let views = self.view_list()?;
        self.doc().update_block(self.id(), PROP_VIEWS, &views)
    }

    /// Explicitly re-publish the whole `columns` property.
    pub fn apply_column_update(&self) -> Result<(), ModelError> {
        let columns = self.columns()?;
        self.doc().update_block(self.id(), PROP_COLUMNS, &columns)
    }

    // ---- columns ----------------------------------------------------------

    pub fn columns(&self) -> Result<Vec<Column>, ModelError> {
        Ok(self
            .doc()
            .get_prop_json(self.id(), PROP_COLUMNS)?
            .unwrap_or_default())
    }

    pub fn find_column_index(&self, column_id: &str) -> Result<Option<usize>, ModelError> {
        Ok(self
            .columns()?
            .iter()
            .position(|column| column.id == column_id))
    }

    pub fn get_column(&self, column_id: &str) -> Result<Option<Column>, ModelError> {
        Ok(self
            .columns()?
            .into_iter()
            .find(|column| column.id == column_id))
    }

    /// Insert a new column at `position`.
    ///
    /// If the init carries an id that is already present the call is an
    /// idempotent success returning that id unchanged. Either way the
    /// resulting id is returned.
    pub fn add_column(
        &self,
        position: InsertPosition,
        column: ColumnInit,
    ) -> Result<String, ModelError> {
        let column_id = match &column.id {
            Some(id) => id.clone(),
            None => self.doc().generate_id(),
        };
        if self
            .columns()?
            .iter()
            .any(|existing| existing.id == column_id)
        {
            return Ok(column_id);
        }

        let new_column = column.into_column(column_id.clone());
        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut columns: Vec<Column> = tx.get_json(&id, PROP_COLUMNS)?.unwrap_or_default();
            let index = insert_position_to_index(&position, &columns, |c| c.id.as_str());
            columns.insert(index, new_column);
            tx.set_json(&id, PROP_COLUMNS, &columns)
        })?;
        Ok(column_id)
    }

    /// Shallow-merge the result of `update` into the column with `column_id`.
    /// Returns the id on success, `None` when the column is unknown (no-op).
    pub fn update_column(
        &self,
        column_id: &str,
        update: impl FnOnce(&Column) -> ColumnPatch,
    ) -> Result<Option<String>, ModelError> {
        let columns = self.columns()?;
        let Some(index) = columns.iter().position(|column| column.id == column_id) else {
            return Ok(None);
        };
        let merged = update(&columns[index]).apply(&columns[index]);

        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut columns: Vec<Column> = tx.get_json(&id, PROP_COLUMNS)?.unwrap_or_default();
            if index < columns.len() {
                columns[index] = merged;
            }
            tx.set_json(&id, PROP_COLUMNS, &columns)
        })?;
        Ok(Some(column_id.to_string()))
    }

    /// Remove the column with `column_id`. Unknown ids are a silent no-op.
    ///
    /// Cell values stored under the deleted column are *not* cascaded:
    /// readers must treat them as orphaned and ignorable.
    pub fn delete_column(&self, column_id: &str) -> Result<(), ModelError> {
        let Some(index) = self.find_column_index(column_id)? else {
            return Ok(());
        };
        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut columns: Vec<Column> = tx.get_json(&id, PROP_COLUMNS)?.unwrap_or_default();
            if index < columns.len() {
                columns.remove(index);
            }
            tx.set_json(&id, PROP_COLUMNS, &columns)
        })
    }

    /// Move an existing column to `position`. Unknown ids are a silent no-op.
    ///
    /// Re-checks the title-column invariant after the splice: the synthetic
    /// title column always ends up back at logical position 0.
    pub fn move_column(
        &self,
        column_id: &str,
        position: InsertPosition,
    ) -> Result<(), ModelError> {
        let Some(index) = self.find_column_index(column_id)? else {
            return Ok(());
        };
        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut columns: Vec<Column> = tx.get_json(&id, PROP_COLUMNS)?.unwrap_or_default();
            if index >= columns.len() {
                return Ok(());
            }
            let moved = columns.remove(index);
            let target = insert_position_to_index(&position, &columns, |c| c.id.as_str());
            columns.insert(target, moved);

            // Invariant: the title column stays first.
            if let Some(title_index) = columns
                .iter()
                .position(|column| column.is_title() && column.id == id)
                && title_index != 0
            {
                let title = columns.remove(title_index);
                columns.insert(0, title);
            }
            tx.set_json(&id, PROP_COLUMNS, &columns)
        })
    }

    // ---- cells ------------------------------------------------------------

    pub fn cells(&self) -> Result<SerializedCells, ModelError> {
        Ok(self
            .doc()
            .get_prop_json(self.id(), PROP_CELLS)?
            .unwrap_or_default())
    }

    /// Look up one cell.
    ///
    /// The `title` column is special-cased: its cell is synthesized from the
    /// row's own id and never read from storage. Absent rows or cells yield
    /// `None` rather than an error.
    pub fn get_cell(&self, row_id: &str, column_id: &str) -> Result<Option<Cell>, ModelError> {
        if column_id == TITLE_CELL_ID {
            return Ok(Some(Cell::new(TITLE_CELL_ID, row_id)));
        }
        Ok(self
            .cells()?
            .get(row_id)
            .and_then(|row| row.get(column_id))
            .cloned())
    }

    /// Write one cell, lazily creating the row's entry when the row has
    /// never been seen. The cell's own `column_id` is authoritative for both
    /// the storage key and the stored value.
    pub fn update_cell(&self, row_id: &str, cell: Cell) -> Result<(), ModelError> {
        let id = self.id().to_string();
        let row_id = row_id.to_string();
        self.doc().transact(move |tx| {
            let mut cells: SerializedCells = tx.get_json(&id, PROP_CELLS)?.unwrap_or_default();
            let row = cells.entry(row_id).or_default();
            row.insert(
                cell.column_id.clone(),
                Cell {
                    column_id: cell.column_id.clone(),
                    value: cell.value,
                },
            );
            tx.set_json(&id, PROP_CELLS, &cells)
        })
    }

    /// For every row that has a cell under `from_id`, clone it into `to_id`
    /// (re-stamping the column id). Rows without a `from_id` cell keep
    /// whatever they had at `to_id`; rows with one get it unconditionally
    /// overwritten.
    pub fn copy_cells_by_column(&self, from_id: &str, to_id: &str) -> Result<(), ModelError> {
        let id = self.id().to_string();
        self.doc().transact(move |tx| {
            let mut cells: SerializedCells = tx.get_json(&id, PROP_CELLS)?.unwrap_or_default();
            for row in cells.values_mut() {
                if let Some(cell) = row.get(from_id).cloned() {
                    row.insert(
                        to_id.to_string(),
                        Cell {
                            column_id: to_id.to_string(),
                            value: cell.value,
                        },
                    );
                }
            }
            tx.set_json(&id, PROP_CELLS, &cells)
        })
    }

    /// Bulk-write cell values under one column, one value per row.
    ///
    /// Strict counterpart of [`update_cell`]: every supplied row must already
    /// have an entry in cell storage. A row that does not fails the whole
    /// call with [`ModelError::RowNotInitialized`] before anything is
    /// written.
    ///
    /// [`update_cell`]: DatabaseBlockModel::update_cell
    pub fn update_cells(
        &self,
        column_id: &str,
        values_by_row: &HashMap<String, serde_json::Value>,
    ) -> Result<(), ModelError> {
        let id = self.id().to_string();
        self.doc().transact(|tx| {
            let mut cells: SerializedCells = tx.get_json(&id, PROP_CELLS)?.unwrap_or_default();
            for row_id in values_by_row.keys() {
                if !cells.contains_key(row_id) {
                    return Err(ModelError::RowNotInitialized {
                        row_id: row_id.clone(),
                    });
                }
            }
            for (row_id, value) in values_by_row {
                // Row presence was checked above.
                if let Some(row) = cells.get_mut(row_id) {
                    row.insert(column_id.to_string(), Cell::new(column_id, value.clone()));
                }
            }
            tx.set_json(&id, PROP_CELLS, &cells)
        })
    }

    // ---- title / aggregate ------------------------------------------------

    pub fn title(&self) -> Result<String, ModelError> {
        self.doc().get_text(self.id(), PROP_TITLE)
    }

    pub fn update_title(&self, title: &str) -> Result<(), ModelError> {
        let id = self.id().to_string();
        self.doc()
            .transact(move |tx| tx.set_text(&id, PROP_TITLE, title))
    }

    /// The document-serialized shape of this block's properties.
    pub fn props(&self) -> Result<DatabaseProps, ModelError> {
        Ok(DatabaseProps {
            title: self.title()?,
            views: self.view_list()?,
            columns: self.columns()?,
            cells: self.cells()?,
        })
    }
}
