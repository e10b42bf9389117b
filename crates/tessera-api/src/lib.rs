//! Shared data types for the tessera block-document engine.
//!
//! This crate holds the serializable shapes that cross the engine boundary:
//! columns, cells, view data, insert positions and the error taxonomy.
//! It is deliberately free of CRDT types — frontends consume these structs
//! without pulling in the storage substrate.

pub mod database;
pub mod error;
pub mod insert;
pub mod view;

pub use database::{Cell, Column, ColumnInit, ColumnPatch, DatabaseProps, SerializedCells};
pub use error::ModelError;
pub use insert::{InsertPosition, insert_position_to_index};
pub use view::{TableViewColumn, ViewData, ViewMode, ViewPatch, ViewType};
