//! tessera — a CRDT-backed block-document engine.
//!
//! The document tree is stored in a Loro document as a normalized
//! `blocks_by_id` map. Block models are thin typed handles over that storage:
//! every mutation runs inside a document transaction and commits as one
//! atomic unit, after which the document fires exactly one batch of typed
//! change notifications.
//!
//! The centerpiece is [`database::DatabaseBlockModel`]: a schema-governed
//! table of rows, columns, cells and views with transactional mutation and
//! event-driven recomputation.

pub mod block;
pub mod database;
pub mod doc;
pub mod schema;

pub use tessera_api as api;

pub use block::BlockModel;
pub use database::{DatabaseBlockModel, ViewRegistry};
pub use doc::{BlockChange, Document};
pub use schema::{BlockRole, BlockSchema, SchemaRegistry};
