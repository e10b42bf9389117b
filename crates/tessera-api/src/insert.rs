//! Relative insertion directives and their resolution to concrete indices.

use serde::{Deserialize, Serialize};

/// Where to insert an item into an ordered sequence, relative to existing
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Start,
    End,
    /// Directly before the item with the given id.
    Before(String),
    /// Directly after the item with the given id.
    After(String),
}

impl InsertPosition {
    pub fn before(id: impl Into<String>) -> Self {
        InsertPosition::Before(id.into())
    }

    pub fn after(id: impl Into<String>) -> Self {
        InsertPosition::After(id.into())
    }
}

/// Resolve an insertion directive to a splice index into `items`.
///
/// A `Before`/`After` anchor that is not present in the sequence resolves to
/// the end, matching how the original editor degrades when the anchor was
/// deleted concurrently.
pub fn insert_position_to_index<T>(
    position: &InsertPosition,
    items: &[T],
    id_of: impl Fn(&T) -> &str,
) -> usize {
    match position {
        InsertPosition::Start => 0,
        InsertPosition::End => items.len(),
        InsertPosition::Before(anchor) => items
            .iter()
            .position(|item| id_of(item) == anchor.as_str())
            .unwrap_or(items.len()),
        InsertPosition::After(anchor) => items
            .iter()
            .position(|item| id_of(item) == anchor.as_str())
            .map(|i| i + 1)
            .unwrap_or(items.len()),
    }
}
