//! Per-view-type initializer table consumed by the database block model.
//!
//! `ViewType` is a closed sum type; this registry maps each variant to the
//! function that builds its initial state. Adding a view type means adding a
//! variant plus one entry here — `DatabaseBlockModel` is never modified.
//! `validate()` checks at startup that every declared variant has an
//! initializer, so an unregistered type fails loudly instead of at first use.

use std::collections::HashMap;

use tessera_api::{ModelError, TableViewColumn, ViewData, ViewMode, ViewType};

use super::DatabaseBlockModel;

/// Builds the initial name and state for one view type. The registry stamps
/// the caller-supplied id afterwards, so an initializer cannot produce a view
/// with the wrong identity.
pub type ViewInit = fn(&DatabaseBlockModel) -> Result<(String, ViewMode), ModelError>;

pub struct ViewRegistry {
    inits: HashMap<ViewType, ViewInit>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            inits: HashMap::new(),
        }
    }

    /// The standard registry covering every built-in view type.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(ViewType::Table, init_table_view);
        registry
    }

    pub fn register(&mut self, view_type: ViewType, init: ViewInit) {
        self.inits.insert(view_type, init);
    }

    /// Ensure every declared `ViewType` variant has an initializer.
    pub fn validate(&self) -> Result<(), ModelError> {
        for view_type in ViewType::ALL {
            if !self.inits.contains_key(view_type) {
                return Err(ModelError::ViewTypeNotRegistered {
                    view_type: view_type.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Construct a view of `view_type` with the caller-supplied id.
    ///
    /// The returned view is guaranteed to carry exactly that id and a mode
    /// matching the type tag.
    pub fn init(
        &self,
        view_type: ViewType,
        model: &DatabaseBlockModel,
        id: String,
    ) -> Result<ViewData, ModelError> {
        let init = self
            .inits
            .get(&view_type)
            .ok_or_else(|| ModelError::ViewTypeNotRegistered {
                view_type: view_type.to_string(),
            })?;
        let (name, mode) = init(model)?;
        if mode.view_type() != view_type {
            return Err(ModelError::ViewTypeMismatch {
                expected: view_type.to_string(),
                actual: mode.view_type().to_string(),
            });
        }
        Ok(ViewData { id, name, mode })
    }
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Initial table view: one layout entry per existing column, nothing hidden,
/// no filter.
fn init_table_view(model: &DatabaseBlockModel) -> Result<(String, ViewMode), ModelError> {
    let columns = model
        .columns()?
        .iter()
        .map(|column| TableViewColumn::new(column.id.clone()))
        .collect();
    Ok((
        "Table".to_string(),
        ViewMode::Table {
            columns,
            filter: None,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_view_type() {
        assert!(ViewRegistry::standard().validate().is_ok());
    }

    #[test]
    fn empty_registry_fails_validation() {
        let err = ViewRegistry::new().validate().unwrap_err();
        assert!(matches!(err, ModelError::ViewTypeNotRegistered { .. }));
    }
}
