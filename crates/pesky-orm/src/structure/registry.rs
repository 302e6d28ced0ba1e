//! Process-wide cache of built table structures.
//!
//! Each definition type is built at most once, even when several threads ask
//! for it concurrently; later lookups return the same `Arc`.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use tracing::info;

use super::{TableDefinition, TableStructure};
use crate::Result;

static GLOBAL: Lazy<StructureRegistry> = Lazy::new(StructureRegistry::new);

type Slot = Arc<OnceCell<Arc<TableStructure>>>;

/// Structure cache keyed by definition type and by table name.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    by_type: RwLock<HashMap<TypeId, Slot>>,
    by_name: RwLock<HashMap<String, Arc<TableStructure>>>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry for the whole process.
    pub fn global() -> &'static StructureRegistry {
        &GLOBAL
    }

    /// Returns the structure of `D`, building it on first use.
    pub fn get<D: TableDefinition + Default>(&self) -> Result<Arc<TableStructure>> {
        self.get_with(&D::default())
    }

    /// Returns the structure for `definition`'s type, building it on first use.
    ///
    /// A failed build is not cached, so the error is reported again on the
    /// next lookup.
    pub fn get_with<D: TableDefinition>(&self, definition: &D) -> Result<Arc<TableStructure>> {
        let slot = self.slot(TypeId::of::<D>());
        let structure = slot.get_or_try_init(|| {
            let structure = Arc::new(TableStructure::from_definition(definition)?);
            info!(table = %structure.qualified_name(), "Table structure registered");
            Ok::<_, crate::OrmError>(structure)
        })?;

        self.by_name
            .write()
            .entry(structure.qualified_name())
            .or_insert_with(|| Arc::clone(structure));
        Ok(Arc::clone(structure))
    }

    /// Registers a structure built elsewhere (e.g. from a description).
    pub fn register(&self, structure: TableStructure) -> Arc<TableStructure> {
        let structure = Arc::new(structure);
        info!(table = %structure.qualified_name(), "Table structure registered");
        self.by_name
            .write()
            .insert(structure.qualified_name(), Arc::clone(&structure));
        structure
    }

    /// Looks up a registered structure by `table` or `schema.table`.
    pub fn by_table_name(&self, name: &str) -> Option<Arc<TableStructure>> {
        let by_name = self.by_name.read();
        by_name
            .get(name)
            .or_else(|| by_name.values().find(|s| s.table_name() == name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.by_name.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, type_id: TypeId) -> Slot {
        if let Some(slot) = self.by_type.read().get(&type_id) {
            return Arc::clone(slot);
        }
        Arc::clone(self.by_type.write().entry(type_id).or_default())
    }
}
