//! Named table sources for `read`, `join` and `concat`

use super::{ArrayTable, XTable};
use crate::query::usage::UsageError;
use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Opens tables by name
pub trait TableCatalog: Send + Sync {
    /// A fresh, unstarted table. Unknown names are usage errors listing the
    /// known ones.
    fn open(&self, name: &str) -> Result<Box<dyn XTable>>;

    /// Known table names, sorted
    fn table_names(&self) -> Vec<String>;
}

type TableFactory = Arc<dyn Fn() -> Result<Box<dyn XTable>> + Send + Sync>;

/// Catalog of registered in-memory tables and factories
#[derive(Default)]
pub struct InMemoryCatalog {
    tables: RwLock<BTreeMap<String, (String, TableFactory)>>,
}

impl InMemoryCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table; each `open` returns an unstarted share of it
    pub fn register_table(&self, name: &str, table: ArrayTable) {
        self.register_factory(name, move || {
            Ok(Box::new(table.share()) as Box<dyn XTable>)
        });
    }

    /// Register a factory building a new table per `open`
    pub fn register_factory<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn XTable>> + Send + Sync + 'static,
    {
        debug!("Registering table '{}'", name);
        self.tables
            .write()
            .insert(name.to_ascii_lowercase(), (name.to_string(), Arc::new(factory)));
    }

    /// Remove a table; returns whether it was registered
    pub fn remove(&self, name: &str) -> bool {
        self.tables.write().remove(&name.to_ascii_lowercase()).is_some()
    }
}

impl TableCatalog for InMemoryCatalog {
    fn open(&self, name: &str) -> Result<Box<dyn XTable>> {
        let factory = self
            .tables
            .read()
            .get(&name.to_ascii_lowercase())
            .map(|(_, factory)| factory.clone());
        match factory {
            Some(factory) => factory(),
            None => Err(UsageError::new("table", name, self.table_names()).into()),
        }
    }

    fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .values()
            .map(|(display, _)| display.clone())
            .collect()
    }
}

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("tables", &self.table_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::XArray;

    #[test]
    fn test_open_is_case_insensitive_and_fresh() {
        let catalog = InMemoryCatalog::new();
        let table = ArrayTable::builder()
            .column("A", XArray::from_vec(vec![1i32, 2]))
            .build()
            .unwrap();
        catalog.register_table("Sample", table);

        let first = catalog.open("sample").unwrap();
        let second = catalog.open("SAMPLE").unwrap();
        assert_eq!(first.count(), Some(2));
        assert_eq!(second.schema()[0].name(), "A");
        assert_eq!(catalog.table_names(), vec!["Sample".to_string()]);
    }

    #[test]
    fn test_unknown_table_lists_known() {
        let catalog = InMemoryCatalog::new();
        catalog.register_factory("Empty", || {
            Ok(Box::new(ArrayTable::builder().build()?) as Box<dyn XTable>)
        });
        let err = catalog.open("Nope").unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.value_category, "table");
        assert_eq!(usage.valid_values, vec!["Empty".to_string()]);
        assert!(catalog.remove("empty"));
    }
}
