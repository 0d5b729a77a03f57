//! Shared state handed to verb builders

use crate::config::EngineConfig;
use crate::table::TableCatalog;
use std::sync::Arc;

/// Where tables come from and how pipelines are tuned
#[derive(Clone)]
pub struct WorkflowContext {
    /// Named table sources
    pub catalog: Arc<dyn TableCatalog>,
    /// Engine settings
    pub config: EngineConfig,
}

impl WorkflowContext {
    /// Context over `catalog` with default settings
    pub fn new(catalog: Arc<dyn TableCatalog>) -> Self {
        Self {
            catalog,
            config: EngineConfig::default(),
        }
    }

    /// Builder-style settings override
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("tables", &self.catalog.table_names())
            .field("config", &self.config)
            .finish()
    }
}
