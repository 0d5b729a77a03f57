//! Engine configuration
//!
//! Batch sizing, cast strictness and sampling seed for a pipeline. Values come
//! from defaults, a JSON document, or `XFORM_*` environment variables.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default rows requested per `next` call
pub const DEFAULT_BATCH_SIZE: usize = 10240;

/// Pipeline-wide configuration handed to every verb builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows requested per `next` call by drains and builders
    pub batch_size: usize,
    /// Whether `cast` without an explicit mode fails on the first bad value
    pub strict_cast: bool,
    /// Seed for `peek` sampling; `None` seeds from entropy
    pub peek_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            strict_cast: false,
            peek_seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = std::env::var("XFORM_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&size: &usize| size > 0)
            .unwrap_or(defaults.batch_size);

        let strict_cast = std::env::var("XFORM_STRICT_CAST")
            .ok()
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.strict_cast);

        let peek_seed = std::env::var("XFORM_PEEK_SEED")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            batch_size,
            strict_cast,
            peek_seed,
        }
    }

    /// Parse configuration from a JSON document; missing keys take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::internal(format!("invalid engine config: {e}")))?;
        if config.batch_size == 0 {
            return Err(Error::internal("batch_size must be greater than zero"));
        }
        Ok(config)
    }

    /// Builder-style batch size override
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder-style seed override
    pub fn with_peek_seed(mut self, seed: u64) -> Self {
        self.peek_seed = Some(seed);
        self
    }
}
