//! Tuning parameters for a [`Graph`](crate::Graph)
//!
//! Every field has a default; a config file only needs the fields it
//! overrides:
//!
//! ```toml
//! num_workers = 4
//! group_size = 2
//! bucket_factor = 1.5
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use sketchcc_common::{Error, Result};

/// Upper bound on the default worker count
const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Ingestion worker threads
    pub num_workers: usize,
    /// Threads each worker uses to build delta levels
    pub group_size: usize,
    /// Multiplier on the number of bucket rows per sketch
    pub bucket_factor: f64,
    /// Updates buffered per vertex before a batch is emitted.
    /// Derived from the node count when unset.
    pub gutter_size: Option<usize>,
    /// Ready batches allowed in flight. `2 · num_workers` when unset.
    pub queue_depth: Option<usize>,
    /// Graph seed. Drawn at random when unset.
    pub seed: Option<u64>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS),
            group_size: 1,
            bucket_factor: 1.0,
            gutter_size: None,
            queue_depth: None,
            seed: None,
        }
    }
}

impl GraphConfig {
    /// Load overrides from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::InvalidConfig("num_workers must be at least 1".into()));
        }
        if self.group_size == 0 {
            return Err(Error::InvalidConfig("group_size must be at least 1".into()));
        }
        if !(self.bucket_factor.is_finite() && self.bucket_factor > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "bucket_factor must be positive, got {}",
                self.bucket_factor
            )));
        }
        if self.gutter_size == Some(0) {
            return Err(Error::InvalidConfig("gutter_size must be at least 1".into()));
        }
        if self.queue_depth == Some(0) {
            return Err(Error::InvalidConfig("queue_depth must be at least 1".into()));
        }
        Ok(())
    }

    /// Gutter capacity for a graph of `num_nodes` vertices.
    ///
    /// Defaults to the size of one sketch in words, `24 · log2(n)³ / 8`, so
    /// a batch costs about as much to apply as it saves.
    pub fn gutter_size_for(&self, num_nodes: u64) -> usize {
        if let Some(size) = self.gutter_size {
            return size;
        }
        let log_n = (num_nodes.max(2) as f64).log2();
        ((24.0 * log_n.powi(3) / 8.0) as usize).max(1)
    }

    pub fn effective_queue_depth(&self) -> usize {
        self.queue_depth.unwrap_or(2 * self.num_workers)
    }

    /// Configured seed or a fresh random one.
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}
