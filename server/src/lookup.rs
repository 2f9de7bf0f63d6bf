//! Directory backing the lookup endpoint.
//!
//! The directory is a JSON object mapping ids to records. Records are
//! returned as stored; their shape belongs to whoever produces the file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

/// Read-only id → record map, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    records: HashMap<String, Value>,
}

impl Directory {
    /// Load the directory from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("Failed to read id db {}", path.display()))?;

        let records: HashMap<String, Value> =
            serde_json::from_slice(&raw).context("Failed to parse id db")?;

        info!(path = %path.display(), records = records.len(), "directory_loaded");

        Ok(Self { records })
    }

    pub fn from_records(records: HashMap<String, Value>) -> Self {
        Self { records }
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
