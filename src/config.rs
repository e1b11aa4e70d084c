//! Configuration options for block readers and writers.

use crate::compress::CompressionType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default block size (4MB)
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Configuration options shared by block readers and writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Upper bound for one serialized block, header bytes included.
    /// Default: 4MB
    pub block_size: usize,

    /// Short-cut name of the compressor applied to the block meta.
    /// Default: "snappy" when the feature is enabled, otherwise "none"
    pub meta_compressor: String,

    /// Short-cut name of the compressor makers apply to column payloads.
    pub column_compressor: String,

    /// Per-column compressor overrides, keyed by top-level column name.
    pub column_compressors: HashMap<String, String>,

    /// Columns to materialize on read, as dotted paths.
    /// Empty means every column.
    pub read_columns: Vec<String>,

    /// Optional prefix bound into every AAD.
    pub aad_prefix: Option<String>,

    /// Key used for the block meta and the key-check binary.
    pub meta_key_name: Option<String>,

    /// Keys for column meta and data, keyed by top-level column name.
    pub column_keys: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        let compressor = CompressionType::default().name().to_string();
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            meta_compressor: compressor.clone(),
            column_compressor: compressor,
            column_compressors: HashMap::new(),
            read_columns: Vec::new(),
            aad_prefix: None,
            meta_key_name: None,
            column_keys: HashMap::new(),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the meta compressor.
    pub fn meta_compressor(mut self, name: impl Into<String>) -> Self {
        self.meta_compressor = name.into();
        self
    }

    /// Sets the default column compressor.
    pub fn column_compressor(mut self, name: impl Into<String>) -> Self {
        self.column_compressor = name.into();
        self
    }

    /// Overrides the compressor for one column.
    pub fn column_compressor_for(mut self, column: impl Into<String>, name: impl Into<String>) -> Self {
        self.column_compressors.insert(column.into(), name.into());
        self
    }

    /// Sets the columns to read.
    pub fn read_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the AAD prefix.
    pub fn aad_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.aad_prefix = Some(prefix.into());
        self
    }

    /// Sets the key used for the block meta.
    pub fn meta_key_name(mut self, name: impl Into<String>) -> Self {
        self.meta_key_name = Some(name.into());
        self
    }

    /// Encrypts one column with the named key.
    pub fn column_key(mut self, column: impl Into<String>, key_name: impl Into<String>) -> Self {
        self.column_keys.insert(column.into(), key_name.into());
        self
    }

    /// Returns the compressor name for a top-level column.
    pub fn compressor_for(&self, column: &str) -> &str {
        self.column_compressors
            .get(column)
            .map(String::as_str)
            .unwrap_or(&self.column_compressor)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_size > i32::MAX as usize {
            return Err(crate::Error::invalid_argument("block_size must fit in an i32"));
        }
        if self.meta_compressor.is_empty() {
            return Err(crate::Error::invalid_argument("meta_compressor must not be empty"));
        }
        if self.column_keys.values().any(String::is_empty) {
            return Err(crate::Error::invalid_argument("column key names must not be empty"));
        }
        Ok(())
    }
}
