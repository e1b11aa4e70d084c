//! Column makers: codecs between a [`Column`] and its [`ColumnBinary`].
//!
//! A binary records the id of the maker that produced it; readers look the
//! maker up in a [`MakerRegistry`] by that id. Makers also feed the block
//! index with whatever summary their payload carries.

mod nested;
mod primitive;

pub use nested::{ArrayMaker, StructMaker};
pub use primitive::PrimitiveMaker;

use crate::block_index::BlockIndexNode;
use crate::column::{Column, ColumnBinary, ColumnType};
use crate::compress::{get_compressor, Compressor};
use crate::config::Options;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Settings a maker needs to encode one top-level column and its children.
#[derive(Clone)]
pub struct MakerOptions {
    /// Payload compressor.
    pub compressor: Arc<dyn Compressor>,
}

impl MakerOptions {
    /// Resolve the compressor configured for a top-level column.
    pub fn for_column(options: &Options, column: &str) -> Result<Self> {
        Ok(Self { compressor: get_compressor(options.compressor_for(column))? })
    }
}

/// Codec for one family of column types.
pub trait ColumnMaker: Send + Sync {
    /// Identifier persisted in every binary this maker produces.
    fn id(&self) -> &str;

    /// Encode a column.
    fn encode(&self, column: &Column, options: &MakerOptions, registry: &MakerRegistry) -> Result<ColumnBinary>;

    /// Decode a binary whose payload (and children's payloads) are loaded.
    fn decode(&self, binary: &ColumnBinary, registry: &MakerRegistry) -> Result<Column>;

    /// Record this binary's summary for `spread` under `node`.
    fn set_block_index_node(
        &self,
        node: &mut BlockIndexNode,
        binary: &ColumnBinary,
        spread: u32,
        registry: &MakerRegistry,
    ) -> Result<()>;
}

/// Maker lookup by id.
#[derive(Clone)]
pub struct MakerRegistry {
    makers: HashMap<String, Arc<dyn ColumnMaker>>,
}

impl MakerRegistry {
    /// Registry with the built-in makers.
    pub fn new() -> Self {
        let mut registry = Self { makers: HashMap::new() };
        registry.register(Arc::new(PrimitiveMaker));
        registry.register(Arc::new(ArrayMaker));
        registry.register(Arc::new(StructMaker));
        registry
    }

    /// Add or replace a maker.
    pub fn register(&mut self, maker: Arc<dyn ColumnMaker>) {
        self.makers.insert(maker.id().to_string(), maker);
    }

    /// Maker by id.
    pub fn get(&self, id: &str) -> Result<&Arc<dyn ColumnMaker>> {
        self.makers.get(id).ok_or_else(|| Error::unknown("maker", id))
    }

    /// Default maker id for a column type.
    pub fn maker_id_for(column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Array => nested::ARRAY_MAKER_ID,
            ColumnType::Struct => nested::STRUCT_MAKER_ID,
            _ => primitive::PRIMITIVE_MAKER_ID,
        }
    }

    /// Encode a column with the default maker for its type.
    pub fn encode(&self, column: &Column, options: &MakerOptions) -> Result<ColumnBinary> {
        self.get(Self::maker_id_for(column.column_type()))?.encode(column, options, self)
    }

    /// Encode every column of a spread, resolving compressors from `options`.
    pub fn encode_columns(&self, columns: &[Column], options: &Options) -> Result<Vec<ColumnBinary>> {
        columns
            .iter()
            .map(|column| self.encode(column, &MakerOptions::for_column(options, &column.name)?))
            .collect()
    }

    /// Decode with the maker recorded in the binary.
    pub fn decode(&self, binary: &ColumnBinary) -> Result<Column> {
        self.get(&binary.maker_id)?.decode(binary, self)
    }

    /// Update the block index with the maker recorded in the binary.
    pub fn set_block_index_node(&self, node: &mut BlockIndexNode, binary: &ColumnBinary, spread: u32) -> Result<()> {
        self.get(&binary.maker_id)?.set_block_index_node(node, binary, spread, self)
    }
}

impl Default for MakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply an outer row selection on top of a binary's own selection.
pub(crate) fn compose_load_index(outer: Option<&[u32]>, inner: Option<&[u32]>) -> Result<Option<Vec<u32>>> {
    match (outer, inner) {
        (None, inner) => Ok(inner.map(<[u32]>::to_vec)),
        (Some(outer), None) => Ok(Some(outer.to_vec())),
        (Some(outer), Some(inner)) => outer
            .iter()
            .map(|row| {
                inner
                    .get(*row as usize)
                    .copied()
                    .ok_or_else(|| Error::corruption(format!("load index row {} out of range", row)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
    }
}
