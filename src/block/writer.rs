//! Plain block writer with block-index pushdown support.

use super::{BlockHeader, BlockWriter};
use crate::block_index::BlockIndexNode;
use crate::column::{ColumnBinary, Spread};
use crate::compress::{get_compressor, Compressor};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::maker::MakerRegistry;
use crate::tree::ColumnBinaryTree;
use bytes::{BufMut, BytesMut};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Accumulators shared by both writer families.
pub(crate) struct SpreadBuffer {
    pub(crate) options: Options,
    pub(crate) registry: MakerRegistry,
    header_bytes: Vec<u8>,
    spread_rows: Vec<u32>,
    pub(crate) tree: ColumnBinaryTree,
    block_index: BlockIndexNode,
    /// Keep encrypted columns out of the block index, whose summaries
    /// would otherwise store their values in the clear.
    hide_keyed_columns: bool,
}

impl SpreadBuffer {
    pub(crate) fn new(options: Options, registry: MakerRegistry) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            registry,
            header_bytes: Vec::new(),
            spread_rows: Vec::new(),
            tree: ColumnBinaryTree::new(),
            block_index: BlockIndexNode::new(),
            hide_keyed_columns: false,
        })
    }

    pub(crate) fn hide_keyed_columns(&mut self) {
        self.hide_keyed_columns = true;
    }

    pub(crate) fn append_header(&mut self, bytes: &[u8]) {
        self.header_bytes.extend_from_slice(bytes);
    }

    pub(crate) fn header_len(&self) -> usize {
        self.header_bytes.len()
    }

    pub(crate) fn spread_count(&self) -> usize {
        self.spread_rows.len()
    }

    pub(crate) fn encode_spread(&self, spread: &Spread) -> Result<Vec<ColumnBinary>> {
        self.registry.encode_columns(spread.columns(), &self.options)
    }

    /// Fail if the spread's payloads alone exceed the block.
    pub(crate) fn check_fits(&self, spread: &[ColumnBinary]) -> Result<()> {
        let data: usize = spread.iter().map(ColumnBinary::total_length).sum();
        if data > self.options.block_size {
            return Err(Error::block_size_exceeded(format!(
                "spread of {} data bytes can never fit a {} byte block",
                data, self.options.block_size
            )));
        }
        Ok(())
    }

    /// The block index as it would be after appending `spread`.
    pub(crate) fn index_with(&self, spread: &[ColumnBinary]) -> Result<BlockIndexNode> {
        let mut index = self.block_index.clone();
        let ordinal = self.spread_rows.len() as u32;
        for binary in spread {
            if self.hide_keyed_columns && self.options.column_keys.contains_key(&binary.column_name) {
                index.child_mut(&binary.column_name).mark_unsupported();
                continue;
            }
            self.registry.set_block_index_node(&mut index, binary, ordinal)?;
        }
        Ok(index)
    }

    /// Fail without touching the buffer when `size` would overflow the block.
    pub(crate) fn check_limit(&self, size: usize) -> Result<()> {
        if size > self.options.block_size {
            return Err(Error::block_size_exceeded(format!(
                "block would grow to {} bytes, over the {} byte limit",
                size, self.options.block_size
            )));
        }
        Ok(())
    }

    pub(crate) fn accept(&mut self, row_count: usize, spread: Vec<ColumnBinary>, index: BlockIndexNode) -> Result<()> {
        self.tree.add_children(spread)?;
        self.block_index = index;
        self.spread_rows.push(row_count as u32);
        Ok(())
    }

    pub(crate) fn block_index(&self) -> &BlockIndexNode {
        &self.block_index
    }

    /// Uncompressed meta size for `spreads` spreads with the given index
    /// and tree meta size.
    pub(crate) fn raw_meta_size(&self, index: &BlockIndexNode, spreads: usize, tree_meta: usize) -> Result<usize> {
        Ok(4 + 4 * spreads + 4 + index.to_binary()?.len() + tree_meta)
    }

    /// Spread count, row counts, block index, tree meta.
    pub(crate) fn encode_meta(&self, tree_meta: &[u8]) -> Result<Vec<u8>> {
        let index = self.block_index.to_binary()?;
        let mut meta = BytesMut::with_capacity(8 + 4 * self.spread_rows.len() + index.len() + tree_meta.len());
        meta.put_i32(self.spread_rows.len() as i32);
        for rows in &self.spread_rows {
            meta.put_u32(*rows);
        }
        meta.put_i32(index.len() as i32);
        meta.put_slice(&index);
        meta.put_slice(tree_meta);
        Ok(meta.to_vec())
    }

    /// Write the finished block; fails before writing anything if it would
    /// overflow `fixed_size`.
    pub(crate) fn finish(
        &self,
        out: &mut dyn Write,
        header: &BlockHeader,
        meta: &[u8],
        data: &[u8],
        fixed_size: Option<usize>,
    ) -> Result<usize> {
        let size = self.header_bytes.len() + 4 + header.encoded_size() + meta.len() + data.len();
        if let Some(fixed) = fixed_size {
            if size > fixed {
                return Err(Error::block_size_exceeded(format!(
                    "block needs {} bytes but the fixed size is {}; disable meta compression or enlarge the block",
                    size, fixed
                )));
            }
        }
        out.write_all(&self.header_bytes)?;
        header.write_to(out)?;
        out.write_all(meta)?;
        out.write_all(data)?;
        let total = fixed_size.unwrap_or(size);
        io::copy(&mut io::repeat(0).take((total - size) as u64), out)?;
        log::debug!(
            "wrote block: {} spreads, {} meta bytes, {} data bytes, {} padding",
            self.spread_rows.len(),
            meta.len(),
            data.len(),
            total - size
        );
        Ok(total)
    }

    pub(crate) fn reset(&mut self) {
        self.header_bytes.clear();
        self.spread_rows.clear();
        self.tree.clear();
        self.block_index = BlockIndexNode::new();
    }
}

/// Writes plain blocks: compressed meta, uncompressed-by-the-block payloads.
pub struct PushdownBlockWriter {
    buffer: SpreadBuffer,
    meta_compressor: Arc<dyn Compressor>,
}

impl PushdownBlockWriter {
    /// Writer with the built-in makers.
    pub fn new(options: Options) -> Result<Self> {
        Self::with_registry(options, MakerRegistry::new())
    }

    /// Writer with a custom maker registry.
    pub fn with_registry(options: Options, registry: MakerRegistry) -> Result<Self> {
        let meta_compressor = get_compressor(&options.meta_compressor)?;
        Ok(Self { buffer: SpreadBuffer::new(options, registry)?, meta_compressor })
    }

    /// The writer's options.
    pub fn options(&self) -> &Options {
        &self.buffer.options
    }

    /// The block index accumulated so far.
    pub fn block_index(&self) -> &BlockIndexNode {
        self.buffer.block_index()
    }

    fn estimate(&self, index: &BlockIndexNode, spreads: usize, tree_meta: usize, data: usize) -> Result<usize> {
        let header = BlockHeader {
            compressor: self.meta_compressor.name().to_string(),
            meta_length: 0,
            encryption: None,
        };
        Ok(self.buffer.header_len()
            + 4
            + header.encoded_size()
            + self.buffer.raw_meta_size(index, spreads, tree_meta)?
            + data)
    }

    /// Block size after appending `spread` with its merged `index`.
    fn size_with(&self, spread: &[ColumnBinary], index: &BlockIndexNode) -> Result<usize> {
        let (tree_meta, data) = self.buffer.tree.estimate_add(spread)?;
        self.estimate(index, self.buffer.spread_count() + 1, tree_meta, data)
    }
}

impl BlockWriter for PushdownBlockWriter {
    fn append_header(&mut self, bytes: &[u8]) {
        self.buffer.append_header(bytes);
    }

    fn encode_spread(&self, spread: &Spread) -> Result<Vec<ColumnBinary>> {
        self.buffer.encode_spread(spread)
    }

    fn can_append(&self, spread: &[ColumnBinary]) -> Result<bool> {
        self.buffer.check_fits(spread)?;
        let index = self.buffer.index_with(spread)?;
        let size = self.size_with(spread, &index)?;
        Ok(size <= self.buffer.options.block_size)
    }

    fn append(&mut self, row_count: usize, spread: Vec<ColumnBinary>) -> Result<()> {
        let index = self.buffer.index_with(&spread)?;
        self.buffer.check_limit(self.size_with(&spread, &index)?)?;
        self.buffer.accept(row_count, spread, index)
    }

    fn size(&self) -> Result<usize> {
        let tree = &self.buffer.tree;
        self.estimate(self.buffer.block_index(), self.buffer.spread_count(), tree.meta_size(), tree.total_data_length())
    }

    fn spread_count(&self) -> usize {
        self.buffer.spread_count()
    }

    fn write(&mut self, out: &mut dyn Write, fixed_size: Option<usize>) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::invalid_state("no spreads appended to the block"));
        }
        let mut tree_meta = BytesMut::with_capacity(self.buffer.tree.meta_size());
        let mut data = BytesMut::with_capacity(self.buffer.tree.total_data_length());
        self.buffer.tree.create(&mut tree_meta, &mut data)?;
        let meta = self.meta_compressor.compress(&self.buffer.encode_meta(&tree_meta)?)?;
        let header = BlockHeader {
            compressor: self.meta_compressor.name().to_string(),
            meta_length: meta.len(),
            encryption: None,
        };
        let written = self.buffer.finish(out, &header, &meta, &data, fixed_size)?;
        self.reset();
        Ok(written)
    }

    fn reset(&mut self) {
        self.buffer.reset();
    }
}
