//! Plain block reader with block-index pushdown.

use super::{BlockHeader, BlockInput, BlockReader, ReaderStats};
use crate::block_index::BlockIndexNode;
use crate::codec::ByteReader;
use crate::column::{Column, ColumnNameNode, Spread};
use crate::compress::get_compressor;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::filter::FilterExpr;
use crate::maker::MakerRegistry;
use crate::tree::{ColumnBinaryTree, ReadPlan};
use bytes::Bytes;
use std::collections::HashSet;

/// Decoded meta section: spread row counts, block index, and where the
/// tree starts.
pub(crate) struct MetaSection {
    pub(crate) spread_rows: Vec<u32>,
    pub(crate) block_index: BlockIndexNode,
    tree_offset: usize,
}

impl MetaSection {
    pub(crate) fn parse(raw: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(raw);
        let spreads = reader.read_len()?;
        let spread_rows = (0..spreads).map(|_| reader.read_len().map(|r| r as u32)).collect::<Result<Vec<_>>>()?;
        let block_index = BlockIndexNode::from_binary(reader.read_len_prefixed()?)?;
        Ok(Self { spread_rows, block_index, tree_offset: reader.position() })
    }

    pub(crate) fn tree_bytes<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        &raw[self.tree_offset..]
    }
}

/// Which spreads of a block to materialize.
pub(crate) enum Selection {
    Skip,
    All,
    Spreads(HashSet<u32>),
}

impl Selection {
    pub(crate) fn spreads(&self) -> Option<&HashSet<u32>> {
        match self {
            Selection::Spreads(set) => Some(set),
            _ => None,
        }
    }
}

struct LoadedBlock {
    spread_rows: Vec<u32>,
    tree: ColumnBinaryTree,
    selected: Option<HashSet<u32>>,
    next: usize,
}

impl LoadedBlock {
    fn is_selected(&self, spread: usize) -> bool {
        self.selected.as_ref().map_or(true, |set| set.contains(&(spread as u32)))
    }

    fn has_next(&self) -> bool {
        (self.next..self.spread_rows.len()).any(|spread| self.is_selected(spread))
    }

    fn advance(&mut self) -> Option<usize> {
        while self.next < self.spread_rows.len() {
            let spread = self.next;
            self.next += 1;
            if self.is_selected(spread) {
                return Some(spread);
            }
        }
        None
    }
}

/// State shared by both reader families.
pub(crate) struct ReaderCore {
    pub(crate) options: Options,
    registry: MakerRegistry,
    names: ColumnNameNode,
    filter: Option<FilterExpr>,
    stats: ReaderStats,
    block: Option<LoadedBlock>,
}

impl ReaderCore {
    pub(crate) fn new(options: Options, registry: MakerRegistry) -> Result<Self> {
        options.validate()?;
        let names = ColumnNameNode::from_paths(&options.read_columns);
        Ok(Self { options, registry, names, filter: None, stats: ReaderStats::default(), block: None })
    }

    pub(crate) fn names(&self) -> &ColumnNameNode {
        &self.names
    }

    pub(crate) fn begin_block(&mut self) {
        self.block = None;
    }

    /// Read the stored meta bytes that follow the header binary.
    pub(crate) fn read_meta(
        &self,
        input: &mut dyn BlockInput,
        header: &BlockHeader,
        consumed: usize,
        block_size: usize,
    ) -> Result<Vec<u8>> {
        if consumed + header.meta_length > block_size {
            return Err(Error::corruption(format!(
                "meta of {} bytes after {} header bytes overruns a {} byte block",
                header.meta_length, consumed, block_size
            )));
        }
        let mut meta = vec![0u8; header.meta_length];
        input.read_exact(&mut meta)?;
        Ok(meta)
    }

    pub(crate) fn decompress_meta(&self, header: &BlockHeader, meta: &[u8]) -> Result<Vec<u8>> {
        get_compressor(&header.compressor)?.decompress(meta)
    }

    /// Consult the block index against the reader's filter.
    pub(crate) fn select(&self, meta: &MetaSection) -> Selection {
        let expr = match &self.filter {
            Some(expr) => expr,
            None => return Selection::All,
        };
        match meta.block_index.get_block_spread_index(expr, meta.spread_rows.len() as u32) {
            None => Selection::All,
            Some(spreads) if spreads.is_empty() => Selection::Skip,
            Some(spreads) => Selection::Spreads(spreads.into_iter().collect()),
        }
    }

    /// Step over the rest of a block the index ruled out.
    pub(crate) fn skip_block(&mut self, input: &mut dyn BlockInput, consumed: usize, block_size: usize) -> Result<()> {
        let remaining = remaining(consumed, block_size)?;
        input.skip(remaining as u64)?;
        self.stats.bytes_read += consumed as u64;
        self.stats.bytes_skipped += remaining as u64;
        self.stats.blocks_skipped += 1;
        log::debug!("skipped block: {} bytes after {} bytes of header and meta", remaining, consumed);
        Ok(())
    }

    /// Execute the read plan, then step to the end of the block.
    pub(crate) fn read_data(
        &mut self,
        input: &mut dyn BlockInput,
        plan: &ReadPlan,
        consumed: usize,
        block_size: usize,
    ) -> Result<Bytes> {
        let available = remaining(consumed, block_size)?;
        if plan.end() > available as u64 || plan.buffer_len() > available {
            return Err(Error::corruption(format!(
                "data ranges end at {} but only {} data bytes remain in the block",
                plan.end(),
                available
            )));
        }
        let mut position = 0u64;
        let buffer = plan.execute(input, &mut position)?;
        let consumed = consumed + position as usize;
        let remaining = remaining(consumed, block_size)?;
        input.skip(remaining as u64)?;

        let data_read = plan.buffer_len();
        self.stats.bytes_read += (consumed - position as usize + data_read) as u64;
        self.stats.bytes_skipped += (position as usize - data_read + remaining) as u64;
        self.stats.blocks_read += 1;
        log::debug!("read block: {} data bytes in {} ranges", data_read, plan.offsets().len());
        Ok(buffer)
    }

    pub(crate) fn load(&mut self, spread_rows: Vec<u32>, tree: ColumnBinaryTree, selection: Selection) {
        let selected = match selection {
            Selection::Spreads(set) => Some(set),
            _ => None,
        };
        self.block = Some(LoadedBlock { spread_rows, tree, selected, next: 0 });
    }

    pub(crate) fn set_filter(&mut self, filter: Option<FilterExpr>) {
        self.filter = filter;
    }

    pub(crate) fn has_next(&self) -> bool {
        self.block.as_ref().map_or(false, LoadedBlock::has_next)
    }

    pub(crate) fn next(&mut self) -> Result<Option<Spread>> {
        let block = match &mut self.block {
            Some(block) => block,
            None => return Ok(None),
        };
        let spread = match block.advance() {
            Some(spread) => spread,
            None => return Ok(None),
        };
        let columns = block
            .tree
            .get_children(spread)
            .iter()
            .map(|binary| self.registry.decode(binary))
            .collect::<Result<Vec<_>>>()?;
        let row_count = columns.first().map_or(block.spread_rows[spread] as usize, Column::row_count);
        self.stats.spreads_read += 1;
        self.stats.rows_read += row_count as u64;
        Ok(Some(Spread::from_parts(row_count, columns)))
    }

    pub(crate) fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    pub(crate) fn close(&mut self) {
        self.block = None;
        self.stats = ReaderStats::default();
    }
}

fn remaining(consumed: usize, block_size: usize) -> Result<usize> {
    block_size.checked_sub(consumed).ok_or_else(|| {
        Error::corruption(format!("block contents of {} bytes overrun the {} byte block", consumed, block_size))
    })
}

/// Reads plain blocks, skipping blocks and spreads the filter rules out and
/// buffering only the requested columns.
pub struct PushdownBlockReader {
    core: ReaderCore,
}

impl PushdownBlockReader {
    /// Reader with the built-in makers.
    pub fn new(options: Options) -> Result<Self> {
        Self::with_registry(options, MakerRegistry::new())
    }

    /// Reader with a custom maker registry.
    pub fn with_registry(options: Options, registry: MakerRegistry) -> Result<Self> {
        Ok(Self { core: ReaderCore::new(options, registry)? })
    }
}

impl BlockReader for PushdownBlockReader {
    fn set_filter(&mut self, filter: Option<FilterExpr>) {
        self.core.set_filter(filter);
    }

    fn set_stream(&mut self, input: &mut dyn BlockInput, block_size: usize) -> Result<()> {
        self.core.begin_block();
        let (header, mut consumed) = BlockHeader::read_from(input, false, block_size)?;
        let stored = self.core.read_meta(input, &header, consumed, block_size)?;
        consumed += stored.len();
        let raw = self.core.decompress_meta(&header, &stored)?;
        let meta = MetaSection::parse(&raw)?;

        let selection = self.core.select(&meta);
        if let Selection::Skip = selection {
            return self.core.skip_block(input, consumed, block_size);
        }

        let mut plan = ReadPlan::new();
        let mut tree_reader = ByteReader::new(meta.tree_bytes(&raw));
        let mut tree = ColumnBinaryTree::decode(
            &mut tree_reader,
            meta.spread_rows.len(),
            self.core.names(),
            selection.spreads(),
            &mut plan,
        )?;
        if tree_reader.remaining() != 0 {
            return Err(Error::corruption(format!("{} trailing meta bytes", tree_reader.remaining())));
        }
        let buffer = self.core.read_data(input, &plan, consumed, block_size)?;
        tree.attach(&buffer, None);
        self.core.load(meta.spread_rows, tree, selection);
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.core.has_next()
    }

    fn next(&mut self) -> Result<Option<Spread>> {
        self.core.next()
    }

    fn stats(&self) -> &ReaderStats {
        self.core.stats()
    }

    fn close(&mut self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockWriter, PushdownBlockWriter};
    use crate::filter::Filter;
    use std::io::Cursor;

    fn write_block(spreads: &[Vec<Option<i32>>], block_size: usize) -> Vec<u8> {
        let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
        for ids in spreads {
            let spread = Spread::new(ids.len())
                .with_column(Column::integer("id", ids.clone()))
                .unwrap()
                .with_column(Column::string("name", ids.iter().map(|id| id.map(|v| format!("n{}", v))).collect()))
                .unwrap();
            assert!(writer.append_spread(&spread).unwrap());
        }
        let mut out = Vec::new();
        writer.write(&mut out, Some(block_size)).unwrap();
        out
    }

    #[test]
    fn test_read_all() {
        let block = write_block(&[vec![Some(1), Some(2)], vec![Some(3)]], 2048);
        let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
        let mut input = Cursor::new(block);
        reader.set_stream(&mut input, 2048).unwrap();
        assert_eq!(input.position(), 2048);

        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.row_count(), 2);
        assert_eq!(first.column("id"), Some(&Column::integer("id", vec![Some(1), Some(2)])));
        assert!(reader.has_next());
        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.column("name"), Some(&Column::string("name", vec![Some("n3")])));
        assert!(!reader.has_next());
        assert!(reader.next().unwrap().is_none());
        assert_eq!(reader.stats().rows_read, 3);
        assert_eq!(reader.stats().bytes_read + reader.stats().bytes_skipped, 2048);
    }

    #[test]
    fn test_filter_selects_spreads() {
        let block = write_block(&[vec![Some(1), Some(2)], vec![Some(30)]], 2048);
        let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
        reader.set_filter(Some(FilterExpr::column("id", Filter::ge(10))));
        reader.set_stream(&mut Cursor::new(block), 2048).unwrap();

        let spread = reader.next().unwrap().unwrap();
        assert_eq!(spread.column("id"), Some(&Column::integer("id", vec![Some(30)])));
        assert!(!reader.has_next());
        assert_eq!(reader.stats().spreads_read, 1);
    }

    #[test]
    fn test_column_selection() {
        let block = write_block(&[vec![Some(1)]], 1024);
        let mut reader = PushdownBlockReader::new(Options::default().read_columns(["name"])).unwrap();
        reader.set_stream(&mut Cursor::new(block), 1024).unwrap();
        let spread = reader.next().unwrap().unwrap();
        assert_eq!(spread.columns().len(), 1);
        assert!(spread.column("id").is_none());
    }

    #[test]
    fn test_consecutive_blocks() {
        let mut stream = write_block(&[vec![Some(1)]], 1024);
        stream.extend(write_block(&[vec![Some(50)]], 1024));
        let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
        reader.set_filter(Some(FilterExpr::column("id", Filter::gt(25))));
        let mut input = Cursor::new(stream);

        reader.set_stream(&mut input, 1024).unwrap();
        assert!(!reader.has_next());
        assert_eq!(input.position(), 1024);
        reader.set_stream(&mut input, 1024).unwrap();
        assert!(reader.has_next());
        assert_eq!(reader.stats().blocks_skipped, 1);
        assert_eq!(reader.stats().blocks_read, 1);

        reader.close();
        assert_eq!(*reader.stats(), ReaderStats::default());
        assert!(!reader.has_next());
    }

    #[test]
    fn test_truncated_block() {
        let block = write_block(&[vec![Some(1)]], 1024);
        let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
        let result = reader.set_stream(&mut Cursor::new(block[..20].to_vec()), 1024);
        assert!(result.is_err());
    }
}
