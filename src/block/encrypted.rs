//! Encryption-aware block writer and reader.
//!
//! Same layout as the plain family, plus AAD and key-check material in the
//! header and per-node encryption inside the tree. Per block the record
//! ordinal restarts at zero: the key check uses ordinal 0 and the block
//! meta ordinal 1.

use super::reader::{MetaSection, ReaderCore, Selection};
use super::writer::SpreadBuffer;
use super::{BlockHeader, BlockInput, BlockReader, BlockWriter, EncryptionHeader, ReaderStats};
use crate::block_index::BlockIndexNode;
use crate::codec::ByteReader;
use crate::column::{ColumnBinary, Spread};
use crate::compress::{get_compressor, Compressor};
use crate::config::Options;
use crate::encrypt::{Aad, EncryptionContext, EncryptionSettings, Module, KEY_CHECK_PLAINTEXT};
use crate::error::{Error, Result};
use crate::filter::FilterExpr;
use crate::maker::MakerRegistry;
use crate::tree::{ColumnBinaryTree, ReadPlan};
use bytes::BytesMut;
use std::io::Write;
use std::sync::Arc;

const KEY_CHECK_ORDINAL: i32 = 0;
const BLOCK_META_ORDINAL: i32 = 1;

/// Writes blocks whose meta and configured columns are encrypted.
pub struct EncryptionBlockWriter {
    buffer: SpreadBuffer,
    meta_compressor: Arc<dyn Compressor>,
    ctx: EncryptionContext,
    next_ordinal: i32,
}

impl EncryptionBlockWriter {
    /// Writer with the built-in makers and a random per-file AAD id.
    pub fn new(options: Options, settings: EncryptionSettings) -> Result<Self> {
        Self::with_registry(options, settings, MakerRegistry::new())
    }

    /// Writer with a custom maker registry.
    pub fn with_registry(options: Options, settings: EncryptionSettings, registry: MakerRegistry) -> Result<Self> {
        let key_names = options.meta_key_name.iter().chain(options.column_keys.values());
        for key in key_names {
            settings.keys.get(key)?;
        }
        let prefix = options.aad_prefix.clone().unwrap_or_default().into_bytes();
        let ctx = EncryptionContext::new(settings, Aad::new(Aad::random_file_id(), prefix));
        let meta_compressor = get_compressor(&options.meta_compressor)?;
        let mut buffer = SpreadBuffer::new(options, registry)?;
        buffer.hide_keyed_columns();
        Ok(Self { buffer, meta_compressor, ctx, next_ordinal: 0 })
    }

    /// The per-file AAD identifier written into every header.
    pub fn file_id(&self) -> &[u8] {
        self.ctx.aad().file_id()
    }

    fn meta_key(&self) -> Option<&str> {
        self.buffer.options.meta_key_name.as_deref()
    }

    fn header(&self, meta_length: usize, key_check: Vec<u8>) -> BlockHeader {
        BlockHeader {
            compressor: self.meta_compressor.name().to_string(),
            meta_length,
            encryption: Some(EncryptionHeader {
                aad_id: self.ctx.aad().file_id().to_vec(),
                aad_prefix: self.ctx.aad().prefix().to_vec(),
                block_ordinal: self.next_ordinal.clamp(0, i16::MAX as i32) as i16,
                factory: self.ctx.factory_name().to_string(),
                key_check,
            }),
        }
    }

    fn estimate(&self, tree: &ColumnBinaryTree, spreads: usize, index_size: usize) -> usize {
        let (tree_meta, data) = tree.encrypted_size(&self.ctx);
        let raw_meta = 4 + 4 * spreads + 4 + index_size + tree_meta;
        let (meta, key_check) = match self.meta_key() {
            Some(_) => (
                self.ctx.encrypted_size(Module::BlockMeta, raw_meta),
                vec![0u8; self.ctx.encrypted_size(Module::BlockMeta, KEY_CHECK_PLAINTEXT.len())],
            ),
            None => (raw_meta, Vec::new()),
        };
        self.buffer.header_len() + 4 + self.header(0, key_check).encoded_size() + meta + data
    }

    /// Block size after appending `spread` with its merged `index`.
    fn size_with(&self, spread: &[ColumnBinary], index: &BlockIndexNode) -> Result<usize> {
        let mut probe = self.buffer.tree.clone();
        probe.add_children(spread.to_vec())?;
        probe.set_key_names(&self.buffer.options.column_keys);
        Ok(self.estimate(&probe, self.buffer.spread_count() + 1, index.to_binary()?.len()))
    }
}

impl BlockWriter for EncryptionBlockWriter {
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
        self.buffer.accept(row_count, spread, index)?;
        self.buffer.tree.set_key_names(&self.buffer.options.column_keys);
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        let index = self.buffer.block_index().to_binary()?;
        Ok(self.estimate(&self.buffer.tree, self.buffer.spread_count(), index.len()))
    }

    fn spread_count(&self) -> usize {
        self.buffer.spread_count()
    }

    fn write(&mut self, out: &mut dyn Write, fixed_size: Option<usize>) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::invalid_state("no spreads appended to the block"));
        }
        let ordinal = i16::try_from(self.next_ordinal)
            .map_err(|_| Error::invalid_state("block ordinal exhausted for this file"))?;
        self.ctx.aad_mut().start_block(ordinal);
        let meta_key = self.buffer.options.meta_key_name.clone();

        let key_check = match &meta_key {
            Some(key) => {
                self.ctx.aad_mut().set_record_ordinal(KEY_CHECK_ORDINAL);
                self.ctx.create_key_check(key)?
            }
            None => Vec::new(),
        };

        let (tree_meta_size, data_size) = self.buffer.tree.encrypted_size(&self.ctx);
        let mut tree_meta = BytesMut::with_capacity(tree_meta_size);
        let mut data = BytesMut::with_capacity(data_size);
        self.buffer.tree.create_encrypted(&mut tree_meta, &mut data, &mut self.ctx)?;

        let compressed = self.meta_compressor.compress(&self.buffer.encode_meta(&tree_meta)?)?;
        let meta = match &meta_key {
            Some(key) => {
                self.ctx.aad_mut().set_record_ordinal(BLOCK_META_ORDINAL);
                self.ctx.encrypt(key, Module::BlockMeta, &compressed)?
            }
            None => compressed,
        };

        let header = self.header(meta.len(), key_check);
        let written = self.buffer.finish(out, &header, &meta, &data, fixed_size)?;
        self.next_ordinal += 1;
        self.reset();
        Ok(written)
    }

    fn reset(&mut self) {
        self.buffer.reset();
    }
}

/// Reads blocks written by [`EncryptionBlockWriter`].
///
/// Columns whose key is missing or whose ciphertext does not authenticate
/// come back absent; the rest of the block still decodes.
pub struct EncryptionBlockReader {
    core: ReaderCore,
    settings: EncryptionSettings,
}

impl EncryptionBlockReader {
    /// Reader with the built-in makers.
    pub fn new(options: Options, settings: EncryptionSettings) -> Result<Self> {
        Self::with_registry(options, settings, MakerRegistry::new())
    }

    /// Reader with a custom maker registry.
    pub fn with_registry(options: Options, settings: EncryptionSettings, registry: MakerRegistry) -> Result<Self> {
        Ok(Self { core: ReaderCore::new(options, registry)?, settings })
    }

    fn open_meta(&self, ctx: &mut EncryptionContext, enc: &EncryptionHeader, stored: Vec<u8>) -> Result<Vec<u8>> {
        if enc.key_check.is_empty() {
            return Ok(stored);
        }
        let key = self
            .core
            .options
            .meta_key_name
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("block meta is encrypted but no meta key is configured"))?;
        ctx.aad_mut().set_record_ordinal(KEY_CHECK_ORDINAL);
        ctx.verify_key_check(key, &enc.key_check)?;
        ctx.aad_mut().set_record_ordinal(BLOCK_META_ORDINAL);
        ctx.decrypt(key, Module::BlockMeta, &stored)
    }
}

impl BlockReader for EncryptionBlockReader {
    fn set_filter(&mut self, filter: Option<FilterExpr>) {
        self.core.set_filter(filter);
    }

    fn set_stream(&mut self, input: &mut dyn BlockInput, block_size: usize) -> Result<()> {
        self.core.begin_block();
        let (header, mut consumed) = BlockHeader::read_from(input, true, block_size)?;
        let enc = header
            .encryption
            .clone()
            .ok_or_else(|| Error::corruption("encrypted block header without encryption fields"))?;
        if enc.factory != self.settings.factory.name() {
            return Err(Error::unknown("encryptor", enc.factory));
        }
        let mut ctx = EncryptionContext::new(self.settings.clone(), Aad::new(enc.aad_id.clone(), enc.aad_prefix.clone()));
        ctx.aad_mut().start_block(enc.block_ordinal);

        let stored = self.core.read_meta(input, &header, consumed, block_size)?;
        consumed += stored.len();
        let compressed = self.open_meta(&mut ctx, &enc, stored)?;
        let raw = self.core.decompress_meta(&header, &compressed)?;
        let meta = MetaSection::parse(&raw)?;

        let selection = self.core.select(&meta);
        if let Selection::Skip = selection {
            return self.core.skip_block(input, consumed, block_size);
        }

        let mut plan = ReadPlan::new();
        let mut tree_reader = ByteReader::new(meta.tree_bytes(&raw));
        let mut tree = ColumnBinaryTree::decode_encrypted(
            &mut tree_reader,
            meta.spread_rows.len(),
            self.core.names(),
            selection.spreads(),
            &mut plan,
            &mut ctx,
        )?;
        if tree_reader.remaining() != 0 {
            return Err(Error::corruption(format!("{} trailing meta bytes", tree_reader.remaining())));
        }
        let buffer = self.core.read_data(input, &plan, consumed, block_size)?;
        tree.attach(&buffer, Some(&mut ctx));
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
    use crate::block_index::BlockIndex;
    use crate::column::Column;
    use crate::encrypt::tests::XorFactory;
    use crate::encrypt::KeyStore;
    use std::io::Cursor;

    fn settings(keys: &[&str]) -> EncryptionSettings {
        let mut store = KeyStore::new();
        for (i, key) in keys.iter().enumerate() {
            store.insert(*key, vec![i as u8 + 11, 42]);
        }
        EncryptionSettings::new(Arc::new(XorFactory), store)
    }

    fn options() -> Options {
        Options::default().meta_key_name("meta").column_key("ssn", "pii").aad_prefix("tenant-a")
    }

    fn spread(ids: Vec<Option<i32>>) -> Spread {
        let ssn = ids.iter().map(|id| id.map(|v| format!("ssn-{}", v))).collect();
        Spread::new(ids.len())
            .with_column(Column::integer("id", ids))
            .unwrap()
            .with_column(Column::string("ssn", ssn))
            .unwrap()
    }

    fn write_blocks(blocks: &[Vec<Option<i32>>], block_size: usize) -> Vec<u8> {
        let mut writer = EncryptionBlockWriter::new(options(), settings(&["meta", "pii"])).unwrap();
        let mut out = Vec::new();
        for ids in blocks {
            assert!(writer.append_spread(&spread(ids.clone())).unwrap());
            assert_eq!(writer.write(&mut out, Some(block_size)).unwrap(), block_size);
        }
        out
    }

    #[test]
    fn test_round_trip_two_blocks() {
        let stream = write_blocks(&[vec![Some(1), Some(2)], vec![Some(3)]], 2048);
        assert!(!stream.windows(5).any(|w| w == b"ssn-1"));

        let mut reader = EncryptionBlockReader::new(options(), settings(&["meta", "pii"])).unwrap();
        let mut input = Cursor::new(stream);
        reader.set_stream(&mut input, 2048).unwrap();
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first.column("ssn"), Some(&Column::string("ssn", vec![Some("ssn-1"), Some("ssn-2")])));

        // second block carries ordinal 1; its AAD must still line up
        reader.set_stream(&mut input, 2048).unwrap();
        let second = reader.next().unwrap().unwrap();
        assert_eq!(second.column("id"), Some(&Column::integer("id", vec![Some(3)])));
        assert_eq!(second.column("ssn"), Some(&Column::string("ssn", vec![Some("ssn-3")])));
    }

    #[test]
    fn test_missing_column_key_hides_only_that_column() {
        let stream = write_blocks(&[vec![Some(7)]], 2048);
        let mut reader = EncryptionBlockReader::new(options(), settings(&["meta"])).unwrap();
        reader.set_stream(&mut Cursor::new(stream), 2048).unwrap();
        let spread = reader.next().unwrap().unwrap();
        assert_eq!(spread.column("id"), Some(&Column::integer("id", vec![Some(7)])));
        assert!(spread.column("ssn").is_none());
    }

    #[test]
    fn test_missing_meta_key_is_an_error() {
        let stream = write_blocks(&[vec![Some(7)]], 2048);
        let mut reader = EncryptionBlockReader::new(options(), settings(&["pii"])).unwrap();
        assert!(reader.set_stream(&mut Cursor::new(stream), 2048).is_err());
    }

    #[test]
    fn test_unknown_factory() {
        struct Other;
        impl crate::encrypt::EncryptorFactory for Other {
            fn name(&self) -> &str {
                "other"
            }
            fn create_encryptor(
                &self,
                _key: &[u8],
                _module: Module,
                _aad: &[u8],
            ) -> Result<Box<dyn crate::encrypt::Encryptor>> {
                Err(Error::encryption("unused"))
            }
            fn encrypted_size(&self, _module: Module, plain_len: usize) -> usize {
                plain_len
            }
        }

        let stream = write_blocks(&[vec![Some(7)]], 2048);
        let settings = EncryptionSettings::new(Arc::new(Other), KeyStore::new().with_key("meta", vec![1u8]));
        let mut reader = EncryptionBlockReader::new(options(), settings).unwrap();
        match reader.set_stream(&mut Cursor::new(stream), 2048) {
            Err(Error::UnknownIdentifier { kind: "encryptor", name }) => assert_eq!(name, "xor"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_writer_rejects_unknown_keys() {
        let result = EncryptionBlockWriter::new(options(), settings(&["meta"]));
        assert!(matches!(result, Err(Error::UnknownIdentifier { kind: "key", .. })));
    }

    #[test]
    fn test_size_estimate_matches_write() {
        let mut writer =
            EncryptionBlockWriter::new(options().meta_compressor("none"), settings(&["meta", "pii"])).unwrap();
        writer.append_spread(&spread(vec![Some(1), None])).unwrap();
        let estimate = writer.size().unwrap();
        assert_eq!(writer.write(&mut Vec::new(), None).unwrap(), estimate);
    }

    #[test]
    fn test_keyed_columns_stay_out_of_block_index() {
        let mut writer = EncryptionBlockWriter::new(options(), settings(&["meta", "pii"])).unwrap();
        writer.append_spread(&spread(vec![Some(1), Some(2)])).unwrap();
        let index = writer.buffer.block_index();
        assert_eq!(index.child("ssn").and_then(|n| n.index()), Some(&BlockIndex::Unsupported));
        assert!(matches!(index.child("id").and_then(|n| n.index()), Some(BlockIndex::LongRange(_))));
    }

    #[test]
    fn test_block_skip_on_encrypted_block() {
        let stream = write_blocks(&[vec![Some(10), Some(20)]], 2048);
        let mut reader = EncryptionBlockReader::new(options(), settings(&["meta", "pii"])).unwrap();
        reader.set_filter(Some(FilterExpr::column("id", crate::filter::Filter::gt(25))));
        let mut input = Cursor::new(stream);
        reader.set_stream(&mut input, 2048).unwrap();
        assert!(!reader.has_next());
        assert_eq!(input.position(), 2048);
        assert_eq!(reader.stats().blocks_skipped, 1);
    }
}
