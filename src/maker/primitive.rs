//! Dictionary maker for boolean, numeric and string columns.
//!
//! Payload layout:
//!
//! ```text
//! [stats length: i32][stats][compressed body]
//! body = [dictionary size: i32][values...][row count: i32][slot: u32]*
//! ```
//!
//! The stats prefix stays uncompressed so the writer can update the block
//! index without decompressing the body. The null slot 0 is implicit and
//! not part of the stored dictionary.

use super::{ColumnMaker, MakerOptions, MakerRegistry};
use crate::block_index::{BlockIndex, BlockIndexNode};
use crate::codec::{put_str, ByteReader};
use crate::column::{min_max, Column, ColumnBinary, ColumnData, ColumnType, DictColumn, DictValue};
use crate::compress::get_compressor;
use crate::error::{Error, Result};
use crate::index::FlagBooleanIndex;
use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;

pub(crate) const PRIMITIVE_MAKER_ID: &str = "primitive";

const STATS_NONE: u8 = 0;
const STATS_LONG: u8 = 1;
const STATS_DOUBLE: u8 = 2;
const STATS_STRING: u8 = 3;
const STATS_FLAG: u8 = 4;
const STATS_FLOAT: u8 = 5;

/// Chunk summary stored ahead of the compressed body.
#[derive(Debug, Clone, PartialEq)]
enum ColumnStats {
    None,
    Long(i64, i64),
    Float(f32, f32),
    Double(f64, f64),
    String(String, String),
    Flag(FlagBooleanIndex),
}

impl ColumnStats {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            ColumnStats::None => buf.put_u8(STATS_NONE),
            ColumnStats::Long(min, max) => {
                buf.put_u8(STATS_LONG);
                buf.put_i64(*min);
                buf.put_i64(*max);
            }
            ColumnStats::Float(min, max) => {
                buf.put_u8(STATS_FLOAT);
                buf.put_f32(*min);
                buf.put_f32(*max);
            }
            ColumnStats::Double(min, max) => {
                buf.put_u8(STATS_DOUBLE);
                buf.put_f64(*min);
                buf.put_f64(*max);
            }
            ColumnStats::String(min, max) => {
                buf.put_u8(STATS_STRING);
                put_str(buf, min);
                put_str(buf, max);
            }
            ColumnStats::Flag(flags) => {
                buf.put_u8(STATS_FLAG);
                buf.put_u8(flags.has_true as u8);
                buf.put_u8(flags.has_false as u8);
                buf.put_u8(flags.has_null as u8);
            }
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(match reader.read_u8()? {
            STATS_NONE => ColumnStats::None,
            STATS_LONG => ColumnStats::Long(reader.read_i64()?, reader.read_i64()?),
            STATS_FLOAT => ColumnStats::Float(
                f32::from_bits(reader.read_i32()? as u32),
                f32::from_bits(reader.read_i32()? as u32),
            ),
            STATS_DOUBLE => ColumnStats::Double(
                f64::from_bits(reader.read_i64()? as u64),
                f64::from_bits(reader.read_i64()? as u64),
            ),
            STATS_STRING => ColumnStats::String(reader.read_string()?, reader.read_string()?),
            STATS_FLAG => ColumnStats::Flag(FlagBooleanIndex::new(
                reader.read_u8()? != 0,
                reader.read_u8()? != 0,
                reader.read_u8()? != 0,
            )),
            tag => return Err(Error::corruption(format!("unknown stats tag {}", tag))),
        })
    }

    /// Summary for one spread. `ColumnStats::None` becomes the all-null
    /// marker of the column's range kind.
    fn to_block_index(&self, column_type: ColumnType, spread: u32) -> BlockIndex {
        match (column_type, self) {
            (ColumnType::Boolean, ColumnStats::Flag(flags)) => BlockIndex::Flag(BTreeMap::from([(spread, *flags)])),
            (ColumnType::Float, ColumnStats::Float(min, max)) => {
                BlockIndex::FloatRange(BTreeMap::from([(spread, Some((*min, *max)))]))
            }
            (ColumnType::Float, ColumnStats::None) => BlockIndex::FloatRange(BTreeMap::from([(spread, None)])),
            (ColumnType::Double, ColumnStats::Double(min, max)) => {
                BlockIndex::DoubleRange(BTreeMap::from([(spread, Some((*min, *max)))]))
            }
            (ColumnType::Double, ColumnStats::None) => BlockIndex::DoubleRange(BTreeMap::from([(spread, None)])),
            (ColumnType::String, ColumnStats::String(min, max)) => {
                BlockIndex::StringRange(BTreeMap::from([(spread, Some((min.clone(), max.clone())))]))
            }
            (ColumnType::String, ColumnStats::None) => BlockIndex::StringRange(BTreeMap::from([(spread, None)])),
            (
                ColumnType::Byte | ColumnType::Short | ColumnType::Integer | ColumnType::Long,
                ColumnStats::Long(min, max),
            ) => BlockIndex::LongRange(BTreeMap::from([(spread, Some((*min, *max)))])),
            (ColumnType::Byte | ColumnType::Short | ColumnType::Integer | ColumnType::Long, ColumnStats::None) => {
                BlockIndex::LongRange(BTreeMap::from([(spread, None)]))
            }
            // stats that do not fit the declared type
            _ => BlockIndex::Unsupported,
        }
    }
}

/// Value types the primitive maker can store.
trait PrimitiveValue: DictValue + Sized {
    fn put(&self, buf: &mut BytesMut);
    fn read(reader: &mut ByteReader<'_>) -> Result<Self>;
    fn stats(column: &DictColumn<Self>) -> ColumnStats;
    fn wrap(column: DictColumn<Self>) -> ColumnData;
}

macro_rules! integer_value {
    ($($t:ty => $variant:ident, $put:ident, $read:ident);* $(;)?) => {
        $(impl PrimitiveValue for $t {
            fn put(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }

            fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
                Ok(reader.$read()? as $t)
            }

            fn stats(column: &DictColumn<Self>) -> ColumnStats {
                match min_max(column.dictionary().iter().flatten().copied()) {
                    Some((min, max)) => ColumnStats::Long(min as i64, max as i64),
                    None => ColumnStats::None,
                }
            }

            fn wrap(column: DictColumn<Self>) -> ColumnData {
                ColumnData::$variant(column)
            }
        })*
    };
}

integer_value!(
    i8 => Byte, put_i8, read_u8;
    i16 => Short, put_i16, read_i16;
    i32 => Integer, put_i32, read_i32;
    i64 => Long, put_i64, read_i64;
);

impl PrimitiveValue for f32 {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32(self.to_bits());
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(f32::from_bits(reader.read_i32()? as u32))
    }

    fn stats(column: &DictColumn<Self>) -> ColumnStats {
        match min_max(column.dictionary().iter().flatten().copied()) {
            Some((min, max)) => ColumnStats::Float(min, max),
            None => ColumnStats::None,
        }
    }

    fn wrap(column: DictColumn<Self>) -> ColumnData {
        ColumnData::Float(column)
    }
}

impl PrimitiveValue for f64 {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64(self.to_bits());
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(f64::from_bits(reader.read_i64()? as u64))
    }

    fn stats(column: &DictColumn<Self>) -> ColumnStats {
        match min_max(column.dictionary().iter().flatten().copied()) {
            Some((min, max)) => ColumnStats::Double(min, max),
            None => ColumnStats::None,
        }
    }

    fn wrap(column: DictColumn<Self>) -> ColumnData {
        ColumnData::Double(column)
    }
}

impl PrimitiveValue for bool {
    fn put(&self, buf: &mut BytesMut) {
        buf.put_u8(*self as u8);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(reader.read_u8()? != 0)
    }

    fn stats(column: &DictColumn<Self>) -> ColumnStats {
        ColumnStats::Flag(FlagBooleanIndex::from_values(column.values().iter()))
    }

    fn wrap(column: DictColumn<Self>) -> ColumnData {
        ColumnData::Boolean(column)
    }
}

impl PrimitiveValue for String {
    fn put(&self, buf: &mut BytesMut) {
        put_str(buf, self);
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        reader.read_string()
    }

    fn stats(column: &DictColumn<Self>) -> ColumnStats {
        let mut present = column.dictionary().iter().flatten();
        match present.next() {
            Some(first) => {
                let (min, max) = present.fold((first, first), |(lo, hi), v| {
                    (if v < lo { v } else { lo }, if v > hi { v } else { hi })
                });
                ColumnStats::String(min.clone(), max.clone())
            }
            None => ColumnStats::None,
        }
    }

    fn wrap(column: DictColumn<Self>) -> ColumnData {
        ColumnData::String(column)
    }
}

fn encode_dict<T: PrimitiveValue>(
    name: &str,
    column_type: ColumnType,
    column: &DictColumn<T>,
    options: &MakerOptions,
) -> Result<ColumnBinary> {
    let dictionary = column.dictionary();
    let mut body = BytesMut::new();
    body.put_i32((dictionary.len() - 1) as i32);
    for value in dictionary.iter().skip(1) {
        match value {
            Some(v) => v.put(&mut body),
            None => return Err(Error::invalid_state(format!("column {} has a null outside slot 0", name))),
        }
    }
    body.put_i32(column.len() as i32);
    for slot in column.slots().iter() {
        body.put_u32(*slot);
    }

    let mut stats = BytesMut::new();
    T::stats(column).encode(&mut stats);
    let compressed = options.compressor.compress(&body)?;

    let mut payload = BytesMut::with_capacity(4 + stats.len() + compressed.len());
    payload.put_i32(stats.len() as i32);
    payload.put_slice(&stats);
    payload.put_slice(&compressed);

    let mut binary = ColumnBinary::new(
        name,
        PRIMITIVE_MAKER_ID,
        options.compressor.name(),
        column_type,
        column.len() as u32,
        payload.freeze(),
    );
    binary.raw_data_size = body.len() as u32;
    binary.cardinality = (dictionary.len() - 1) as u32;
    Ok(binary)
}

fn decode_dict<T: PrimitiveValue>(binary: &ColumnBinary, body: &[u8]) -> Result<Column> {
    let mut reader = ByteReader::new(body);
    let size = reader.read_len()?;
    // counts come from the payload; let a bogus one fail on read, not allocate
    let mut dictionary = Vec::with_capacity(size.min(reader.remaining()) + 1);
    dictionary.push(None);
    for _ in 0..size {
        dictionary.push(Some(T::read(&mut reader)?));
    }
    let rows = reader.read_len()?;
    let mut slots = Vec::with_capacity(rows.min(reader.remaining() / 4));
    for _ in 0..rows {
        slots.push(reader.read_i32()? as u32);
    }
    let mut column = DictColumn::from_parts(dictionary, slots)?;
    if let Some(rows) = &binary.load_index {
        column = column.select(rows)?;
    }
    Ok(Column { name: binary.column_name.clone(), data: T::wrap(column) })
}

fn split_payload(payload: &[u8]) -> Result<(ColumnStats, &[u8])> {
    let mut reader = ByteReader::new(payload);
    let stats = ColumnStats::decode(&mut ByteReader::new(reader.read_len_prefixed()?))?;
    let body = &payload[reader.position()..];
    Ok((stats, body))
}

/// Dictionary maker for every primitive column type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimitiveMaker;

impl ColumnMaker for PrimitiveMaker {
    fn id(&self) -> &str {
        PRIMITIVE_MAKER_ID
    }

    fn encode(&self, column: &Column, options: &MakerOptions, _registry: &MakerRegistry) -> Result<ColumnBinary> {
        let name = column.name.as_str();
        let column_type = column.column_type();
        match &column.data {
            ColumnData::Boolean(c) => encode_dict(name, column_type, c, options),
            ColumnData::Byte(c) => encode_dict(name, column_type, c, options),
            ColumnData::Short(c) => encode_dict(name, column_type, c, options),
            ColumnData::Integer(c) => encode_dict(name, column_type, c, options),
            ColumnData::Long(c) => encode_dict(name, column_type, c, options),
            ColumnData::Float(c) => encode_dict(name, column_type, c, options),
            ColumnData::Double(c) => encode_dict(name, column_type, c, options),
            ColumnData::String(c) => encode_dict(name, column_type, c, options),
            ColumnData::Array(_) | ColumnData::Struct(_) => Err(Error::invalid_argument(format!(
                "primitive maker cannot encode {:?} column {}",
                column_type, name
            ))),
        }
    }

    fn decode(&self, binary: &ColumnBinary, _registry: &MakerRegistry) -> Result<Column> {
        let (_, compressed) = split_payload(binary.payload()?)?;
        let body = get_compressor(&binary.compressor)?.decompress(compressed)?;
        match binary.column_type {
            ColumnType::Boolean => decode_dict::<bool>(binary, &body),
            ColumnType::Byte => decode_dict::<i8>(binary, &body),
            ColumnType::Short => decode_dict::<i16>(binary, &body),
            ColumnType::Integer => decode_dict::<i32>(binary, &body),
            ColumnType::Long => decode_dict::<i64>(binary, &body),
            ColumnType::Float => decode_dict::<f32>(binary, &body),
            ColumnType::Double => decode_dict::<f64>(binary, &body),
            ColumnType::String => decode_dict::<String>(binary, &body),
            other => Err(Error::corruption(format!(
                "primitive binary {} has type {:?}",
                binary.column_name, other
            ))),
        }
    }

    fn set_block_index_node(
        &self,
        node: &mut BlockIndexNode,
        binary: &ColumnBinary,
        spread: u32,
        _registry: &MakerRegistry,
    ) -> Result<()> {
        let (stats, _) = split_payload(binary.payload()?)?;
        node.child_mut(&binary.column_name)
            .set_index(stats.to_block_index(binary.column_type, spread));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionType;
    use crate::filter::{Filter, FilterExpr};
    use std::sync::Arc;

    fn options() -> MakerOptions {
        MakerOptions { compressor: Arc::new(CompressionType::default()) }
    }

    fn round_trip(column: Column) -> Column {
        let registry = MakerRegistry::new();
        let binary = PrimitiveMaker.encode(&column, &options(), &registry).unwrap();
        assert_eq!(binary.maker_id, PRIMITIVE_MAKER_ID);
        PrimitiveMaker.decode(&binary, &registry).unwrap()
    }

    #[test]
    fn test_every_primitive_type_decodes() {
        let columns = vec![
            Column::boolean("b", vec![Some(true), None, Some(false)]),
            Column::byte("i8", vec![Some(-3), Some(7), None]),
            Column::short("i16", vec![Some(300), None, Some(300)]),
            Column::integer("i32", vec![None, Some(70_000), Some(-1)]),
            Column::long("i64", vec![Some(i64::MAX), Some(i64::MIN), None]),
            Column::float("f32", vec![Some(1.5), None, Some(-0.25)]),
            Column::double("f64", vec![Some(2.5), Some(f64::MAX), None]),
            Column::string("s", vec![Some("x"), None, Some("")]),
        ];
        for column in columns {
            assert_eq!(round_trip(column.clone()), column);
        }
    }

    #[test]
    fn test_load_index_selects_rows() {
        let registry = MakerRegistry::new();
        let column = Column::integer("id", vec![Some(1), Some(2), Some(3)]);
        let mut binary = PrimitiveMaker.encode(&column, &options(), &registry).unwrap();
        binary.load_index = Some(vec![2, 0]);
        let decoded = PrimitiveMaker.decode(&binary, &registry).unwrap();
        assert_eq!(decoded, Column::integer("id", vec![Some(3), Some(1)]));
    }

    #[test]
    fn test_stats_feed_block_index() {
        let registry = MakerRegistry::new();
        let mut node = BlockIndexNode::new();
        let first = PrimitiveMaker
            .encode(&Column::integer("id", vec![Some(10), None]), &options(), &registry)
            .unwrap();
        let second = PrimitiveMaker
            .encode(&Column::integer("id", vec![Some(20), Some(22)]), &options(), &registry)
            .unwrap();
        PrimitiveMaker.set_block_index_node(&mut node, &first, 0, &registry).unwrap();
        PrimitiveMaker.set_block_index_node(&mut node, &second, 1, &registry).unwrap();

        let expr = FilterExpr::column("id", Filter::gt(15));
        assert_eq!(node.get_block_spread_index(&expr, 2), Some(vec![1]));
        let expr = FilterExpr::column("id", Filter::gt(25));
        assert_eq!(node.get_block_spread_index(&expr, 2), Some(vec![]));
    }

    #[test]
    fn test_float_summary_keeps_single_precision() {
        let registry = MakerRegistry::new();
        let mut node = BlockIndexNode::new();
        let binary = PrimitiveMaker
            .encode(&Column::float("f", vec![Some(1.1), Some(1.3)]), &options(), &registry)
            .unwrap();
        PrimitiveMaker.set_block_index_node(&mut node, &binary, 0, &registry).unwrap();
        assert_eq!(
            node.child("f").and_then(|n| n.index()),
            Some(&BlockIndex::FloatRange(BTreeMap::from([(0, Some((1.1f32, 1.3f32)))])))
        );
        let expr = FilterExpr::column("f", Filter::ge(1.3));
        assert_eq!(node.get_block_spread_index(&expr, 1), Some(vec![0]));
    }

    #[test]
    fn test_all_null_column_has_null_marker() {
        let registry = MakerRegistry::new();
        let mut node = BlockIndexNode::new();
        let binary = PrimitiveMaker
            .encode(&Column::string("s", vec![None::<&str>, None]), &options(), &registry)
            .unwrap();
        assert_eq!(binary.cardinality, 0);
        PrimitiveMaker.set_block_index_node(&mut node, &binary, 0, &registry).unwrap();
        assert_eq!(
            node.child("s").and_then(|n| n.index()),
            Some(&BlockIndex::StringRange(BTreeMap::from([(0, None)])))
        );
        let expr = FilterExpr::column("s", Filter::perfect("a"));
        assert_eq!(node.get_block_spread_index(&expr, 1), Some(vec![]));
    }

    #[test]
    fn test_unknown_compressor_on_decode() {
        let registry = MakerRegistry::new();
        let mut binary = PrimitiveMaker
            .encode(&Column::integer("id", vec![Some(1)]), &options(), &registry)
            .unwrap();
        binary.compressor = "zstd-like".to_string();
        assert!(matches!(
            PrimitiveMaker.decode(&binary, &registry),
            Err(Error::UnknownIdentifier { kind: "compressor", .. })
        ));
    }
}
