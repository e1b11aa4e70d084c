//! Makers for array and struct columns.
//!
//! Both keep their own payload small and carry the nested columns as
//! child binaries, so the column binary tree can store (and a reader can
//! skip) every nested column independently.

use super::{compose_load_index, ColumnMaker, MakerOptions, MakerRegistry};
use crate::block_index::BlockIndexNode;
use crate::codec::ByteReader;
use crate::column::{ArrayColumn, Column, ColumnBinary, ColumnData, ColumnType, ARRAY_ELEMENT_NAME};
use crate::compress::{get_compressor, CompressionType};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub(crate) const ARRAY_MAKER_ID: &str = "array";
pub(crate) const STRUCT_MAKER_ID: &str = "struct";

/// Arrays: per-row `(start, len)` ranges plus one element child.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayMaker;

impl ColumnMaker for ArrayMaker {
    fn id(&self) -> &str {
        ARRAY_MAKER_ID
    }

    fn encode(&self, column: &Column, options: &MakerOptions, registry: &MakerRegistry) -> Result<ColumnBinary> {
        let array = match &column.data {
            ColumnData::Array(array) => array,
            _ => return Err(Error::invalid_argument(format!("{} is not an array column", column.name))),
        };
        let mut body = BytesMut::new();
        body.put_i32(array.ranges().len() as i32);
        for range in array.ranges() {
            match range {
                Some((start, len)) => {
                    body.put_i32(*start as i32);
                    body.put_i32(*len as i32);
                }
                None => {
                    body.put_i32(-1);
                    body.put_i32(0);
                }
            }
        }
        let compressed = options.compressor.compress(&body)?;
        let mut binary = ColumnBinary::new(
            column.name.as_str(),
            ARRAY_MAKER_ID,
            options.compressor.name(),
            ColumnType::Array,
            array.ranges().len() as u32,
            Bytes::from(compressed),
        );
        binary.raw_data_size = body.len() as u32;
        binary.children = vec![registry.encode(array.element(), options)?];
        Ok(binary)
    }

    fn decode(&self, binary: &ColumnBinary, registry: &MakerRegistry) -> Result<Column> {
        let body = get_compressor(&binary.compressor)?.decompress(binary.payload()?)?;
        let mut reader = ByteReader::new(&body);
        let rows = reader.read_len()?;
        let mut ranges = Vec::with_capacity(rows.min(reader.remaining() / 8));
        for _ in 0..rows {
            let start = reader.read_i32()?;
            let len = reader.read_i32()?;
            ranges.push(if start < 0 { None } else { Some((start as u32, len as u32)) });
        }
        if let Some(rows) = &binary.load_index {
            ranges = rows
                .iter()
                .map(|r| {
                    ranges
                        .get(*r as usize)
                        .copied()
                        .ok_or_else(|| Error::corruption(format!("load index row {} out of range", r)))
                })
                .collect::<Result<Vec<_>>>()?;
        }

        let element = binary
            .children
            .iter()
            .find(|c| c.column_name == ARRAY_ELEMENT_NAME)
            .ok_or_else(|| Error::corruption(format!("array {} has no element binary", binary.column_name)))?;
        let element = registry.decode(element)?;
        Ok(Column { name: binary.column_name.clone(), data: ColumnData::Array(ArrayColumn::new(ranges, element)?) })
    }

    fn set_block_index_node(
        &self,
        node: &mut BlockIndexNode,
        binary: &ColumnBinary,
        _spread: u32,
        _registry: &MakerRegistry,
    ) -> Result<()> {
        node.child_mut(&binary.column_name).mark_unsupported();
        Ok(())
    }
}

/// Structs: a row count plus one child per field.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructMaker;

impl ColumnMaker for StructMaker {
    fn id(&self) -> &str {
        STRUCT_MAKER_ID
    }

    fn encode(&self, column: &Column, options: &MakerOptions, registry: &MakerRegistry) -> Result<ColumnBinary> {
        let fields = match &column.data {
            ColumnData::Struct(s) => s.fields(),
            _ => return Err(Error::invalid_argument(format!("{} is not a struct column", column.name))),
        };
        let rows = column.row_count() as u32;
        let mut body = BytesMut::with_capacity(4);
        body.put_u32(rows);
        let mut binary = ColumnBinary::new(
            column.name.as_str(),
            STRUCT_MAKER_ID,
            CompressionType::None.name(),
            ColumnType::Struct,
            rows,
            body.freeze(),
        );
        binary.raw_data_size = 4;
        binary.children = fields.iter().map(|f| registry.encode(f, options)).collect::<Result<_>>()?;
        Ok(binary)
    }

    fn decode(&self, binary: &ColumnBinary, registry: &MakerRegistry) -> Result<Column> {
        let stored_rows = ByteReader::new(binary.payload()?).read_len()?;
        let row_count = binary.load_index.as_ref().map_or(stored_rows, Vec::len);
        let mut fields = Vec::with_capacity(binary.children.len());
        for child in &binary.children {
            // fields the reader did not ask for arrive without bytes
            if child.binary.is_none() {
                continue;
            }
            let load_index = compose_load_index(binary.load_index.as_deref(), child.load_index.as_deref())?;
            let field = if load_index == child.load_index {
                registry.decode(child)?
            } else {
                registry.decode(&ColumnBinary { load_index, ..child.clone() })?
            };
            fields.push(field);
        }
        Ok(Column::decoded_struct(binary.column_name.clone(), row_count, fields))
    }

    fn set_block_index_node(
        &self,
        node: &mut BlockIndexNode,
        binary: &ColumnBinary,
        spread: u32,
        registry: &MakerRegistry,
    ) -> Result<()> {
        let node = node.child_mut(&binary.column_name);
        for child in &binary.children {
            registry.set_block_index_node(node, child, spread)?;
        }
        Ok(())
    }
}
