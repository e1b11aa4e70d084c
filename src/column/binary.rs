//! One column's encoded payload for one spread.

use super::ColumnType;
use crate::codec::{bytes_size, put_str, ByteReader};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Encoded column payload plus the metadata needed to decode it.
///
/// On the write path `binary` holds the maker's output. On the read path a
/// binary is first rebuilt from its meta bytes with `binary` unset, and the
/// reader later points it at the shared data buffer filled by the read plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinary {
    /// Column name, unique among siblings.
    pub column_name: String,
    /// Maker that produced the payload and can decode it.
    pub maker_id: String,
    /// Short-cut name of the payload compressor.
    pub compressor: String,
    /// Logical type.
    pub column_type: ColumnType,
    /// Rows in this spread.
    pub row_count: u32,
    /// Uncompressed payload size.
    pub raw_data_size: u32,
    /// Distinct non-null values.
    pub cardinality: u32,
    /// Offset of the payload inside `binary`.
    pub binary_start: usize,
    /// Payload length.
    pub binary_length: usize,
    /// Buffer holding the payload; may be shared with other binaries.
    pub binary: Option<Bytes>,
    /// Nested columns (struct fields, array element).
    pub children: Vec<ColumnBinary>,
    /// Rows to keep when decoding, in order.
    pub load_index: Option<Vec<u32>>,
}

impl ColumnBinary {
    /// A binary owning `payload` outright.
    pub fn new(
        column_name: impl Into<String>,
        maker_id: impl Into<String>,
        compressor: impl Into<String>,
        column_type: ColumnType,
        row_count: u32,
        payload: Bytes,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            maker_id: maker_id.into(),
            compressor: compressor.into(),
            column_type,
            row_count,
            raw_data_size: 0,
            cardinality: 0,
            binary_start: 0,
            binary_length: payload.len(),
            binary: Some(payload),
            children: Vec::new(),
            load_index: None,
        }
    }

    /// The payload slice, or an error if the bytes were never loaded.
    pub fn payload(&self) -> Result<&[u8]> {
        let binary = self
            .binary
            .as_ref()
            .ok_or_else(|| Error::invalid_state(format!("column {} has no loaded binary", self.column_name)))?;
        binary.get(self.binary_start..self.binary_start + self.binary_length).ok_or_else(|| {
            Error::corruption(format!(
                "column {} range {}+{} outside buffer of {} bytes",
                self.column_name,
                self.binary_start,
                self.binary_length,
                binary.len()
            ))
        })
    }

    /// Point this binary at `len` bytes of a shared buffer.
    pub fn set_binary(&mut self, buffer: Bytes, start: usize, len: usize) {
        self.binary = Some(buffer);
        self.binary_start = start;
        self.binary_length = len;
    }

    /// Payload bytes of this binary and every descendant.
    pub fn total_length(&self) -> usize {
        self.binary_length + self.children.iter().map(ColumnBinary::total_length).sum::<usize>()
    }

    /// Encoded length of [`ColumnBinary::to_meta`].
    pub fn meta_size(&self) -> usize {
        bytes_size(self.column_name.len())
            + bytes_size(self.maker_id.len())
            + bytes_size(self.compressor.len())
            + 1
            + 4 * 3
            + 4
            + self.load_index.as_ref().map_or(0, |rows| 4 * rows.len())
    }

    /// Encode everything except the payload and the children.
    pub fn to_meta(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.meta_size());
        put_str(&mut buf, &self.column_name);
        put_str(&mut buf, &self.maker_id);
        put_str(&mut buf, &self.compressor);
        buf.put_u8(self.column_type as u8);
        buf.put_u32(self.row_count);
        buf.put_u32(self.raw_data_size);
        buf.put_u32(self.cardinality);
        match &self.load_index {
            Some(rows) => {
                buf.put_i32(rows.len() as i32);
                for row in rows {
                    buf.put_u32(*row);
                }
            }
            None => buf.put_i32(-1),
        }
        buf.to_vec()
    }

    /// Rebuild a binary from meta bytes. The payload is left unset with
    /// `binary_length` taken from the caller.
    pub fn from_meta(meta: &[u8], binary_length: usize) -> Result<Self> {
        let mut reader = ByteReader::new(meta);
        let column_name = reader.read_string()?;
        let maker_id = reader.read_string()?;
        let compressor = reader.read_string()?;
        let tag = reader.read_u8()?;
        let column_type = ColumnType::from_u8(tag)
            .ok_or_else(|| Error::corruption(format!("unknown column type tag {} for {}", tag, column_name)))?;
        let row_count = reader.read_i32()? as u32;
        let raw_data_size = reader.read_i32()? as u32;
        let cardinality = reader.read_i32()? as u32;
        let load_index = match reader.read_i32()? {
            -1 => None,
            n if n >= 0 => Some((0..n).map(|_| reader.read_i32().map(|r| r as u32)).collect::<Result<Vec<_>>>()?),
            n => return Err(Error::corruption(format!("bad load index count {} for {}", n, column_name))),
        };
        if reader.remaining() != 0 {
            return Err(Error::corruption(format!(
                "{} trailing meta bytes for column {}",
                reader.remaining(),
                column_name
            )));
        }
        Ok(Self {
            column_name,
            maker_id,
            compressor,
            column_type,
            row_count,
            raw_data_size,
            cardinality,
            binary_start: 0,
            binary_length,
            binary: None,
            children: Vec::new(),
            load_index,
        })
    }
}
