//! Big-endian primitives for header and meta bytes.
//!
//! Writing goes straight through [`BufMut`]; reading goes through
//! [`ByteReader`], which turns every short read into [`Error::Corruption`]
//! instead of panicking the way [`bytes::Buf`] does.

use crate::error::{Error, Result};
use bytes::BufMut;

/// Writes an i32 length followed by the bytes.
pub fn put_bytes<B: BufMut>(buf: &mut B, bytes: &[u8]) {
    buf.put_i32(bytes.len() as i32);
    buf.put_slice(bytes);
}

/// Writes a length-prefixed UTF-8 string.
pub fn put_str<B: BufMut>(buf: &mut B, value: &str) {
    put_bytes(buf, value.as_bytes());
}

/// Encoded size of a length-prefixed byte string.
pub fn bytes_size(len: usize) -> usize {
    4 + len
}

/// Checked cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::corruption(format!(
                "need {} bytes at offset {}, only {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Advance without reading.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a big-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.read_bytes(2)?);
        Ok(i16::from_be_bytes(raw))
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.read_bytes(4)?);
        Ok(i32::from_be_bytes(raw))
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.read_bytes(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    /// Read an i32 that must be a non-negative length or count.
    pub fn read_len(&mut self) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value)
            .map_err(|_| Error::corruption(format!("negative length {} at offset {}", value, self.pos - 4)))
    }

    /// Read a length-prefixed byte string.
    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_bytes(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_len_prefixed()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::corruption(format!("invalid utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_reader_primitives() {
        let mut buf = BytesMut::new();
        buf.put_u8(7);
        buf.put_i16(-2);
        buf.put_i32(1 << 20);
        buf.put_i64(-5);
        put_str(&mut buf, "spread");

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_i32().unwrap(), 1 << 20);
        assert_eq!(reader.read_i64().unwrap(), -5);
        assert_eq!(reader.read_string().unwrap(), "spread");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_short_read_is_corruption() {
        let data = [0u8, 0, 0];
        let mut reader = ByteReader::new(&data);
        assert!(matches!(reader.read_i32(), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_negative_length_is_corruption() {
        let mut buf = BytesMut::new();
        buf.put_i32(-1);
        let mut reader = ByteReader::new(&buf);
        assert!(matches!(reader.read_len_prefixed(), Err(Error::Corruption(_))));
    }
}
