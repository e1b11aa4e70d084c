//! Block header binary.
//!
//! Format, after an i32 length prefix:
//! ```text
//! [compressor name: i32 len + bytes]
//! [meta length: i32]
//! encrypted blocks only:
//! [aad id: i32 len + bytes]
//! [aad prefix: i32 len + bytes]
//! [block ordinal: i16]
//! [encryptor factory name: i32 len + bytes]
//! [key check: i32 len + bytes]
//! ```
//! An empty key check means the meta is stored unencrypted.

use crate::codec::{bytes_size, put_bytes, put_str, ByteReader};
use crate::error::{Error, Result};
use bytes::BufMut;
use std::io::{Read, Write};

/// AAD and key-check material of an encrypted block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionHeader {
    /// Per-file AAD identifier.
    pub aad_id: Vec<u8>,
    /// AAD prefix, possibly empty.
    pub aad_prefix: Vec<u8>,
    /// Ordinal of this block within the file.
    pub block_ordinal: i16,
    /// Short-cut name of the encryptor factory.
    pub factory: String,
    /// Key-check ciphertext; empty when the meta is not encrypted.
    pub key_check: Vec<u8>,
}

/// Decoded header binary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Short-cut name of the meta compressor.
    pub compressor: String,
    /// Stored (compressed, possibly encrypted) meta length.
    pub meta_length: usize,
    /// Present on the encrypted path.
    pub encryption: Option<EncryptionHeader>,
}

impl BlockHeader {
    /// Header binary without the length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        put_str(&mut buf, &self.compressor);
        buf.put_i32(self.meta_length as i32);
        if let Some(enc) = &self.encryption {
            put_bytes(&mut buf, &enc.aad_id);
            put_bytes(&mut buf, &enc.aad_prefix);
            buf.put_i16(enc.block_ordinal);
            put_str(&mut buf, &enc.factory);
            put_bytes(&mut buf, &enc.key_check);
        }
        buf
    }

    /// Length of [`BlockHeader::encode`].
    pub fn encoded_size(&self) -> usize {
        let mut size = bytes_size(self.compressor.len()) + 4;
        if let Some(enc) = &self.encryption {
            size += bytes_size(enc.aad_id.len())
                + bytes_size(enc.aad_prefix.len())
                + 2
                + bytes_size(enc.factory.len())
                + bytes_size(enc.key_check.len());
        }
        size
    }

    /// Decode a header binary; `encrypted` selects the layout.
    pub fn decode(data: &[u8], encrypted: bool) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let compressor = reader.read_string()?;
        let meta_length = reader.read_len()?;
        let encryption = if encrypted {
            Some(EncryptionHeader {
                aad_id: reader.read_len_prefixed()?.to_vec(),
                aad_prefix: reader.read_len_prefixed()?.to_vec(),
                block_ordinal: reader.read_i16()?,
                factory: reader.read_string()?,
                key_check: reader.read_len_prefixed()?.to_vec(),
            })
        } else {
            None
        };
        if reader.remaining() != 0 {
            return Err(Error::corruption(format!("{} trailing header bytes", reader.remaining())));
        }
        Ok(Self { compressor, meta_length, encryption })
    }

    /// Write the length prefix and header binary; returns bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        let encoded = self.encode();
        writer.write_all(&(encoded.len() as i32).to_be_bytes())?;
        writer.write_all(&encoded)?;
        Ok(4 + encoded.len())
    }

    /// Read a length-prefixed header binary of at most `limit` bytes;
    /// returns the header and the bytes consumed.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R, encrypted: bool, limit: usize) -> Result<(Self, usize)> {
        let mut len = [0u8; 4];
        reader.read_exact(&mut len)?;
        let len = i32::from_be_bytes(len);
        let len = usize::try_from(len)
            .ok()
            .filter(|len| 4 + len <= limit)
            .ok_or_else(|| Error::corruption(format!("header length {} does not fit a {} byte block", len, limit)))?;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        Ok((Self::decode(&buf, encrypted)?, 4 + len))
    }
}
