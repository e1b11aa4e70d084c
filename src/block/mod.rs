//! Block reader and writer.
//!
//! A block holds a run of spreads. Its layout is:
//!
//! ```text
//! [header bytes][i32 header binary length][header binary][meta][data][zero padding]
//! ```
//!
//! The header bytes belong to the caller (see [`BlockWriter::append_header`])
//! and are consumed by the caller before [`BlockReader::set_stream`]. The
//! header binary names the meta compressor and the meta length, plus the AAD
//! and key-check material on the encrypted path. The meta (after decryption
//! and decompression) holds the spread row counts, the block index and the
//! column binary tree; the data section holds the column payloads.
//!
//! Readers evaluate the block index before touching data: a block that
//! cannot match is stepped over with [`BlockInput::skip`], and otherwise
//! only the planned payload ranges are read, in ascending order.

mod encrypted;
mod header;
mod reader;
mod writer;

pub use encrypted::{EncryptionBlockReader, EncryptionBlockWriter};
pub use header::{BlockHeader, EncryptionHeader};
pub use reader::PushdownBlockReader;
pub use writer::PushdownBlockWriter;

use crate::column::{ColumnBinary, Spread};
use crate::error::{Error, Result};
use crate::filter::FilterExpr;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};

/// A forward-only byte source that can skip without reading.
pub trait BlockInput: Read {
    /// Advance `n` bytes. Skipping past the end is an error.
    fn skip(&mut self, n: u64) -> Result<()>;
}

fn seek_forward<S: Seek>(inner: &mut S, n: u64) -> Result<()> {
    let offset = i64::try_from(n).map_err(|_| Error::invalid_argument(format!("skip of {} bytes", n)))?;
    inner.seek(SeekFrom::Current(offset))?;
    Ok(())
}

impl BlockInput for File {
    fn skip(&mut self, n: u64) -> Result<()> {
        seek_forward(self, n)
    }
}

impl<R: Read + Seek> BlockInput for BufReader<R> {
    fn skip(&mut self, n: u64) -> Result<()> {
        let offset = i64::try_from(n).map_err(|_| Error::invalid_argument(format!("skip of {} bytes", n)))?;
        self.seek_relative(offset)?;
        Ok(())
    }
}

impl<T: AsRef<[u8]>> BlockInput for Cursor<T> {
    fn skip(&mut self, n: u64) -> Result<()> {
        let len = self.get_ref().as_ref().len() as u64;
        let target = self.position().saturating_add(n);
        if target > len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("skip to {} past end of {} bytes", target, len),
            )
            .into());
        }
        self.set_position(target);
        Ok(())
    }
}

/// Adapter for sources that cannot seek; skipping reads and discards.
#[derive(Debug)]
pub struct StreamInput<R> {
    inner: R,
}

impl<R: Read> StreamInput<R> {
    /// Wrap a stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for StreamInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> BlockInput for StreamInput<R> {
    fn skip(&mut self, n: u64) -> Result<()> {
        let skipped = io::copy(&mut self.inner.by_ref().take(n), &mut io::sink())?;
        if skipped != n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after skipping {} of {} bytes", skipped, n),
            )
            .into());
        }
        Ok(())
    }
}

/// Running totals for one reader, across blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Spreads returned by `next`.
    pub spreads_read: u64,
    /// Rows in those spreads.
    pub rows_read: u64,
    /// Bytes read from the input, header binary and meta included.
    pub bytes_read: u64,
    /// Bytes stepped over with `skip`.
    pub bytes_skipped: u64,
    /// Blocks whose data section was consulted.
    pub blocks_read: u64,
    /// Blocks skipped entirely by the block index.
    pub blocks_skipped: u64,
}

/// Push side of the block protocol.
///
/// `append_header* -> {can_append -> append}* -> write -> ...`; after
/// `write` the writer is empty and ready for the next block.
pub trait BlockWriter {
    /// Caller-owned bytes written ahead of the header binary.
    fn append_header(&mut self, bytes: &[u8]);

    /// Encode a spread's columns with the writer's makers and compressors.
    fn encode_spread(&self, spread: &Spread) -> Result<Vec<ColumnBinary>>;

    /// Encode and append `spread` if it fits; returns whether it was appended.
    fn append_spread(&mut self, spread: &Spread) -> Result<bool> {
        let binaries = self.encode_spread(spread)?;
        if !self.can_append(&binaries)? {
            return Ok(false);
        }
        self.append(spread.row_count(), binaries)?;
        Ok(true)
    }

    /// Whether `spread` fits in the current block, without mutating state.
    ///
    /// Fails with [`Error::BlockSizeExceeded`] when the spread's data alone
    /// exceeds the block size, since it could never fit.
    fn can_append(&self, spread: &[ColumnBinary]) -> Result<bool>;

    /// Add a spread of `row_count` rows.
    fn append(&mut self, row_count: usize, spread: Vec<ColumnBinary>) -> Result<()>;

    /// Estimated size of the block if written now.
    fn size(&self) -> Result<usize>;

    /// Spreads appended since the last write.
    fn spread_count(&self) -> usize;

    /// Whether no spread has been appended since the last write.
    fn is_empty(&self) -> bool {
        self.spread_count() == 0
    }

    /// Serialize the block, zero padding to `fixed_size` when given, and
    /// reset. Returns the bytes written.
    fn write(&mut self, out: &mut dyn Write, fixed_size: Option<usize>) -> Result<usize>;

    /// Drop everything buffered for the current block.
    fn reset(&mut self);

    /// Release the writer's buffers.
    fn close(&mut self) {
        self.reset();
    }
}

/// Pull side of the block protocol.
///
/// `set_stream -> {has_next -> next}* -> set_stream ... -> close`.
pub trait BlockReader {
    /// Filter consulted against each block's index; `None` reads everything.
    fn set_filter(&mut self, filter: Option<FilterExpr>);

    /// Consume one block of `block_size` bytes from `input`, counted from
    /// the input's current position (the caller's header bytes already
    /// consumed). On return the input sits at the start of the next block.
    fn set_stream(&mut self, input: &mut dyn BlockInput, block_size: usize) -> Result<()>;

    /// Whether another spread of the current block is available.
    fn has_next(&self) -> bool;

    /// Decode the next selected spread.
    fn next(&mut self) -> Result<Option<Spread>>;

    /// Totals so far.
    fn stats(&self) -> &ReaderStats;

    /// Drop the current block and reset statistics.
    fn close(&mut self);
}
