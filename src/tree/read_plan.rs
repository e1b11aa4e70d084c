//! Byte ranges to fetch from a block's data section.

use crate::block::BlockInput;
use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};

/// One range of the data section and where it lands in the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReadOffset {
    /// Offset from the start of the data section.
    pub start: u64,
    /// Bytes to read.
    pub length: usize,
    /// Offset in the destination buffer.
    pub dest: usize,
}

/// Ranges collected while decoding a tree, executed as one forward pass.
#[derive(Debug, Clone, Default)]
pub struct ReadPlan {
    offsets: Vec<BlockReadOffset>,
    buffer_len: usize,
}

impl ReadPlan {
    /// An empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `length` bytes at `start`; returns the destination offset.
    pub fn add(&mut self, start: usize, length: usize) -> usize {
        let dest = self.buffer_len;
        if length > 0 {
            self.offsets.push(BlockReadOffset { start: start as u64, length, dest });
        }
        self.buffer_len += length;
        dest
    }

    /// Size of the destination buffer.
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Offset just past the furthest range, from the start of the data section.
    pub fn end(&self) -> u64 {
        self.offsets.iter().map(|o| o.start + o.length as u64).max().unwrap_or(0)
    }

    /// Whether nothing needs reading.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Ranges sorted by source offset, with adjacent ranges merged when
    /// they are also adjacent in the destination.
    pub fn offsets(&self) -> Vec<BlockReadOffset> {
        let mut sorted = self.offsets.clone();
        sorted.sort_by_key(|o| o.start);
        let mut merged: Vec<BlockReadOffset> = Vec::with_capacity(sorted.len());
        for offset in sorted {
            match merged.last_mut() {
                Some(last)
                    if last.start + last.length as u64 == offset.start && last.dest + last.length == offset.dest =>
                {
                    last.length += offset.length;
                }
                _ => merged.push(offset),
            }
        }
        merged
    }

    /// Read every range from `input`, which sits at `*position` bytes into
    /// the data section. `position` is advanced past the last range read.
    pub fn execute(&self, input: &mut dyn BlockInput, position: &mut u64) -> Result<Bytes> {
        let mut buffer = BytesMut::zeroed(self.buffer_len);
        for offset in self.offsets() {
            if offset.start < *position {
                return Err(Error::invalid_state(format!(
                    "read plan goes backwards: range at {} but input is at {}",
                    offset.start, *position
                )));
            }
            input.skip(offset.start - *position)?;
            input.read_exact(&mut buffer[offset.dest..offset.dest + offset.length])?;
            *position = offset.start + offset.length as u64;
        }
        Ok(buffer.freeze())
    }
}
