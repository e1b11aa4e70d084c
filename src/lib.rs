//! # spreadblock - A Columnar Block Format with Predicate Pushdown
//!
//! spreadblock stores batches of rows ("spreads") column by column inside
//! self-describing blocks. Each block carries a block index of per-column
//! range and flag summaries, so a reader can skip whole blocks, or read
//! only the spreads and columns it needs, before touching payload bytes.
//!
//! ## Architecture
//!
//! - **Filters**: typed predicates over numbers, strings and flags
//! - **Cell Index**: row-level predicate evaluation over dictionary columns
//! - **Block Index**: per-spread min/max and flag summaries for pruning
//! - **Makers**: pluggable column codecs, looked up by identifier
//! - **Column Binary Tree**: nested column payloads laid out per block
//! - **Block Reader/Writer**: plain and encryption-aware block codecs
//!
//! ## Example Usage
//!
//! ```rust
//! use spreadblock::block::{BlockReader, BlockWriter, PushdownBlockReader, PushdownBlockWriter};
//! use spreadblock::column::{Column, Spread};
//! use spreadblock::filter::{Filter, FilterExpr};
//! use spreadblock::Options;
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), spreadblock::Error> {
//! let options = Options::default().block_size(64 * 1024);
//! let mut writer = PushdownBlockWriter::new(options.clone())?;
//! let spread = Spread::new(2).with_column(Column::integer("id", vec![Some(10), Some(20)]))?;
//! writer.append_spread(&spread)?;
//!
//! let mut block = Vec::new();
//! let size = writer.write(&mut block, None)?;
//!
//! let mut reader = PushdownBlockReader::new(options)?;
//! reader.set_filter(Some(FilterExpr::column("id", Filter::gt(25))));
//! reader.set_stream(&mut Cursor::new(block), size)?;
//! assert!(!reader.has_next());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod block_index;
pub mod codec;
pub mod column;
pub mod compress;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod filter;
pub mod index;
pub mod maker;
pub mod tree;

// Re-exports
pub use block::{
    BlockInput, BlockReader, BlockWriter, EncryptionBlockReader, EncryptionBlockWriter, PushdownBlockReader,
    PushdownBlockWriter, ReaderStats, StreamInput,
};
pub use column::{Column, ColumnBinary, ColumnType, Spread};
pub use config::Options;
pub use error::{Error, Result};
pub use filter::{Filter, FilterExpr};
