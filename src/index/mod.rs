//! Cell indexes: per-column structures that answer row membership for a
//! filter without decoding values.
//!
//! Every index reports one of three outcomes. `Matched` means the caller's
//! mask now has the matching rows set. `DefinitelyEmpty` means no row can
//! match and the mask was left untouched. `Undecided` means this index
//! cannot answer the filter and the caller must fall back to a more
//! general evaluation.

pub mod buffer_direct;
pub mod flag;
pub mod range;
pub mod sequential;

pub use buffer_direct::{BufferDirectSequentialNumberCellIndex, BufferDirectSequentialStringCellIndex};
pub use flag::FlagBooleanIndex;
pub use range::{
    RangeByteIndex, RangeDoubleIndex, RangeFloatIndex, RangeIndex, RangeIntegerIndex, RangeLongIndex,
    RangeShortIndex, RangeStringIndex,
};
pub use sequential::{SequentialNumberCellIndex, SequentialStringCellIndex};

use crate::filter::Filter;

/// Outcome of evaluating a filter against a cell index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFilterResult {
    /// The index cannot answer this filter.
    Undecided,
    /// No row can match; the mask is unchanged.
    DefinitelyEmpty,
    /// Matching rows were set to `true` in the mask.
    Matched,
}

/// Row-membership index over one column.
pub trait CellIndex: Send + Sync {
    /// Evaluate `filter`, setting matched rows in `mask`.
    ///
    /// `mask` is owned by the caller and is conventionally all `false`.
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult;
}

/// A coarse summary index consulted before a per-row index.
pub struct ChainedCellIndex {
    coarse: Box<dyn CellIndex>,
    rows: Box<dyn CellIndex>,
}

impl ChainedCellIndex {
    /// Chain a summary index in front of a row index.
    pub fn new(coarse: Box<dyn CellIndex>, rows: Box<dyn CellIndex>) -> Self {
        Self { coarse, rows }
    }
}

impl CellIndex for ChainedCellIndex {
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult {
        match self.coarse.filter(filter, mask) {
            CellFilterResult::DefinitelyEmpty => CellFilterResult::DefinitelyEmpty,
            _ => self.rows.filter(filter, mask),
        }
    }
}

/// Index that never decides anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCellIndex;

impl CellIndex for UnsupportedCellIndex {
    fn filter(&self, _filter: &Filter, _mask: &mut [bool]) -> CellFilterResult {
        CellFilterResult::Undecided
    }
}
