//! Full-scan cell indexes over one value per row.

use super::{CellFilterResult, CellIndex};
use crate::filter::{Filter, NumberPredicate, NumberPrimitive, StringPredicate};
use std::sync::Arc;

/// Scans per-row numeric values.
#[derive(Debug, Clone)]
pub struct SequentialNumberCellIndex<T> {
    values: Arc<Vec<Option<T>>>,
}

impl<T: NumberPrimitive> SequentialNumberCellIndex<T> {
    /// Index one value (or null) per row.
    pub fn new(values: Arc<Vec<Option<T>>>) -> Self {
        Self { values }
    }
}

impl<T: NumberPrimitive> CellIndex for SequentialNumberCellIndex<T> {
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult {
        let predicate = NumberPredicate::<T>::compile(filter);
        match predicate {
            NumberPredicate::Undecided => CellFilterResult::Undecided,
            NumberPredicate::NothingMatches => CellFilterResult::DefinitelyEmpty,
            _ => {
                for (row, value) in self.values.iter().enumerate().take(mask.len()) {
                    if predicate.test(*value) {
                        mask[row] = true;
                    }
                }
                CellFilterResult::Matched
            }
        }
    }
}

/// Scans per-row string values.
#[derive(Debug, Clone)]
pub struct SequentialStringCellIndex {
    values: Arc<Vec<Option<String>>>,
}

impl SequentialStringCellIndex {
    /// Index one string (or null) per row.
    pub fn new(values: Arc<Vec<Option<String>>>) -> Self {
        Self { values }
    }
}

impl CellIndex for SequentialStringCellIndex {
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult {
        let predicate = StringPredicate::compile(filter);
        if !predicate.is_decidable() {
            return CellFilterResult::Undecided;
        }
        for (row, value) in self.values.iter().enumerate().take(mask.len()) {
            if predicate.test(value.as_deref()) {
                mask[row] = true;
            }
        }
        CellFilterResult::Matched
    }
}
