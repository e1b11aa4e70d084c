//! Dictionary cell indexes projected through a row-to-slot array.
//!
//! The dictionary is evaluated once, producing the set of matching slots;
//! rows are then marked by looking their slot up in that set. Columns with
//! few distinct values avoid re-testing the same value for every row.

use super::{CellFilterResult, CellIndex};
use crate::filter::{Filter, NumberPredicate, NumberPrimitive, StringPredicate};
use std::collections::HashSet;
use std::sync::Arc;

fn project(matching: &HashSet<u32>, slots: &[u32], mask: &mut [bool]) -> CellFilterResult {
    if matching.is_empty() {
        return CellFilterResult::DefinitelyEmpty;
    }
    for (row, slot) in slots.iter().enumerate().take(mask.len()) {
        if matching.contains(slot) {
            mask[row] = true;
        }
    }
    CellFilterResult::Matched
}

/// Numeric dictionary plus row slots.
#[derive(Debug, Clone)]
pub struct BufferDirectSequentialNumberCellIndex<T> {
    dictionary: Arc<Vec<Option<T>>>,
    slots: Arc<Vec<u32>>,
}

impl<T: NumberPrimitive> BufferDirectSequentialNumberCellIndex<T> {
    /// Index a dictionary and the slot of every row.
    pub fn new(dictionary: Arc<Vec<Option<T>>>, slots: Arc<Vec<u32>>) -> Self {
        Self { dictionary, slots }
    }

    /// Dictionary slots whose value satisfies `filter`, or `None` if undecidable.
    pub fn matching_slots(&self, filter: &Filter) -> Option<HashSet<u32>> {
        let predicate = NumberPredicate::<T>::compile(filter);
        match predicate {
            NumberPredicate::Undecided => None,
            NumberPredicate::NothingMatches => Some(HashSet::new()),
            _ => Some(
                self.dictionary
                    .iter()
                    .enumerate()
                    .filter(|(_, value)| predicate.test(**value))
                    .map(|(slot, _)| slot as u32)
                    .collect(),
            ),
        }
    }
}

impl<T: NumberPrimitive> CellIndex for BufferDirectSequentialNumberCellIndex<T> {
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult {
        match self.matching_slots(filter) {
            Some(matching) => project(&matching, &self.slots, mask),
            None => CellFilterResult::Undecided,
        }
    }
}

/// String dictionary plus row slots.
#[derive(Debug, Clone)]
pub struct BufferDirectSequentialStringCellIndex {
    dictionary: Arc<Vec<Option<String>>>,
    slots: Arc<Vec<u32>>,
}

impl BufferDirectSequentialStringCellIndex {
    /// Index a dictionary and the slot of every row.
    pub fn new(dictionary: Arc<Vec<Option<String>>>, slots: Arc<Vec<u32>>) -> Self {
        Self { dictionary, slots }
    }

    /// Dictionary slots whose value satisfies `filter`, or `None` if undecidable.
    pub fn matching_slots(&self, filter: &Filter) -> Option<HashSet<u32>> {
        let predicate = StringPredicate::compile(filter);
        if !predicate.is_decidable() {
            return None;
        }
        Some(
            self.dictionary
                .iter()
                .enumerate()
                .filter(|(_, value)| predicate.test(value.as_deref()))
                .map(|(slot, _)| slot as u32)
                .collect(),
        )
    }
}

impl CellIndex for BufferDirectSequentialStringCellIndex {
    fn filter(&self, filter: &Filter, mask: &mut [bool]) -> CellFilterResult {
        match self.matching_slots(filter) {
            Some(matching) => project(&matching, &self.slots, mask),
            None => CellFilterResult::Undecided,
        }
    }
}
