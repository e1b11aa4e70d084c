//! Presence summary for boolean column chunks.

use super::{CellFilterResult, CellIndex};
use crate::filter::Filter;
use serde::{Deserialize, Serialize};

/// Which of `true`, `false` and null occur in a boolean chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBooleanIndex {
    /// At least one `true`.
    pub has_true: bool,
    /// At least one `false`.
    pub has_false: bool,
    /// At least one null.
    pub has_null: bool,
}

impl FlagBooleanIndex {
    /// Build from presence flags.
    pub fn new(has_true: bool, has_false: bool, has_null: bool) -> Self {
        Self { has_true, has_false, has_null }
    }

    /// Summarize a column chunk.
    pub fn from_values<'a, I: IntoIterator<Item = &'a Option<bool>>>(values: I) -> Self {
        let mut index = Self::default();
        for value in values {
            match value {
                Some(true) => index.has_true = true,
                Some(false) => index.has_false = true,
                None => index.has_null = true,
            }
        }
        index
    }

    /// Combine with the summary of another chunk.
    pub fn union(&self, other: &FlagBooleanIndex) -> FlagBooleanIndex {
        FlagBooleanIndex {
            has_true: self.has_true || other.has_true,
            has_false: self.has_false || other.has_false,
            has_null: self.has_null || other.has_null,
        }
    }

    /// Whether the summary proves that no row satisfies `filter`.
    pub fn excludes(&self, filter: &Filter) -> Option<bool> {
        match filter {
            Filter::Boolean(true) => Some(!self.has_true),
            Filter::Boolean(false) => Some(!self.has_false),
            Filter::Null => Some(!self.has_null),
            Filter::NotNull => Some(!self.has_true && !self.has_false),
            _ => None,
        }
    }
}

impl CellIndex for FlagBooleanIndex {
    fn filter(&self, filter: &Filter, _mask: &mut [bool]) -> CellFilterResult {
        match self.excludes(filter) {
            Some(true) => CellFilterResult::DefinitelyEmpty,
            _ => CellFilterResult::Undecided,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(index: &FlagBooleanIndex, filter: &Filter) -> CellFilterResult {
        let mut mask = vec![false; 3];
        index.filter(filter, &mut mask)
    }

    #[test]
    fn test_only_true() {
        let index = FlagBooleanIndex::new(true, false, false);
        assert_eq!(eval(&index, &Filter::Boolean(false)), CellFilterResult::DefinitelyEmpty);
        assert_eq!(eval(&index, &Filter::Boolean(true)), CellFilterResult::Undecided);
        assert_eq!(eval(&index, &Filter::Null), CellFilterResult::DefinitelyEmpty);
    }

    #[test]
    fn test_true_and_false() {
        let index = FlagBooleanIndex::new(true, true, false);
        assert_eq!(eval(&index, &Filter::Boolean(false)), CellFilterResult::Undecided);
        assert_eq!(eval(&index, &Filter::Boolean(true)), CellFilterResult::Undecided);
    }

    #[test]
    fn test_from_values() {
        let index = FlagBooleanIndex::from_values(&[None, Some(false)]);
        assert_eq!(index, FlagBooleanIndex::new(false, true, true));
        assert_eq!(eval(&index, &Filter::Boolean(true)), CellFilterResult::DefinitelyEmpty);
        assert_eq!(eval(&index, &Filter::NotNull), CellFilterResult::Undecided);
        assert_eq!(
            eval(&FlagBooleanIndex::new(false, false, true), &Filter::NotNull),
            CellFilterResult::DefinitelyEmpty
        );
        assert_eq!(eval(&index, &Filter::eq(1)), CellFilterResult::Undecided);
    }
}
