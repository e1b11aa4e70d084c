//! Min/max summary indexes.
//!
//! A range index holds only the bounds of a column chunk. It can prove
//! that no row matches, but never that any row does: the outcome is
//! always `DefinitelyEmpty` or `Undecided`, even when `min == max` equals
//! the target.

use super::{CellFilterResult, CellIndex};
use crate::filter::{Filter, NumberFilterKind, NumberPrimitive, StringFilter};

/// `[min, max]` summary of a numeric column chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeIndex<T> {
    min: T,
    max: T,
}

/// Range index over `i8`.
pub type RangeByteIndex = RangeIndex<i8>;
/// Range index over `i16`.
pub type RangeShortIndex = RangeIndex<i16>;
/// Range index over `i32`.
pub type RangeIntegerIndex = RangeIndex<i32>;
/// Range index over `i64`.
pub type RangeLongIndex = RangeIndex<i64>;
/// Range index over `f32`.
pub type RangeFloatIndex = RangeIndex<f32>;
/// Range index over `f64`.
pub type RangeDoubleIndex = RangeIndex<f64>;

impl<T: NumberPrimitive> RangeIndex<T> {
    /// Summarize a chunk whose non-null values lie in `[min, max]`.
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Lower bound.
    pub fn min(&self) -> T {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> T {
        self.max
    }

    /// Whether the summary proves that no value satisfies `filter`.
    ///
    /// `None` when the filter kind or target cannot be evaluated here.
    pub fn excludes(&self, filter: &Filter) -> Option<bool> {
        match filter {
            Filter::Number(nf) => {
                let target = T::from_number(&nf.value)?;
                let empty = match nf.kind {
                    NumberFilterKind::Equal => target < self.min || self.max < target,
                    NumberFilterKind::Lt => target <= self.min,
                    NumberFilterKind::Le => target < self.min,
                    NumberFilterKind::Gt => self.max <= target,
                    NumberFilterKind::Ge => self.max < target,
                    NumberFilterKind::NotEqual => return None,
                };
                Some(empty)
            }
            Filter::NumberRange(range) => {
                if range.invert {
                    return None;
                }
                let min = T::from_number(&range.min)?;
                let max = T::from_number(&range.max)?;
                let below = if range.min_inclusive { self.max < min } else { self.max <= min };
                let above = if range.max_inclusive { max < self.min } else { max <= self.min };
                Some(below || above)
            }
            _ => None,
        }
    }
}

impl<T: NumberPrimitive> CellIndex for RangeIndex<T> {
    fn filter(&self, filter: &Filter, _mask: &mut [bool]) -> CellFilterResult {
        match self.excludes(filter) {
            Some(true) => CellFilterResult::DefinitelyEmpty,
            _ => CellFilterResult::Undecided,
        }
    }
}

/// `[min, max]` summary of a string column chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeStringIndex {
    min: String,
    max: String,
}

impl RangeStringIndex {
    /// Summarize a chunk whose non-null values lie in `[min, max]`.
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self { min: min.into(), max: max.into() }
    }

    /// Whether the summary proves that no value satisfies `filter`.
    pub fn excludes(&self, filter: &Filter) -> Option<bool> {
        match filter {
            Filter::String(StringFilter::Perfect(target)) => {
                Some(target.as_str() < self.min.as_str() || self.max.as_str() < target.as_str())
            }
            Filter::String(StringFilter::Forward(prefix)) => {
                // every string with this prefix sorts at or after the prefix and
                // before any larger string that does not share it
                let all_below = self.max.as_str() < prefix.as_str();
                let all_above = self.min.as_str() > prefix.as_str() && !self.min.starts_with(prefix.as_str());
                Some(all_below || all_above)
            }
            _ => None,
        }
    }
}

impl CellIndex for RangeStringIndex {
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

    const EMPTY: CellFilterResult = CellFilterResult::DefinitelyEmpty;
    const UNDECIDED: CellFilterResult = CellFilterResult::Undecided;

    fn eval<I: CellIndex>(index: &I, filter: &Filter) -> CellFilterResult {
        let mut mask = vec![false; 4];
        let result = index.filter(filter, &mut mask);
        assert!(mask.iter().all(|m| !m), "range index must not touch the mask");
        result
    }

    #[test]
    fn test_number_boundaries() {
        let index = RangeIntegerIndex::new(10, 20);
        let table: &[(Filter, CellFilterResult)] = &[
            (Filter::eq(9), EMPTY),
            (Filter::eq(10), UNDECIDED),
            (Filter::eq(20), UNDECIDED),
            (Filter::eq(21), EMPTY),
            (Filter::lt(10), EMPTY),
            (Filter::lt(11), UNDECIDED),
            (Filter::le(9), EMPTY),
            (Filter::le(10), UNDECIDED),
            (Filter::gt(20), EMPTY),
            (Filter::gt(19), UNDECIDED),
            (Filter::ge(21), EMPTY),
            (Filter::ge(20), UNDECIDED),
            (Filter::ne(15), UNDECIDED),
        ];
        for (filter, expected) in table {
            assert_eq!(eval(&index, filter), *expected, "{:?}", filter);
        }
    }

    #[test]
    fn test_range_inclusivity_cases() {
        let index = RangeIntegerIndex::new(10, 20);
        // filter touching the summary's max
        assert_eq!(eval(&index, &Filter::range(20, true, 30, true)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::range(20, false, 30, true)), EMPTY);
        assert_eq!(eval(&index, &Filter::range(20, true, 30, false)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::range(20, false, 30, false)), EMPTY);
        // filter touching the summary's min
        assert_eq!(eval(&index, &Filter::range(0, true, 10, true)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::range(0, true, 10, false)), EMPTY);
        assert_eq!(eval(&index, &Filter::range(0, false, 10, true)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::range(0, false, 10, false)), EMPTY);
        // containment either way
        assert_eq!(eval(&index, &Filter::range(12, false, 18, false)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::range(0, false, 30, false)), UNDECIDED);
    }

    #[test]
    fn test_point_range_never_matches_positively() {
        let index = RangeDoubleIndex::new(5.0, 5.0);
        assert_eq!(eval(&index, &Filter::eq(5.0)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::eq(5.5)), EMPTY);
    }

    #[test]
    fn test_unparsable_target_undecided() {
        let index = RangeByteIndex::new(1, 2);
        assert_eq!(eval(&index, &Filter::eq(1000)), UNDECIDED);
        assert_eq!(eval(&index, &Filter::perfect("1")), UNDECIDED);
    }

    #[test]
    fn test_string_range() {
        let index = RangeStringIndex::new("carrot", "melon");
        assert_eq!(eval(&index, &Filter::perfect("apple")), EMPTY);
        assert_eq!(eval(&index, &Filter::perfect("grape")), UNDECIDED);
        assert_eq!(eval(&index, &Filter::perfect("zucchini")), EMPTY);
        assert_eq!(eval(&index, &Filter::forward("ca")), UNDECIDED);
        assert_eq!(eval(&index, &Filter::forward("b")), EMPTY);
        assert_eq!(eval(&index, &Filter::forward("me")), UNDECIDED);
        assert_eq!(eval(&index, &Filter::forward("n")), EMPTY);
        assert_eq!(eval(&index, &Filter::partial("zz")), UNDECIDED);
    }
}
