//! Type-correct comparison for number and string filters.
//!
//! A filter is compiled once per column type into a predicate; cell
//! indexes then apply the predicate to every dictionary entry or row.

use super::{Filter, NumberFilterKind, NumberPrimitive, StringComparator, StringFilter};
use regex::Regex;
use std::collections::HashSet;

/// `(min_inclusive ? v >= min : v > min) && (max_inclusive ? v <= max : v < max)`
pub fn in_range<T: PartialOrd>(value: T, min: T, min_inclusive: bool, max: T, max_inclusive: bool) -> bool {
    let above = if min_inclusive { value >= min } else { value > min };
    let below = if max_inclusive { value <= max } else { value < max };
    above && below
}

/// A number filter narrowed to one primitive type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberPredicate<T> {
    /// The filter cannot be answered for this type.
    Undecided,
    /// No value of this type can match.
    NothingMatches,
    /// Compare against a target.
    Compare(NumberFilterKind, T),
    /// Bounded range.
    Range {
        /// Lower bound.
        min: T,
        /// Whether `min` itself matches.
        min_inclusive: bool,
        /// Upper bound.
        max: T,
        /// Whether `max` itself matches.
        max_inclusive: bool,
    },
}

impl<T: NumberPrimitive> NumberPredicate<T> {
    /// Narrow `filter` to `T`.
    ///
    /// An unparsable target makes EQUAL match nothing and every other
    /// kind undecided. Floating types never decide EQUAL or NOT_EQUAL,
    /// and inverted ranges are never decided.
    pub fn compile(filter: &Filter) -> Self {
        match filter {
            Filter::Number(nf) => {
                if !T::SUPPORTS_EQUALITY
                    && matches!(nf.kind, NumberFilterKind::Equal | NumberFilterKind::NotEqual)
                {
                    return NumberPredicate::Undecided;
                }
                match (T::from_number(&nf.value), nf.kind) {
                    (Some(target), kind) => NumberPredicate::Compare(kind, target),
                    (None, NumberFilterKind::Equal) => NumberPredicate::NothingMatches,
                    (None, _) => NumberPredicate::Undecided,
                }
            }
            Filter::NumberRange(range) => {
                if range.invert {
                    return NumberPredicate::Undecided;
                }
                match (T::from_number(&range.min), T::from_number(&range.max)) {
                    (Some(min), Some(max)) => NumberPredicate::Range {
                        min,
                        min_inclusive: range.min_inclusive,
                        max,
                        max_inclusive: range.max_inclusive,
                    },
                    _ => NumberPredicate::Undecided,
                }
            }
            _ => NumberPredicate::Undecided,
        }
    }

    /// Whether one value satisfies the predicate. Null only satisfies NOT_EQUAL.
    pub fn test(&self, value: Option<T>) -> bool {
        let value = match value {
            Some(v) => v,
            None => return matches!(self, NumberPredicate::Compare(NumberFilterKind::NotEqual, _)),
        };
        match *self {
            NumberPredicate::Compare(kind, target) => match kind {
                NumberFilterKind::Equal => value == target,
                NumberFilterKind::NotEqual => value != target,
                NumberFilterKind::Lt => value < target,
                NumberFilterKind::Le => value <= target,
                NumberFilterKind::Gt => value > target,
                NumberFilterKind::Ge => value >= target,
            },
            NumberPredicate::Range { min, min_inclusive, max, max_inclusive } => {
                in_range(value, min, min_inclusive, max, max_inclusive)
            }
            NumberPredicate::Undecided | NumberPredicate::NothingMatches => false,
        }
    }
}

/// A string filter ready to test values.
#[derive(Debug, Clone, Copy)]
pub enum StringPredicate<'a> {
    /// Not a string filter.
    Undecided,
    /// Equality.
    Perfect(&'a str),
    /// Substring.
    Partial(&'a str),
    /// Prefix.
    Forward(&'a str),
    /// Suffix.
    Backward(&'a str),
    /// Unanchored search.
    Regexp(&'a Regex),
    /// Matches where the comparator does not filter the value out.
    Compare(&'a dyn StringComparator),
    /// Set membership.
    Dictionary(&'a HashSet<String>),
}

impl<'a> StringPredicate<'a> {
    /// Compile a filter; anything that is not a string filter is undecided.
    pub fn compile(filter: &'a Filter) -> Self {
        match filter {
            Filter::String(StringFilter::Perfect(s)) => StringPredicate::Perfect(s),
            Filter::String(StringFilter::Partial(s)) => StringPredicate::Partial(s),
            Filter::String(StringFilter::Forward(s)) => StringPredicate::Forward(s),
            Filter::String(StringFilter::Backward(s)) => StringPredicate::Backward(s),
            Filter::String(StringFilter::Regexp(re)) => StringPredicate::Regexp(re),
            Filter::StringCompare(cmp) => StringPredicate::Compare(cmp.as_ref()),
            Filter::StringDictionary(set) => StringPredicate::Dictionary(set),
            _ => StringPredicate::Undecided,
        }
    }

    /// Whether the predicate can be evaluated at all.
    pub fn is_decidable(&self) -> bool {
        !matches!(self, StringPredicate::Undecided)
    }

    /// Whether one value satisfies the predicate. Null never does.
    pub fn test(&self, value: Option<&str>) -> bool {
        let value = match value {
            Some(v) => v,
            None => return false,
        };
        match self {
            StringPredicate::Undecided => false,
            StringPredicate::Perfect(s) => value == *s,
            StringPredicate::Partial(s) => value.contains(*s),
            StringPredicate::Forward(s) => value.starts_with(*s),
            StringPredicate::Backward(s) => value.ends_with(*s),
            StringPredicate::Regexp(re) => re.is_match(value),
            StringPredicate::Compare(cmp) => !cmp.is_filter_string(value),
            StringPredicate::Dictionary(set) => set.contains(value),
        }
    }
}
