//! Filters evaluated by cell indexes and block indexes.
//!
//! A [`Filter`] is a single-column predicate. A [`FilterExpr`] combines
//! column filters into the expression handed to a block reader for
//! whole-block and per-spread pruning.

pub mod comparator;
pub mod number;

pub use comparator::{NumberPredicate, StringPredicate};
pub use number::{NumberObj, NumberPrimitive};

use crate::error::Result;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Comparison applied by a [`NumberFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFilterKind {
    /// value == target
    Equal,
    /// value != target
    NotEqual,
    /// value < target
    Lt,
    /// value <= target
    Le,
    /// value > target
    Gt,
    /// value >= target
    Ge,
}

/// Compare a numeric column against one target.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFilter {
    /// Comparison kind.
    pub kind: NumberFilterKind,
    /// Target value.
    pub value: NumberObj,
}

/// Bounded numeric range; each bound carries its own inclusivity.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberRangeFilter {
    /// Lower bound.
    pub min: NumberObj,
    /// Whether the lower bound matches itself.
    pub min_inclusive: bool,
    /// Upper bound.
    pub max: NumberObj,
    /// Whether the upper bound matches itself.
    pub max_inclusive: bool,
    /// Match values outside the range instead.
    pub invert: bool,
}

/// String pattern predicates.
#[derive(Debug, Clone)]
pub enum StringFilter {
    /// Whole-value equality.
    Perfect(String),
    /// Substring.
    Partial(String),
    /// Prefix.
    Forward(String),
    /// Suffix.
    Backward(String),
    /// Unanchored regular expression search.
    Regexp(Regex),
}

/// Decides which strings a STRING_COMPARE filter excludes.
///
/// A row matches when `is_filter_string` returns `false`.
pub trait StringComparator: fmt::Debug + Send + Sync {
    /// Whether `value` is filtered out.
    fn is_filter_string(&self, value: &str) -> bool;
}

/// Built-in comparator over an optionally bounded string range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeStringComparator {
    min: Option<(String, bool)>,
    max: Option<(String, bool)>,
    invert: bool,
}

impl RangeStringComparator {
    /// Keep strings strictly below `bound`.
    pub fn lt(bound: impl Into<String>) -> Self {
        Self { min: None, max: Some((bound.into(), false)), invert: false }
    }

    /// Keep strings at or below `bound`.
    pub fn le(bound: impl Into<String>) -> Self {
        Self { min: None, max: Some((bound.into(), true)), invert: false }
    }

    /// Keep strings strictly above `bound`.
    pub fn gt(bound: impl Into<String>) -> Self {
        Self { min: Some((bound.into(), false)), max: None, invert: false }
    }

    /// Keep strings at or above `bound`.
    pub fn ge(bound: impl Into<String>) -> Self {
        Self { min: Some((bound.into(), true)), max: None, invert: false }
    }

    /// Keep strings inside the range.
    pub fn range(
        min: impl Into<String>,
        min_inclusive: bool,
        max: impl Into<String>,
        max_inclusive: bool,
    ) -> Self {
        Self {
            min: Some((min.into(), min_inclusive)),
            max: Some((max.into(), max_inclusive)),
            invert: false,
        }
    }

    /// Keep strings outside the range instead.
    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    fn contains(&self, value: &str) -> bool {
        let above_min = match &self.min {
            Some((min, true)) => value >= min.as_str(),
            Some((min, false)) => value > min.as_str(),
            None => true,
        };
        let below_max = match &self.max {
            Some((max, true)) => value <= max.as_str(),
            Some((max, false)) => value < max.as_str(),
            None => true,
        };
        above_min && below_max
    }
}

impl StringComparator for RangeStringComparator {
    fn is_filter_string(&self, value: &str) -> bool {
        self.contains(value) == self.invert
    }
}

/// A single-column predicate.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Numeric comparison.
    Number(NumberFilter),
    /// Numeric range.
    NumberRange(NumberRangeFilter),
    /// String pattern.
    String(StringFilter),
    /// Delegated string comparison with inverted polarity.
    StringCompare(Arc<dyn StringComparator>),
    /// String set membership.
    StringDictionary(HashSet<String>),
    /// Boolean equality.
    Boolean(bool),
    /// Value is null.
    Null,
    /// Value is not null.
    NotNull,
}

impl Filter {
    /// Numeric comparison against `value`.
    pub fn number(kind: NumberFilterKind, value: impl Into<NumberObj>) -> Self {
        Filter::Number(NumberFilter { kind, value: value.into() })
    }

    /// value == target
    pub fn eq(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::Equal, value)
    }

    /// value != target
    pub fn ne(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::NotEqual, value)
    }

    /// value < target
    pub fn lt(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::Lt, value)
    }

    /// value <= target
    pub fn le(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::Le, value)
    }

    /// value > target
    pub fn gt(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::Gt, value)
    }

    /// value >= target
    pub fn ge(value: impl Into<NumberObj>) -> Self {
        Self::number(NumberFilterKind::Ge, value)
    }

    /// Numeric range with per-bound inclusivity.
    pub fn range(
        min: impl Into<NumberObj>,
        min_inclusive: bool,
        max: impl Into<NumberObj>,
        max_inclusive: bool,
    ) -> Self {
        Filter::NumberRange(NumberRangeFilter {
            min: min.into(),
            min_inclusive,
            max: max.into(),
            max_inclusive,
            invert: false,
        })
    }

    /// Whole-string equality.
    pub fn perfect(value: impl Into<String>) -> Self {
        Filter::String(StringFilter::Perfect(value.into()))
    }

    /// Substring match.
    pub fn partial(value: impl Into<String>) -> Self {
        Filter::String(StringFilter::Partial(value.into()))
    }

    /// Prefix match.
    pub fn forward(value: impl Into<String>) -> Self {
        Filter::String(StringFilter::Forward(value.into()))
    }

    /// Suffix match.
    pub fn backward(value: impl Into<String>) -> Self {
        Filter::String(StringFilter::Backward(value.into()))
    }

    /// Regular expression search.
    pub fn regexp(pattern: &str) -> Result<Self> {
        Ok(Filter::String(StringFilter::Regexp(Regex::new(pattern)?)))
    }

    /// Delegated comparator; rows the comparator does not filter out match.
    pub fn string_compare(comparator: impl StringComparator + 'static) -> Self {
        Filter::StringCompare(Arc::new(comparator))
    }

    /// Membership in a set of strings.
    pub fn string_dictionary<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::StringDictionary(values.into_iter().map(Into::into).collect())
    }

    /// Whether a null value can never satisfy this filter.
    pub fn rejects_null(&self) -> bool {
        match self {
            Filter::Number(nf) => nf.kind != NumberFilterKind::NotEqual,
            Filter::NumberRange(r) => !r.invert,
            Filter::Null => false,
            _ => true,
        }
    }
}

/// Filter expression over named columns.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    /// One filter on one column, addressed by nested path.
    Column {
        /// Column path from the top level down.
        path: Vec<String>,
        /// The predicate.
        filter: Filter,
    },
    /// All children must match.
    And(Vec<FilterExpr>),
    /// Any child may match.
    Or(Vec<FilterExpr>),
    /// Negation.
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Filter a column addressed by a dotted path such as `user.name`.
    pub fn column(path: &str, filter: Filter) -> Self {
        FilterExpr::Column { path: path.split('.').map(str::to_string).collect(), filter }
    }
}
