//! Block-level index: per-column, per-spread summaries used to skip whole
//! spreads (or the whole block) before any payload byte is read.
//!
//! The tree mirrors the column hierarchy. Each node may hold one
//! [`BlockIndex`] with an entry per spread ordinal. A range entry of `None`
//! records a spread in which the column held only nulls. A spread with no
//! entry, or a column with no node, was never summarized and cannot be
//! ruled out.

use crate::error::Result;
use crate::filter::{Filter, FilterExpr};
use crate::index::{FlagBooleanIndex, RangeDoubleIndex, RangeFloatIndex, RangeLongIndex, RangeStringIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Summary of one column across the spreads of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockIndex {
    /// The column cannot be summarized; every filter is undecided.
    Unsupported,
    /// Integer bounds per spread; `None` for an all-null spread.
    LongRange(BTreeMap<u32, Option<(i64, i64)>>),
    /// Single precision bounds per spread, compared in `f32`.
    FloatRange(BTreeMap<u32, Option<(f32, f32)>>),
    /// Double precision bounds per spread.
    DoubleRange(BTreeMap<u32, Option<(f64, f64)>>),
    /// String bounds per spread.
    StringRange(BTreeMap<u32, Option<(String, String)>>),
    /// Boolean presence flags per spread.
    Flag(BTreeMap<u32, FlagBooleanIndex>),
}

fn merge_entries<T: Clone>(into: &mut BTreeMap<u32, T>, from: &BTreeMap<u32, T>, widen: impl Fn(&T, &T) -> T) {
    for (spread, entry) in from {
        let merged = match into.get(spread) {
            Some(existing) => widen(existing, entry),
            None => entry.clone(),
        };
        into.insert(*spread, merged);
    }
}

fn widen_ord<T: PartialOrd + Clone>(a: &(T, T), b: &(T, T)) -> (T, T) {
    let min = if b.0 < a.0 { b.0.clone() } else { a.0.clone() };
    let max = if b.1 > a.1 { b.1.clone() } else { a.1.clone() };
    (min, max)
}

fn widen_bounds<T: PartialOrd + Clone>(a: &Option<(T, T)>, b: &Option<(T, T)>) -> Option<(T, T)> {
    match (a, b) {
        (Some(a), Some(b)) => Some(widen_ord(a, b)),
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (None, None) => None,
    }
}

// Undecided when the spread was never summarized.
fn bounds_exclude<T>(
    entries: &BTreeMap<u32, Option<(T, T)>>,
    spread: u32,
    filter: &Filter,
    excludes: impl Fn(&T, &T) -> Option<bool>,
) -> Option<bool> {
    match entries.get(&spread)? {
        Some((min, max)) => excludes(min, max),
        None => Some(filter.rejects_null()),
    }
}

impl BlockIndex {
    /// Fold `other` into this summary.
    ///
    /// Returns `false` when the two summaries are of different kinds; the
    /// caller should then mark the column unsupported.
    pub fn merge(&mut self, other: &BlockIndex) -> bool {
        match (self, other) {
            (BlockIndex::LongRange(a), BlockIndex::LongRange(b)) => merge_entries(a, b, widen_bounds),
            (BlockIndex::FloatRange(a), BlockIndex::FloatRange(b)) => merge_entries(a, b, widen_bounds),
            (BlockIndex::DoubleRange(a), BlockIndex::DoubleRange(b)) => merge_entries(a, b, widen_bounds),
            (BlockIndex::StringRange(a), BlockIndex::StringRange(b)) => merge_entries(a, b, widen_bounds),
            (BlockIndex::Flag(a), BlockIndex::Flag(b)) => merge_entries(a, b, FlagBooleanIndex::union),
            _ => return false,
        }
        true
    }

    // Some(true): no row of the spread can match.
    fn excludes_spread(&self, spread: u32, filter: &Filter) -> Option<bool> {
        match self {
            BlockIndex::Unsupported => None,
            BlockIndex::LongRange(entries) => {
                bounds_exclude(entries, spread, filter, |min, max| RangeLongIndex::new(*min, *max).excludes(filter))
            }
            BlockIndex::FloatRange(entries) => {
                bounds_exclude(entries, spread, filter, |min, max| RangeFloatIndex::new(*min, *max).excludes(filter))
            }
            BlockIndex::DoubleRange(entries) => {
                bounds_exclude(entries, spread, filter, |min, max| RangeDoubleIndex::new(*min, *max).excludes(filter))
            }
            BlockIndex::StringRange(entries) => bounds_exclude(entries, spread, filter, |min, max| {
                RangeStringIndex::new(min.as_str(), max.as_str()).excludes(filter)
            }),
            BlockIndex::Flag(entries) => entries.get(&spread)?.excludes(filter),
        }
    }

    /// Spreads in `0..spread_count` that may contain a match, or `None`
    /// when the filter cannot be decided for every spread.
    pub fn matching_spreads(&self, filter: &Filter, spread_count: u32) -> Option<BTreeSet<u32>> {
        let mut spreads = BTreeSet::new();
        for spread in 0..spread_count {
            if !self.excludes_spread(spread, filter)? {
                spreads.insert(spread);
            }
        }
        Some(spreads)
    }
}

/// Tree of block index summaries, one node per column path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockIndexNode {
    index: Option<BlockIndex>,
    children: BTreeMap<String, BlockIndexNode>,
}

impl BlockIndexNode {
    /// An empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// This node's summary, if any.
    pub fn index(&self) -> Option<&BlockIndex> {
        self.index.as_ref()
    }

    /// Child node by column name.
    pub fn child(&self, name: &str) -> Option<&BlockIndexNode> {
        self.children.get(name)
    }

    /// Child node by column name, created on first use.
    pub fn child_mut(&mut self, name: &str) -> &mut BlockIndexNode {
        self.children.entry(name.to_string()).or_default()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.index.is_none() && self.children.is_empty()
    }

    /// Record a summary, merging with an existing one. Incompatible
    /// summaries turn the node unsupported.
    pub fn set_index(&mut self, index: BlockIndex) {
        match &mut self.index {
            None => self.index = Some(index),
            Some(existing) => {
                if !existing.merge(&index) {
                    log::debug!("block index kinds differ, marking column unsupported");
                    *existing = BlockIndex::Unsupported;
                }
            }
        }
    }

    /// Mark this column as never summarized, dropping any recorded summary.
    pub fn mark_unsupported(&mut self) {
        self.index = Some(BlockIndex::Unsupported);
        self.children.clear();
    }

    /// Fold another tree into this one. Returns `false` if any node had to
    /// be marked unsupported.
    pub fn merge(&mut self, other: &BlockIndexNode) -> bool {
        let mut compatible = true;
        if let Some(index) = &other.index {
            match &mut self.index {
                None => self.index = Some(index.clone()),
                Some(existing) => {
                    if !existing.merge(index) {
                        *existing = BlockIndex::Unsupported;
                        compatible = false;
                    }
                }
            }
        }
        for (name, child) in &other.children {
            compatible &= self.child_mut(name).merge(child);
        }
        compatible
    }

    /// Spread ordinals that may satisfy `expr`.
    ///
    /// `None` means the index cannot decide and every spread must be read;
    /// an empty list means the whole block can be skipped.
    pub fn get_block_spread_index(&self, expr: &FilterExpr, spread_count: u32) -> Option<Vec<u32>> {
        self.evaluate(expr, spread_count).map(|set| set.into_iter().collect())
    }

    fn evaluate(&self, expr: &FilterExpr, spread_count: u32) -> Option<BTreeSet<u32>> {
        match expr {
            FilterExpr::Column { path, filter } => self.column_spreads(path, filter, spread_count),
            FilterExpr::And(children) => {
                let mut decided: Option<BTreeSet<u32>> = None;
                for child in children {
                    if let Some(spreads) = self.evaluate(child, spread_count) {
                        decided = Some(match decided {
                            None => spreads,
                            Some(acc) => acc.intersection(&spreads).copied().collect(),
                        });
                    }
                }
                decided
            }
            FilterExpr::Or(children) => {
                if children.is_empty() {
                    return None;
                }
                let mut spreads = BTreeSet::new();
                for child in children {
                    spreads.extend(self.evaluate(child, spread_count)?);
                }
                Some(spreads)
            }
            FilterExpr::Not(_) => None,
        }
    }

    fn column_spreads(&self, path: &[String], filter: &Filter, spread_count: u32) -> Option<BTreeSet<u32>> {
        let mut node = self;
        for part in path {
            node = node.children.get(part)?;
        }
        node.index.as_ref()?.matching_spreads(filter, spread_count)
    }

    /// Serialize with bincode.
    pub fn to_binary(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize bytes produced by [`BlockIndexNode::to_binary`].
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
