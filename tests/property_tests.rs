// Property Tests for spreadblock
// Pruning must never drop a matching row, for integers and floats alike,
// and trees stay rectangular

mod common;

use common::CountingInput;
use proptest::prelude::*;
use spreadblock::block::{BlockReader, BlockWriter, PushdownBlockReader, PushdownBlockWriter};
use spreadblock::column::{Column, ColumnData, Spread};
use spreadblock::filter::{Filter, FilterExpr};
use spreadblock::index::RangeIndex;
use spreadblock::maker::MakerRegistry;
use spreadblock::tree::ColumnBinaryTree;
use spreadblock::Options;

#[derive(Debug, Clone, Copy)]
enum Predicate {
    Eq(i64),
    Lt(i64),
    Le(i64),
    Gt(i64),
    Ge(i64),
    Range(i64, bool, i64, bool),
}

impl Predicate {
    fn filter(self) -> Filter {
        match self {
            Predicate::Eq(v) => Filter::eq(v),
            Predicate::Lt(v) => Filter::lt(v),
            Predicate::Le(v) => Filter::le(v),
            Predicate::Gt(v) => Filter::gt(v),
            Predicate::Ge(v) => Filter::ge(v),
            Predicate::Range(min, min_inc, max, max_inc) => Filter::range(min, min_inc, max, max_inc),
        }
    }

    /// The same predicate over bounds scaled down to tenths.
    fn float_filter(self) -> Filter {
        match self {
            Predicate::Eq(v) => Filter::eq(tenth(v)),
            Predicate::Lt(v) => Filter::lt(tenth(v)),
            Predicate::Le(v) => Filter::le(tenth(v)),
            Predicate::Gt(v) => Filter::gt(tenth(v)),
            Predicate::Ge(v) => Filter::ge(tenth(v)),
            Predicate::Range(min, min_inc, max, max_inc) => Filter::range(tenth(min), min_inc, tenth(max), max_inc),
        }
    }

    fn holds(self, value: i64) -> bool {
        self.holds_with(value, |bound| bound)
    }

    /// Single-precision columns compare against the bound narrowed to f32.
    fn holds_f32(self, value: f32) -> bool {
        self.holds_with(value, |bound| tenth(bound) as f32)
    }

    fn holds_with<T: PartialOrd>(self, value: T, bound: impl Fn(i64) -> T) -> bool {
        match self {
            Predicate::Eq(v) => value == bound(v),
            Predicate::Lt(v) => value < bound(v),
            Predicate::Le(v) => value <= bound(v),
            Predicate::Gt(v) => value > bound(v),
            Predicate::Ge(v) => value >= bound(v),
            Predicate::Range(min, min_inc, max, max_inc) => {
                let above = if min_inc { value >= bound(min) } else { value > bound(min) };
                let below = if max_inc { value <= bound(max) } else { value < bound(max) };
                above && below
            }
        }
    }
}

fn tenth(v: i64) -> f64 {
    v as f64 / 10.0
}

fn predicate() -> impl Strategy<Value = Predicate> {
    let bound = -60i64..60;
    prop_oneof![
        bound.clone().prop_map(Predicate::Eq),
        bound.clone().prop_map(Predicate::Lt),
        bound.clone().prop_map(Predicate::Le),
        bound.clone().prop_map(Predicate::Gt),
        bound.clone().prop_map(Predicate::Ge),
        (bound.clone(), any::<bool>(), bound, any::<bool>())
            .prop_map(|(a, ai, b, bi)| Predicate::Range(a.min(b), ai, a.max(b), bi)),
    ]
}

fn long_values(spread: &Spread) -> Vec<i64> {
    match spread.column("v").map(|c| &c.data) {
        Some(ColumnData::Long(values)) => values.values().into_iter().flatten().collect(),
        other => panic!("unexpected column {:?}", other),
    }
}

fn float_values(spread: &Spread) -> Vec<f32> {
    match spread.column("v").map(|c| &c.data) {
        Some(ColumnData::Float(values)) => values.values().into_iter().flatten().collect(),
        other => panic!("unexpected column {:?}", other),
    }
}

/// Write `spreads` as one block and return what a filtered read keeps.
fn pruned_read(spreads: &[Spread], filter: Filter) -> Vec<Spread> {
    let mut writer = PushdownBlockWriter::new(Options::default()).unwrap();
    for spread in spreads {
        assert!(writer.append_spread(spread).unwrap());
    }
    let mut block = Vec::new();
    let size = writer.write(&mut block, None).unwrap();

    let mut reader = PushdownBlockReader::new(Options::default()).unwrap();
    reader.set_filter(Some(FilterExpr::column("v", filter)));
    reader.set_stream(&mut CountingInput::new(block), size).unwrap();
    let mut kept = Vec::new();
    while let Some(spread) = reader.next().unwrap() {
        kept.push(spread);
    }
    kept
}

proptest! {
    /// A range summary only excludes when no value can match
    #[test]
    fn prop_range_index_exclusion_is_sound(
        values in prop::collection::vec(-50i64..50, 1..40),
        pred in predicate(),
    ) {
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        let index = RangeIndex::new(min, max);
        if index.excludes(&pred.filter()) == Some(true) {
            prop_assert!(values.iter().all(|v| !pred.holds(*v)));
        }
    }

    /// Row-level filtering agrees with direct evaluation
    #[test]
    fn prop_column_filter_matches_values(
        values in prop::collection::vec(prop::option::of(-50i64..50), 0..40),
        pred in predicate(),
    ) {
        let column = Column::long("v", values.clone());
        let mask = column.filter(&pred.filter()).unwrap();
        let expected: Vec<bool> = values.iter().map(|v| v.map_or(false, |v| pred.holds(v))).collect();
        prop_assert_eq!(mask, expected);
    }

    /// Block and spread pruning keep every matching row
    #[test]
    fn prop_pruned_read_keeps_matches(
        spreads in prop::collection::vec(prop::collection::vec(-50i64..50, 1..12), 1..6),
        pred in predicate(),
    ) {
        let written: Vec<Spread> = spreads
            .iter()
            .map(|values| {
                Spread::new(values.len())
                    .with_column(Column::long("v", values.iter().copied().map(Some).collect()))
                    .unwrap()
            })
            .collect();
        let kept: usize = pruned_read(&written, pred.filter())
            .iter()
            .map(|spread| long_values(spread).into_iter().filter(|v| pred.holds(*v)).count())
            .sum();
        let expected = spreads.iter().flatten().filter(|v| pred.holds(**v)).count();
        prop_assert_eq!(kept, expected);
    }

    /// Single-precision summaries keep every row whose value meets the bound
    #[test]
    fn prop_float_pruning_keeps_matches(
        spreads in prop::collection::vec(prop::collection::vec(-50i64..50, 1..12), 1..6),
        pred in predicate(),
    ) {
        let written: Vec<Spread> = spreads
            .iter()
            .map(|values| {
                let floats = values.iter().map(|v| Some(tenth(*v) as f32)).collect();
                Spread::new(values.len()).with_column(Column::float("v", floats)).unwrap()
            })
            .collect();
        let kept: usize = pruned_read(&written, pred.float_filter())
            .iter()
            .map(|spread| float_values(spread).into_iter().filter(|v| pred.holds_f32(*v)).count())
            .sum();
        let expected = spreads.iter().flatten().filter(|v| pred.holds_f32(tenth(**v) as f32)).count();
        prop_assert_eq!(kept, expected);
    }

    /// Every child tree has one slot per spread, whichever columns each spread carries
    #[test]
    fn prop_tree_children_stay_aligned(
        layouts in prop::collection::vec(prop::collection::btree_set(0usize..4, 0..4), 1..10),
    ) {
        let registry = MakerRegistry::new();
        let options = Options::default();
        let mut tree = ColumnBinaryTree::new();
        for (spread, names) in layouts.iter().enumerate() {
            let columns: Vec<Column> = names
                .iter()
                .map(|n| Column::integer(format!("c{}", n), vec![Some(spread as i32)]))
                .collect();
            tree.add_children(registry.encode_columns(&columns, &options).unwrap()).unwrap();
        }

        prop_assert_eq!(tree.child_size(), layouts.len());
        for child in tree.children() {
            prop_assert_eq!(child.size(), layouts.len());
            let index: usize = child.name()[1..].parse().unwrap();
            for (slot, names) in layouts.iter().enumerate() {
                prop_assert_eq!(child.get(slot).is_some(), names.contains(&index));
            }
        }
    }
}
