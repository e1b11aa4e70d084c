//! In-memory column model.
//!
//! Primitive columns are dictionary encoded: a dictionary whose slot 0 is
//! always the null slot, plus one slot number per row. Arrays keep a
//! `(start, len)` range per row into an element column; structs keep a row
//! count and their field columns.

mod binary;
mod name_node;

pub use binary::ColumnBinary;
pub use name_node::ColumnNameNode;

use crate::error::{Error, Result};
use crate::filter::{Filter, NumberPrimitive};
use crate::index::{
    BufferDirectSequentialNumberCellIndex, BufferDirectSequentialStringCellIndex, CellFilterResult, CellIndex,
    ChainedCellIndex, FlagBooleanIndex, RangeIndex, RangeStringIndex, SequentialNumberCellIndex,
    SequentialStringCellIndex, UnsupportedCellIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Name of the element column inside an array column.
pub const ARRAY_ELEMENT_NAME: &str = "0";

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// true / false
    Boolean = 0,
    /// i8
    Byte = 1,
    /// i16
    Short = 2,
    /// i32
    Integer = 3,
    /// i64
    Long = 4,
    /// f32
    Float = 5,
    /// f64
    Double = 6,
    /// UTF-8 text
    String = 7,
    /// Variable-length list of one element column
    Array = 8,
    /// Named fields
    Struct = 9,
}

impl ColumnType {
    /// Decode the on-disk tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => ColumnType::Boolean,
            1 => ColumnType::Byte,
            2 => ColumnType::Short,
            3 => ColumnType::Integer,
            4 => ColumnType::Long,
            5 => ColumnType::Float,
            6 => ColumnType::Double,
            7 => ColumnType::String,
            8 => ColumnType::Array,
            9 => ColumnType::Struct,
            _ => return None,
        })
    }

    /// Whether values are stored in a dictionary.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, ColumnType::Array | ColumnType::Struct)
    }
}

/// A value type that can live in a column dictionary.
pub trait DictValue: Clone + PartialEq + Send + Sync + 'static {
    /// Hashable identity used to deduplicate values.
    type Key: Hash + Eq;

    /// The dictionary key of this value.
    fn dict_key(&self) -> Self::Key;
}

macro_rules! dict_value_identity {
    ($($t:ty),*) => {
        $(impl DictValue for $t {
            type Key = $t;

            fn dict_key(&self) -> Self::Key {
                self.clone()
            }
        })*
    };
}

dict_value_identity!(bool, i8, i16, i32, i64, String);

impl DictValue for f32 {
    type Key = u32;

    fn dict_key(&self) -> u32 {
        self.to_bits()
    }
}

impl DictValue for f64 {
    type Key = u64;

    fn dict_key(&self) -> u64 {
        self.to_bits()
    }
}

/// Dictionary-encoded primitive values.
///
/// Equality compares row values, not dictionary layout.
#[derive(Debug, Clone)]
pub struct DictColumn<T> {
    dictionary: Arc<Vec<Option<T>>>,
    slots: Arc<Vec<u32>>,
}

impl<T: DictValue> DictColumn<T> {
    /// Build a dictionary from one value per row.
    pub fn from_values(values: Vec<Option<T>>) -> Self {
        let mut dictionary = vec![None];
        let mut lookup: HashMap<T::Key, u32> = HashMap::new();
        let mut slots = Vec::with_capacity(values.len());
        for value in values {
            let slot = match value {
                None => 0,
                Some(v) => *lookup.entry(v.dict_key()).or_insert_with(|| {
                    dictionary.push(Some(v));
                    (dictionary.len() - 1) as u32
                }),
            };
            slots.push(slot);
        }
        Self { dictionary: Arc::new(dictionary), slots: Arc::new(slots) }
    }

    /// Reassemble from decoded parts, checking every slot.
    pub fn from_parts(dictionary: Vec<Option<T>>, slots: Vec<u32>) -> Result<Self> {
        if let Some(bad) = slots.iter().find(|s| **s as usize >= dictionary.len()) {
            return Err(Error::corruption(format!(
                "dictionary slot {} out of range for {} entries",
                bad,
                dictionary.len()
            )));
        }
        Ok(Self { dictionary: Arc::new(dictionary), slots: Arc::new(slots) })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value at `row`; `None` for null or out of range.
    pub fn get(&self, row: usize) -> Option<&T> {
        let slot = *self.slots.get(row)?;
        self.dictionary.get(slot as usize)?.as_ref()
    }

    /// Dictionary entries, slot order.
    pub fn dictionary(&self) -> &Arc<Vec<Option<T>>> {
        &self.dictionary
    }

    /// Slot of every row.
    pub fn slots(&self) -> &Arc<Vec<u32>> {
        &self.slots
    }

    /// Expand to one value per row.
    pub fn values(&self) -> Vec<Option<T>> {
        self.slots
            .iter()
            .map(|s| self.dictionary.get(*s as usize).cloned().flatten())
            .collect()
    }

    /// Keep only the listed rows, in the listed order.
    pub fn select(&self, rows: &[u32]) -> Result<Self> {
        let slots = rows
            .iter()
            .map(|r| {
                self.slots
                    .get(*r as usize)
                    .copied()
                    .ok_or_else(|| Error::corruption(format!("load index row {} out of range", r)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dictionary: Arc::clone(&self.dictionary), slots: Arc::new(slots) })
    }

    // Sharing only pays off when some dictionary entry covers several rows.
    fn shares_values(&self) -> bool {
        self.dictionary.len() < self.slots.len()
    }
}

impl<T: DictValue> PartialEq for DictColumn<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && (0..self.len()).all(|row| self.get(row) == other.get(row))
    }
}

/// Per-row element ranges over an element column.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayColumn {
    ranges: Vec<Option<(u32, u32)>>,
    element: Box<Column>,
}

impl ArrayColumn {
    /// Build from `(start, len)` per row; `None` is a null array.
    pub fn new(ranges: Vec<Option<(u32, u32)>>, element: Column) -> Result<Self> {
        let available = element.row_count() as u64;
        for (start, len) in ranges.iter().flatten() {
            if *start as u64 + *len as u64 > available {
                return Err(Error::corruption(format!(
                    "array range {}+{} exceeds {} elements",
                    start, len, available
                )));
            }
        }
        Ok(Self { ranges, element: Box::new(element) })
    }

    /// Element range of `row`.
    pub fn range(&self, row: usize) -> Option<(u32, u32)> {
        self.ranges.get(row).copied().flatten()
    }

    /// Every row's range.
    pub fn ranges(&self) -> &[Option<(u32, u32)>] {
        &self.ranges
    }

    /// The element column.
    pub fn element(&self) -> &Column {
        &self.element
    }
}

/// Named fields sharing one row count.
#[derive(Debug, Clone, PartialEq)]
pub struct StructColumn {
    row_count: usize,
    fields: Vec<Column>,
}

impl StructColumn {
    /// Field columns, in insertion order.
    pub fn fields(&self) -> &[Column] {
        &self.fields
    }

    /// Field by name.
    pub fn field(&self, name: &str) -> Option<&Column> {
        self.fields.iter().find(|c| c.name == name)
    }
}

/// Column payload by type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Booleans.
    Boolean(DictColumn<bool>),
    /// 8-bit integers.
    Byte(DictColumn<i8>),
    /// 16-bit integers.
    Short(DictColumn<i16>),
    /// 32-bit integers.
    Integer(DictColumn<i32>),
    /// 64-bit integers.
    Long(DictColumn<i64>),
    /// 32-bit floats.
    Float(DictColumn<f32>),
    /// 64-bit floats.
    Double(DictColumn<f64>),
    /// Strings.
    String(DictColumn<String>),
    /// Arrays.
    Array(ArrayColumn),
    /// Structs.
    Struct(StructColumn),
}

/// A named column of one spread.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name, unique among siblings.
    pub name: String,
    /// Values.
    pub data: ColumnData,
}

macro_rules! primitive_constructor {
    ($($fn_name:ident: $t:ty => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("A ", stringify!($variant), " column from one value per row.")]
            pub fn $fn_name(name: impl Into<String>, values: Vec<Option<$t>>) -> Self {
                Self { name: name.into(), data: ColumnData::$variant(DictColumn::from_values(values)) }
            }
        )*
    };
}

impl Column {
    primitive_constructor!(
        boolean: bool => Boolean,
        byte: i8 => Byte,
        short: i16 => Short,
        integer: i32 => Integer,
        long: i64 => Long,
        float: f32 => Float,
        double: f64 => Double,
    );

    /// A string column from one value per row.
    pub fn string<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        let values = values.into_iter().map(|v| v.map(Into::into)).collect();
        Self { name: name.into(), data: ColumnData::String(DictColumn::from_values(values)) }
    }

    /// An array column from per-row lengths over `element`.
    pub fn array(name: impl Into<String>, lengths: Vec<Option<u32>>, element: Column) -> Result<Self> {
        let mut next = 0u32;
        let ranges = lengths
            .into_iter()
            .map(|len| {
                len.map(|len| {
                    let start = next;
                    next += len;
                    (start, len)
                })
            })
            .collect();
        let element = Column { name: ARRAY_ELEMENT_NAME.to_string(), ..element };
        Ok(Self { name: name.into(), data: ColumnData::Array(ArrayColumn::new(ranges, element)?) })
    }

    /// A string array column, one list per row.
    pub fn string_array(name: impl Into<String>, rows: Vec<Option<Vec<&str>>>) -> Result<Self> {
        let lengths = rows.iter().map(|r| r.as_ref().map(|v| v.len() as u32)).collect();
        let elements = rows.into_iter().flatten().flatten().map(Some).collect();
        Self::array(name, lengths, Column::string(ARRAY_ELEMENT_NAME, elements))
    }

    /// A struct column; every field must have `row_count` rows.
    pub fn structure(name: impl Into<String>, row_count: usize, fields: Vec<Column>) -> Result<Self> {
        let name = name.into();
        for field in &fields {
            if field.row_count() != row_count {
                return Err(Error::invalid_argument(format!(
                    "field {}.{} has {} rows, expected {}",
                    name,
                    field.name,
                    field.row_count(),
                    row_count
                )));
            }
        }
        Ok(Self { name, data: ColumnData::Struct(StructColumn { row_count, fields }) })
    }

    /// Reassemble a decoded struct without re-checking field lengths.
    pub(crate) fn decoded_struct(name: String, row_count: usize, fields: Vec<Column>) -> Self {
        Self { name, data: ColumnData::Struct(StructColumn { row_count, fields }) }
    }

    /// Logical type.
    pub fn column_type(&self) -> ColumnType {
        match &self.data {
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Byte(_) => ColumnType::Byte,
            ColumnData::Short(_) => ColumnType::Short,
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Long(_) => ColumnType::Long,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Double(_) => ColumnType::Double,
            ColumnData::String(_) => ColumnType::String,
            ColumnData::Array(_) => ColumnType::Array,
            ColumnData::Struct(_) => ColumnType::Struct,
        }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        match &self.data {
            ColumnData::Boolean(c) => c.len(),
            ColumnData::Byte(c) => c.len(),
            ColumnData::Short(c) => c.len(),
            ColumnData::Integer(c) => c.len(),
            ColumnData::Long(c) => c.len(),
            ColumnData::Float(c) => c.len(),
            ColumnData::Double(c) => c.len(),
            ColumnData::String(c) => c.len(),
            ColumnData::Array(c) => c.ranges.len(),
            ColumnData::Struct(c) => c.row_count,
        }
    }

    /// Whether `row` is null. Struct rows are never null.
    pub fn is_null(&self, row: usize) -> bool {
        fn slot_null<T>(c: &DictColumn<T>, row: usize) -> bool {
            c.slots.get(row).map_or(true, |s| *s == 0)
        }
        match &self.data {
            ColumnData::Boolean(c) => slot_null(c, row),
            ColumnData::Byte(c) => slot_null(c, row),
            ColumnData::Short(c) => slot_null(c, row),
            ColumnData::Integer(c) => slot_null(c, row),
            ColumnData::Long(c) => slot_null(c, row),
            ColumnData::Float(c) => slot_null(c, row),
            ColumnData::Double(c) => slot_null(c, row),
            ColumnData::String(c) => slot_null(c, row),
            ColumnData::Array(c) => c.range(row).is_none(),
            ColumnData::Struct(c) => row >= c.row_count,
        }
    }

    /// Build the cell index for this column: a min/max or flag summary in
    /// front of a per-row index.
    pub fn cell_index(&self) -> Box<dyn CellIndex> {
        match &self.data {
            ColumnData::Boolean(c) => Box::new(FlagBooleanIndex::from_values(c.values().iter())),
            ColumnData::Byte(c) => number_index(c),
            ColumnData::Short(c) => number_index(c),
            ColumnData::Integer(c) => number_index(c),
            ColumnData::Long(c) => number_index(c),
            ColumnData::Float(c) => number_index(c),
            ColumnData::Double(c) => number_index(c),
            ColumnData::String(c) => {
                let rows: Box<dyn CellIndex> = if c.shares_values() {
                    Box::new(BufferDirectSequentialStringCellIndex::new(
                        Arc::clone(&c.dictionary),
                        Arc::clone(&c.slots),
                    ))
                } else {
                    Box::new(SequentialStringCellIndex::new(Arc::new(c.values())))
                };
                let mut present = c.dictionary.iter().flatten();
                match present.next() {
                    Some(first) => {
                        let (min, max) = present.fold((first, first), |(lo, hi), v| {
                            (if v < lo { v } else { lo }, if v > hi { v } else { hi })
                        });
                        Box::new(ChainedCellIndex::new(
                            Box::new(RangeStringIndex::new(min.as_str(), max.as_str())),
                            rows,
                        ))
                    }
                    None => rows,
                }
            }
            ColumnData::Array(_) | ColumnData::Struct(_) => Box::new(UnsupportedCellIndex),
        }
    }

    /// Evaluate one filter to a row mask.
    ///
    /// Returns `None` when neither the cell index nor the raw-value fallback
    /// can answer the filter for this column type.
    pub fn filter(&self, filter: &Filter) -> Option<Vec<bool>> {
        let rows = self.row_count();
        let mut mask = vec![false; rows];
        match self.cell_index().filter(filter, &mut mask) {
            CellFilterResult::Matched => return Some(mask),
            CellFilterResult::DefinitelyEmpty => return Some(vec![false; rows]),
            CellFilterResult::Undecided => {}
        }
        match filter {
            Filter::Null => Some((0..rows).map(|r| self.is_null(r)).collect()),
            Filter::NotNull => Some((0..rows).map(|r| !self.is_null(r)).collect()),
            Filter::Boolean(target) => match &self.data {
                ColumnData::Boolean(c) => Some((0..rows).map(|r| c.get(r) == Some(target)).collect()),
                _ => None,
            },
            _ => None,
        }
    }
}

fn number_index<T: NumberPrimitive + DictValue>(c: &DictColumn<T>) -> Box<dyn CellIndex> {
    let rows: Box<dyn CellIndex> = if c.shares_values() {
        Box::new(BufferDirectSequentialNumberCellIndex::new(Arc::clone(&c.dictionary), Arc::clone(&c.slots)))
    } else {
        Box::new(SequentialNumberCellIndex::new(Arc::new(c.values())))
    };
    match min_max(c.dictionary.iter().flatten().copied()) {
        Some((min, max)) => Box::new(ChainedCellIndex::new(Box::new(RangeIndex::new(min, max)), rows)),
        None => rows,
    }
}

/// Bounds of the comparable values; NaN never satisfies a comparison and is left out.
pub(crate) fn min_max<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<(T, T)> {
    values.filter(|v| v.partial_cmp(v).is_some()).fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((if v < lo { v } else { lo }, if v > hi { v } else { hi })),
    })
}

/// One row group: columns sharing a row count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spread {
    row_count: usize,
    columns: Vec<Column>,
}

impl Spread {
    /// An empty spread of `row_count` rows.
    pub fn new(row_count: usize) -> Self {
        Self { row_count, columns: Vec::new() }
    }

    /// Reassemble a decoded spread.
    pub(crate) fn from_parts(row_count: usize, columns: Vec<Column>) -> Self {
        Self { row_count, columns }
    }

    /// Add a column; its row count must match and its name must be new.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if column.row_count() != self.row_count {
            return Err(Error::invalid_argument(format!(
                "column {} has {} rows, spread has {}",
                column.name,
                column.row_count(),
                self.row_count
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(Error::invalid_argument(format!("duplicate column {}", column.name)));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder-style [`Spread::add_column`].
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// All columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}
