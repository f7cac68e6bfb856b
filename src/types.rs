//! Core columnar data model.
//!
//! A [`Table`] is an ordered list of named, equal-length, nullable [`Column`]s.
//! Tokenization produces tables whose columns are all [`Column::Utf8`]; the
//! cast layer replaces columns one by one with typed storage and attaches
//! semantic metadata to the owning [`Field`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Time resolution for timestamp columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Seconds since the Unix epoch.
    #[serde(rename = "s")]
    Second,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "ms")]
    Millisecond,
    /// Microseconds since the Unix epoch.
    #[serde(rename = "us")]
    Microsecond,
    /// Nanoseconds since the Unix epoch.
    #[serde(rename = "ns")]
    Nanosecond,
}

impl TimeUnit {
    /// Short name as used in semantic metadata (e.g. `date[ns]`).
    pub fn abbrev(&self) -> &'static str {
        match self {
            TimeUnit::Second => "s",
            TimeUnit::Millisecond => "ms",
            TimeUnit::Microsecond => "us",
            TimeUnit::Nanosecond => "ns",
        }
    }

    /// Number of nanoseconds in one unit.
    pub fn nanos(&self) -> i64 {
        match self {
            TimeUnit::Second => 1_000_000_000,
            TimeUnit::Millisecond => 1_000_000,
            TimeUnit::Microsecond => 1_000,
            TimeUnit::Nanosecond => 1,
        }
    }
}

/// Logical data type of a [`Column`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Instant in time with a fixed resolution and optional timezone.
    Timestamp(TimeUnit, Option<String>),
    /// Dictionary-encoded UTF-8 strings.
    Dictionary,
    /// Variable-length list with a single element type.
    List(Box<DataType>),
}

impl DataType {
    /// Type name as used in semantic metadata (e.g. `number[uint8]`).
    pub fn name(&self) -> String {
        match self {
            DataType::Int8 => "int8".to_string(),
            DataType::Int16 => "int16".to_string(),
            DataType::Int32 => "int32".to_string(),
            DataType::Int64 => "int64".to_string(),
            DataType::UInt8 => "uint8".to_string(),
            DataType::UInt16 => "uint16".to_string(),
            DataType::UInt32 => "uint32".to_string(),
            DataType::UInt64 => "uint64".to_string(),
            DataType::Float64 => "float64".to_string(),
            DataType::Bool => "bool".to_string(),
            DataType::Utf8 => "utf8".to_string(),
            DataType::Timestamp(unit, tz) => match tz {
                Some(tz) => format!("timestamp[{}, {tz}]", unit.abbrev()),
                None => format!("timestamp[{}]", unit.abbrev()),
            },
            DataType::Dictionary => "dictionary".to_string(),
            DataType::List(item) => format!("list<{}>", item.name()),
        }
    }

    /// Returns true for any signed or unsigned integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32
                | DataType::UInt64
        )
    }

    /// Returns true for unsigned integer types.
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
        )
    }
}

/// Timestamp storage: epoch offsets in a fixed unit, optional timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampColumn {
    /// Epoch offsets in `unit` resolution.
    pub values: Vec<Option<i64>>,
    /// Resolution of `values`.
    pub unit: TimeUnit,
    /// Timezone the values should be localized to, if known.
    pub tz: Option<String>,
}

/// Dictionary-encoded string storage.
///
/// `keys[i]` indexes into `values`; a `None` key is a null row.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryColumn {
    /// Per-row indexes into `values`.
    pub keys: Vec<Option<u32>>,
    /// Distinct values in first-seen order.
    pub values: Vec<String>,
}

impl DictionaryColumn {
    /// Build a dictionary from nullable strings, keeping first-seen order.
    pub fn encode(strings: &[Option<String>]) -> Self {
        let mut values: Vec<String> = Vec::new();
        let mut lookup: BTreeMap<String, u32> = BTreeMap::new();
        let mut keys = Vec::with_capacity(strings.len());

        for s in strings {
            match s {
                None => keys.push(None),
                Some(s) => {
                    let key = match lookup.get(s.as_str()) {
                        Some(&k) => k,
                        None => {
                            let k = values.len() as u32;
                            values.push(s.clone());
                            lookup.insert(s.clone(), k);
                            k
                        }
                    };
                    keys.push(Some(key));
                }
            }
        }

        Self { keys, values }
    }

    /// Decode back to nullable strings.
    pub fn decode(&self) -> Vec<Option<String>> {
        self.keys
            .iter()
            .map(|k| k.map(|k| self.values[k as usize].clone()))
            .collect()
    }

    /// Number of distinct values.
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }
}

/// List storage: per-row spans into a flat child column.
///
/// Invariants: `offsets.len() == validity.len() + 1`, offsets are
/// non-decreasing, and `child.len() == *offsets.last()`. A null row has
/// `validity[i] == false` and an empty span; an empty list is a valid row
/// with an empty span.
#[derive(Debug, Clone, PartialEq)]
pub struct ListColumn {
    /// Row `i` spans `child[offsets[i]..offsets[i + 1]]`.
    pub offsets: Vec<usize>,
    /// Whether row `i` is a list (true) or null (false).
    pub validity: Vec<bool>,
    /// Flattened elements of all rows.
    pub child: Box<Column>,
}

impl ListColumn {
    /// The element range of row `i`, or `None` for a null row.
    pub fn span(&self, i: usize) -> Option<std::ops::Range<usize>> {
        if self.validity[i] {
            Some(self.offsets[i]..self.offsets[i + 1])
        } else {
            None
        }
    }
}

/// Physical column storage. All variants hold nullable values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int8(Vec<Option<i8>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    UInt8(Vec<Option<u8>>),
    UInt16(Vec<Option<u16>>),
    UInt32(Vec<Option<u32>>),
    UInt64(Vec<Option<u64>>),
    Float64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Utf8(Vec<Option<String>>),
    Timestamp(TimestampColumn),
    Dictionary(DictionaryColumn),
    List(ListColumn),
}

/// Take the first `n` non-null values of a nullable vector.
fn head_valid<T: Clone>(values: &[Option<T>], n: usize) -> Vec<Option<T>> {
    values
        .iter()
        .filter(|v| v.is_some())
        .take(n)
        .cloned()
        .collect()
}

impl Column {
    /// Number of rows (including nulls).
    pub fn len(&self) -> usize {
        match self {
            Column::Int8(v) => v.len(),
            Column::Int16(v) => v.len(),
            Column::Int32(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::UInt8(v) => v.len(),
            Column::UInt16(v) => v.len(),
            Column::UInt32(v) => v.len(),
            Column::UInt64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Utf8(v) => v.len(),
            Column::Timestamp(t) => t.values.len(),
            Column::Dictionary(d) => d.keys.len(),
            Column::List(l) => l.validity.len(),
        }
    }

    /// True if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of null rows.
    pub fn null_count(&self) -> usize {
        fn nulls<T>(values: &[Option<T>]) -> usize {
            values.iter().filter(|v| v.is_none()).count()
        }

        match self {
            Column::Int8(v) => nulls(v),
            Column::Int16(v) => nulls(v),
            Column::Int32(v) => nulls(v),
            Column::Int64(v) => nulls(v),
            Column::UInt8(v) => nulls(v),
            Column::UInt16(v) => nulls(v),
            Column::UInt32(v) => nulls(v),
            Column::UInt64(v) => nulls(v),
            Column::Float64(v) => nulls(v),
            Column::Bool(v) => nulls(v),
            Column::Utf8(v) => nulls(v),
            Column::Timestamp(t) => nulls(&t.values),
            Column::Dictionary(d) => nulls(&d.keys),
            Column::List(l) => l.validity.iter().filter(|v| !**v).count(),
        }
    }

    /// Number of non-null rows.
    pub fn valid_count(&self) -> usize {
        self.len() - self.null_count()
    }

    /// Logical type of the column.
    pub fn data_type(&self) -> DataType {
        match self {
            Column::Int8(_) => DataType::Int8,
            Column::Int16(_) => DataType::Int16,
            Column::Int32(_) => DataType::Int32,
            Column::Int64(_) => DataType::Int64,
            Column::UInt8(_) => DataType::UInt8,
            Column::UInt16(_) => DataType::UInt16,
            Column::UInt32(_) => DataType::UInt32,
            Column::UInt64(_) => DataType::UInt64,
            Column::Float64(_) => DataType::Float64,
            Column::Bool(_) => DataType::Bool,
            Column::Utf8(_) => DataType::Utf8,
            Column::Timestamp(t) => DataType::Timestamp(t.unit, t.tz.clone()),
            Column::Dictionary(_) => DataType::Dictionary,
            Column::List(l) => DataType::List(Box::new(l.child.data_type())),
        }
    }

    /// Borrow the values of a string column, if this is one.
    pub fn as_utf8(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Utf8(v) => Some(v),
            _ => None,
        }
    }

    /// A new column holding the first `n` non-null values of this one.
    ///
    /// Used by the cast layer for cheap sample-based pre-checks.
    pub fn sample_valid(&self, n: usize) -> Column {
        match self {
            Column::Int8(v) => Column::Int8(head_valid(v, n)),
            Column::Int16(v) => Column::Int16(head_valid(v, n)),
            Column::Int32(v) => Column::Int32(head_valid(v, n)),
            Column::Int64(v) => Column::Int64(head_valid(v, n)),
            Column::UInt8(v) => Column::UInt8(head_valid(v, n)),
            Column::UInt16(v) => Column::UInt16(head_valid(v, n)),
            Column::UInt32(v) => Column::UInt32(head_valid(v, n)),
            Column::UInt64(v) => Column::UInt64(head_valid(v, n)),
            Column::Float64(v) => Column::Float64(head_valid(v, n)),
            Column::Bool(v) => Column::Bool(head_valid(v, n)),
            Column::Utf8(v) => Column::Utf8(head_valid(v, n)),
            Column::Timestamp(t) => Column::Timestamp(TimestampColumn {
                values: head_valid(&t.values, n),
                unit: t.unit,
                tz: t.tz.clone(),
            }),
            Column::Dictionary(d) => Column::Dictionary(DictionaryColumn {
                keys: head_valid(&d.keys, n),
                values: d.values.clone(),
            }),
            Column::List(l) => {
                let mut child_ranges = Vec::new();
                for i in 0..l.validity.len() {
                    if !l.validity[i] {
                        continue;
                    }
                    child_ranges.push(l.offsets[i]..l.offsets[i + 1]);
                    if child_ranges.len() == n {
                        break;
                    }
                }
                let mut offsets = vec![0];
                for range in &child_ranges {
                    offsets.push(offsets.last().copied().unwrap_or(0) + range.len());
                }
                let validity = vec![true; child_ranges.len()];
                let child = l.child.take_ranges(&child_ranges);
                Column::List(ListColumn {
                    offsets,
                    validity,
                    child: Box::new(child),
                })
            }
        }
    }

    /// Concatenate the given index ranges into a new column of the same type.
    fn take_ranges(&self, ranges: &[std::ops::Range<usize>]) -> Column {
        fn take<T: Clone>(
            values: &[Option<T>],
            ranges: &[std::ops::Range<usize>],
        ) -> Vec<Option<T>> {
            ranges
                .iter()
                .flat_map(|r| values[r.clone()].iter().cloned())
                .collect()
        }

        match self {
            Column::Int8(v) => Column::Int8(take(v, ranges)),
            Column::Int16(v) => Column::Int16(take(v, ranges)),
            Column::Int32(v) => Column::Int32(take(v, ranges)),
            Column::Int64(v) => Column::Int64(take(v, ranges)),
            Column::UInt8(v) => Column::UInt8(take(v, ranges)),
            Column::UInt16(v) => Column::UInt16(take(v, ranges)),
            Column::UInt32(v) => Column::UInt32(take(v, ranges)),
            Column::UInt64(v) => Column::UInt64(take(v, ranges)),
            Column::Float64(v) => Column::Float64(take(v, ranges)),
            Column::Bool(v) => Column::Bool(take(v, ranges)),
            Column::Utf8(v) => Column::Utf8(take(v, ranges)),
            Column::Timestamp(t) => Column::Timestamp(TimestampColumn {
                values: take(&t.values, ranges),
                unit: t.unit,
                tz: t.tz.clone(),
            }),
            Column::Dictionary(d) => Column::Dictionary(DictionaryColumn {
                keys: take(&d.keys, ranges),
                values: d.values.clone(),
            }),
            Column::List(l) => {
                let mut offsets = vec![0];
                let mut validity = Vec::new();
                let mut child_ranges = Vec::new();
                for r in ranges {
                    for i in r.clone() {
                        validity.push(l.validity[i]);
                        let span = l.offsets[i]..l.offsets[i + 1];
                        offsets.push(offsets.last().copied().unwrap_or(0) + span.len());
                        child_ranges.push(span);
                    }
                }
                Column::List(ListColumn {
                    offsets,
                    validity,
                    child: Box::new(l.child.take_ranges(&child_ranges)),
                })
            }
        }
    }
}

/// A named column slot in a [`Table`], with semantic metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Key/value semantic annotations (e.g. `semantic` → `number[uint8]`).
    ///
    /// Consumers must tolerate arbitrary or absent keys.
    pub metadata: BTreeMap<String, String>,
}

impl Field {
    /// Create a field with empty metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// In-memory columnar table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    fields: Vec<Field>,
    columns: Vec<Column>,
}

impl Table {
    /// Create a table from parallel field and column lists.
    ///
    /// # Panics
    ///
    /// Panics if the lists have different lengths or the columns are not all
    /// of equal row count.
    pub fn new(fields: Vec<Field>, columns: Vec<Column>) -> Self {
        assert!(
            fields.len() == columns.len(),
            "field count {} does not match column count {}",
            fields.len(),
            columns.len()
        );
        if let Some(first) = columns.first() {
            let n = first.len();
            assert!(
                columns.iter().all(|c| c.len() == n),
                "columns must have equal row counts"
            );
        }
        Self { fields, columns }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Borrow a column by index.
    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// Borrow a column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    /// Borrow a field by index.
    pub fn field(&self, idx: usize) -> &Field {
        &self.fields[idx]
    }

    /// Borrow a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Replace the column at `idx`, superseding the prior binding.
    ///
    /// # Panics
    ///
    /// Panics if the new column's row count differs from the table's.
    pub fn set_column(&mut self, idx: usize, field: Field, column: Column) {
        assert!(
            column.len() == self.n_rows(),
            "replacement column has {} rows, table has {}",
            column.len(),
            self.n_rows()
        );
        self.fields[idx] = field;
        self.columns[idx] = column;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(values: &[Option<&str>]) -> Column {
        Column::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn null_counts() {
        let col = utf8(&[Some("a"), None, Some("b"), None]);
        assert_eq!(col.len(), 4);
        assert_eq!(col.null_count(), 2);
        assert_eq!(col.valid_count(), 2);
    }

    #[test]
    fn sample_valid_drops_nulls_and_bounds() {
        let col = utf8(&[None, Some("a"), None, Some("b"), Some("c")]);
        let sample = col.sample_valid(2);
        assert_eq!(sample, utf8(&[Some("a"), Some("b")]));
    }

    #[test]
    fn dictionary_roundtrip() {
        let values = vec![
            Some("x".to_string()),
            None,
            Some("y".to_string()),
            Some("x".to_string()),
        ];
        let dict = DictionaryColumn::encode(&values);
        assert_eq!(dict.cardinality(), 2);
        assert_eq!(dict.decode(), values);
    }

    #[test]
    fn list_sample_preserves_spans() {
        // [[1, 2], null, [], [3]]
        let list = ListColumn {
            offsets: vec![0, 2, 2, 2, 3],
            validity: vec![true, false, true, true],
            child: Box::new(Column::Int64(vec![Some(1), Some(2), Some(3)])),
        };
        let sample = Column::List(list).sample_valid(2);
        match sample {
            Column::List(l) => {
                assert_eq!(l.validity, vec![true, true]);
                assert_eq!(l.offsets, vec![0, 2, 2]);
                assert_eq!(*l.child, Column::Int64(vec![Some(1), Some(2)]));
            }
            other => panic!("expected list column, got {:?}", other.data_type()),
        }
    }

    #[test]
    fn timestamp_type_name() {
        let t = DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".to_string()));
        assert_eq!(t.name(), "timestamp[ns, UTC]");
    }
}
