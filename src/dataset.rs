//! Tabular dataset model shared by every stage of the pipeline.
//!
//! A [`Dataset`] is an ordered set of named columns of equal length. Stages take
//! datasets by value and hand back a new one, so a caller that still needs the
//! original keeps its own clone and never observes a mutation.

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A single cell value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}

/// Hashable form of a [`Value`] used for joins and equality conditions.
///
/// Integral floats collapse onto `Int` so that `5` and `5.0` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text view of textual values; binary payloads are decoded lossily.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    /// Numeric view, parsing text when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Calendar date view. Timestamps are truncated to their date.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    /// Text rendering used when values are concatenated. Null renders empty.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// `0`, `0.0` or the text `"0"`.
    pub fn is_zero_like(&self) -> bool {
        match self {
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.trim() == "0",
            _ => false,
        }
    }

    /// Null, zero or the text `"0"`; used for "no reference" sentinels.
    pub fn is_empty_reference(&self) -> bool {
        self.is_null() || self.is_zero_like()
    }

    pub fn key(&self) -> Option<Key> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(Key::Int(*f as i64))
            }
            Value::Float(f) => Some(Key::Float(f.to_bits())),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::Bytes(b) => Some(Key::Text(String::from_utf8_lossy(b).into_owned())),
            Value::Date(d) => Some(Key::Date(*d)),
            Value::DateTime(dt) => Some(Key::DateTime(*dt)),
        }
    }

    /// Equality under key normalization. Nulls never match.
    pub fn matches(&self, other: &Value) -> bool {
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Total order for sorting rows: numbers numerically, then text, then
    /// dates, with nulls last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => match (self.as_text(), other.as_text()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => match (self.as_date(), other.as_date()) {
                        (Some(a), Some(b)) => a.cmp(&b),
                        _ => self.rank().cmp(&other.rank()),
                    },
                },
            },
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) | Value::Bytes(_) => 2,
            Value::Date(_) | Value::DateTime(_) => 3,
            Value::Null => 4,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Shape violations when assembling a dataset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("column '{column}' has {found} values but the dataset has {expected} rows")]
    Length {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("column '{0}' appears more than once")]
    Duplicate(String),
}

/// Ordered, equal-length named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: IndexMap<String, Vec<Value>>,
    rows: usize,
}

impl Dataset {
    /// A dataset with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from `(name, values)` pairs, checking lengths.
    ///
    /// # Example
    ///
    /// ```
    /// use tabular_etl::dataset::{Dataset, Value};
    ///
    /// let ds = Dataset::from_columns(vec![
    ///     ("ide", vec![Value::Int(1), Value::Int(2)]),
    ///     ("res", vec![Value::from("a"), Value::Null]),
    /// ]).unwrap();
    /// assert_eq!(ds.row_count(), 2);
    /// ```
    pub fn from_columns<S: Into<String>>(
        columns: Vec<(S, Vec<Value>)>,
    ) -> Result<Self, DatasetError> {
        let mut dataset = Dataset::new();
        for (index, (name, values)) in columns.into_iter().enumerate() {
            let name = name.into();
            if index == 0 {
                dataset.rows = values.len();
            }
            if dataset.columns.contains_key(&name) {
                return Err(DatasetError::Duplicate(name));
            }
            dataset.check_length(&name, values.len())?;
            dataset.columns.insert(name, values);
        }
        Ok(dataset)
    }

    /// Build a dataset from row-major records. Keys missing from a record are null.
    pub fn from_records(records: &[IndexMap<String, Value>]) -> Self {
        let mut dataset = Dataset::new();
        for record in records {
            dataset.push_record(record);
        }
        dataset
    }

    /// A dataset with the given columns and no rows.
    pub fn empty_with_columns<S: AsRef<str>>(names: &[S]) -> Self {
        Dataset {
            columns: names
                .iter()
                .map(|n| (n.as_ref().to_string(), Vec::new()))
                .collect(),
            rows: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Mutable view of a column. The slice cannot change the row count.
    pub fn column_mut(&mut self, name: &str) -> Option<&mut [Value]> {
        self.columns.get_mut(name).map(Vec::as_mut_slice)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// First of `names` that is not a column of this dataset.
    pub fn first_missing<'a>(&self, names: &[&'a str]) -> Option<&'a str> {
        names.iter().copied().find(|n| !self.has_column(n))
    }

    /// Value at `(row, column)`, null when the column is absent.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        self.columns
            .get(column)
            .and_then(|values| values.get(row))
            .unwrap_or(&Value::Null)
    }

    /// Replace an existing column in place or append a new one at the end.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), DatasetError> {
        let name = name.into();
        if self.columns.is_empty() && self.rows == 0 {
            self.rows = values.len();
        }
        self.check_length(&name, values.len())?;
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        self.columns.shift_remove(name)
    }

    /// Rename columns in place, keeping their positions.
    pub fn rename_columns<F>(&mut self, mut rename: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        let columns = std::mem::take(&mut self.columns);
        self.columns = columns
            .into_iter()
            .map(|(name, values)| match rename(&name) {
                Some(new_name) => (new_name, values),
                None => (name, values),
            })
            .collect();
    }

    /// Reorder columns by name using byte ordering.
    pub fn sort_columns(&mut self, descending: bool) {
        if descending {
            self.columns.sort_by(|a, _, b, _| b.as_bytes().cmp(a.as_bytes()));
        } else {
            self.columns.sort_by(|a, _, b, _| a.as_bytes().cmp(b.as_bytes()));
        }
    }

    /// Keep only the rows where `keep[i]` is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for values in self.columns.values_mut() {
            let mut flags = keep.iter();
            values.retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.rows = keep.iter().take(self.rows).filter(|k| **k).count();
    }

    /// New dataset made of the given row indices, in order.
    pub fn take_rows(&self, indices: &[usize]) -> Dataset {
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let picked = indices
                    .iter()
                    .map(|&i| values.get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                (name.clone(), picked)
            })
            .collect();
        Dataset {
            columns,
            rows: indices.len(),
        }
    }

    /// Append one record. Columns unknown so far are added and back-filled with null.
    pub fn push_record(&mut self, record: &IndexMap<String, Value>) {
        for name in record.keys() {
            if !self.columns.contains_key(name) {
                self.columns
                    .insert(name.clone(), vec![Value::Null; self.rows]);
            }
        }
        for (name, values) in self.columns.iter_mut() {
            values.push(record.get(name).cloned().unwrap_or(Value::Null));
        }
        self.rows += 1;
    }

    /// Row-major copy of one row.
    pub fn record(&self, row: usize) -> IndexMap<String, Value> {
        self.columns
            .iter()
            .map(|(name, values)| (name.clone(), values.get(row).cloned().unwrap_or(Value::Null)))
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = IndexMap<String, Value>> + '_ {
        (0..self.rows).map(move |row| self.record(row))
    }

    /// Apply `f` to every value of every column.
    pub fn map_values<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Value),
    {
        for values in self.columns.values_mut() {
            values.iter_mut().for_each(&mut f);
        }
    }

    fn check_length(&self, column: &str, found: usize) -> Result<(), DatasetError> {
        if found != self.rows {
            return Err(DatasetError::Length {
                column: column.to_string(),
                expected: self.rows,
                found,
            });
        }
        Ok(())
    }
}

/// Build an [`IndexMap`] record from literal pairs.
///
/// ```
/// use tabular_etl::{record, dataset::Value};
///
/// let row = record! { "ide" => 0, "cenide" => 0 };
/// assert_eq!(row["ide"], Value::Int(0));
/// ```
#[macro_export]
macro_rules! record {
    ($($name:expr => $value:expr),* $(,)?) => {{
        let mut row = ::indexmap::IndexMap::new();
        $( row.insert(String::from($name), $crate::dataset::Value::from($value)); )*
        row
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_columns(vec![
            ("b", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ("a", vec![Value::from("x"), Value::Null, Value::from("z")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged_input() {
        let err = Dataset::from_columns(vec![
            ("a", vec![Value::Int(1)]),
            ("b", vec![Value::Int(1), Value::Int(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, DatasetError::Length { expected: 1, found: 2, .. }));
    }

    #[test]
    fn test_push_record_backfills_new_columns() {
        let mut ds = sample();
        ds.push_record(&record! { "b" => 4, "c" => "new" });

        assert_eq!(ds.row_count(), 4);
        assert_eq!(ds.column("c").unwrap()[0], Value::Null);
        assert_eq!(ds.column("c").unwrap()[3], Value::from("new"));
        assert_eq!(ds.column("a").unwrap()[3], Value::Null);
    }

    #[test]
    fn test_retain_and_take_rows() {
        let mut ds = sample();
        let taken = ds.take_rows(&[2, 0]);
        assert_eq!(taken.column("b").unwrap(), &[Value::Int(3), Value::Int(1)]);

        ds.retain_rows(&[true, false, true]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("a").unwrap(), &[Value::from("x"), Value::from("z")]);
    }

    #[test]
    fn test_sort_columns_uses_byte_order() {
        let mut ds = Dataset::from_columns(vec![
            ("b", vec![Value::Null]),
            ("B", vec![Value::Null]),
            ("a", vec![Value::Null]),
        ])
        .unwrap();
        ds.sort_columns(false);
        assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["B", "a", "b"]);
        ds.sort_columns(true);
        assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["b", "a", "B"]);
    }

    #[test]
    fn test_key_normalizes_integral_floats() {
        assert!(Value::Int(5).matches(&Value::Float(5.0)));
        assert!(!Value::Int(5).matches(&Value::from("5")));
        assert!(!Value::Null.matches(&Value::Null));
    }

    #[test]
    fn test_sort_cmp_puts_nulls_last() {
        let mut values = vec![Value::Null, Value::Int(3), Value::Float(1.5)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values, vec![Value::Float(1.5), Value::Int(3), Value::Null]);
    }

    #[test]
    fn test_value_deserializes_from_yaml_scalars() {
        let row: IndexMap<String, Value> =
            serde_yaml::from_str("ide: 0\nname: abc\nrate: 1.5\nflag: true\nnone: ~").unwrap();
        assert_eq!(row["ide"], Value::Int(0));
        assert_eq!(row["name"], Value::from("abc"));
        assert_eq!(row["rate"], Value::Float(1.5));
        assert_eq!(row["flag"], Value::Bool(true));
        assert_eq!(row["none"], Value::Null);
    }
}
