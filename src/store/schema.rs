//! Column type inference for newly created tables.

use crate::dataset::{Dataset, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }

    /// Map an `information_schema.columns.data_type` to a column type.
    pub fn from_sql(data_type: &str) -> Self {
        match data_type.to_ascii_lowercase().as_str() {
            "smallint" | "integer" | "bigint" => ColumnType::Integer,
            "real" | "double precision" | "numeric" | "decimal" => ColumnType::Float,
            "boolean" => ColumnType::Boolean,
            "date" => ColumnType::Date,
            t if t.starts_with("timestamp") => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Float(f) if f.is_nan() => None,
            Value::Int(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Date(_) => Some(ColumnType::Date),
            Value::DateTime(_) => Some(ColumnType::Timestamp),
            Value::Text(_) | Value::Bytes(_) => Some(ColumnType::Text),
        }
    }

    fn widen(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Infer one column definition per dataset column from the non-null values.
/// All-null columns and mixed types fall back to text.
pub fn infer_schema(dataset: &Dataset) -> Vec<ColumnDef> {
    dataset
        .columns()
        .map(|(name, values)| {
            let column_type = values
                .iter()
                .filter_map(ColumnType::of)
                .reduce(ColumnType::widen)
                .unwrap_or(ColumnType::Text);
            ColumnDef::new(name, column_type)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_infer_schema() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let ds = Dataset::from_columns(vec![
            ("ide", vec![Value::Int(1), Value::Null]),
            ("can", vec![Value::Int(1), Value::Float(2.5)]),
            ("res", vec![Value::from("a"), Value::Int(3)]),
            ("fec", vec![Value::Date(date), Value::Date(date.and_hms_opt(1, 0, 0).unwrap().date())]),
            ("ts", vec![Value::Date(date), Value::DateTime(date.and_hms_opt(1, 0, 0).unwrap())]),
            ("flag", vec![Value::Bool(true), Value::Null]),
            ("empty", vec![Value::Null, Value::Null]),
        ])
        .unwrap();

        let types: Vec<ColumnType> = infer_schema(&ds).into_iter().map(|c| c.column_type).collect();

        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Text,
                ColumnType::Date,
                ColumnType::Timestamp,
                ColumnType::Boolean,
                ColumnType::Text,
            ]
        );
    }

    #[test]
    fn test_from_sql() {
        assert_eq!(ColumnType::from_sql("bigint"), ColumnType::Integer);
        assert_eq!(ColumnType::from_sql("timestamp without time zone"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_sql("character varying"), ColumnType::Text);
        assert_eq!(ColumnType::from_sql("numeric"), ColumnType::Float);
    }
}
