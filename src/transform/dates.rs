//! Compact `YYYYMMDD` date normalization.

use super::{TransformError, Transformation};
use crate::dataset::{Dataset, Value};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Parse `YYYYMMDD` values into calendar dates.
///
/// Values that are not eight digits or not a real calendar day become null.
/// Already-parsed dates pass through, so applying the step twice is a no-op.
/// Absent columns are skipped with a warning.
#[derive(Debug, Clone)]
pub struct NormalizeDates {
    columns: Vec<String>,
    zero_is_null: bool,
}

impl NormalizeDates {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, zero_is_null: bool) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            zero_is_null,
        }
    }

    fn normalize(&self, value: Value) -> (Value, bool) {
        if self.zero_is_null && value.is_zero_like() {
            return (Value::Null, false);
        }
        match value {
            Value::Null => (Value::Null, false),
            v @ (Value::Date(_) | Value::DateTime(_)) => (v, false),
            Value::Int(i) => parse_compact(&i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                parse_compact(&(f as i64).to_string())
            }
            other => match other.as_text() {
                Some(text) => parse_compact(text.trim()),
                None => (Value::Null, true),
            },
        }
    }
}

/// Returns the parsed value and whether a non-null input was lost.
fn parse_compact(text: &str) -> (Value, bool) {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return (Value::Null, !text.is_empty());
    }
    match NaiveDate::parse_from_str(text, "%Y%m%d") {
        Ok(date) => (Value::Date(date), false),
        Err(_) => (Value::Null, true),
    }
}

impl Transformation for NormalizeDates {
    fn name(&self) -> &str {
        "normalize_dates"
    }

    fn transform(&self, mut dataset: Dataset) -> Result<Dataset, TransformError> {
        for column in &self.columns {
            let Some(values) = dataset.column_mut(column) else {
                warn!(column = %column, "date column not present, skipping");
                continue;
            };
            let mut lost = 0usize;
            for slot in values.iter_mut() {
                let (parsed, degraded) = self.normalize(std::mem::replace(slot, Value::Null));
                lost += degraded as usize;
                *slot = parsed;
            }
            if lost > 0 {
                debug!(column = %column, lost, "unparseable dates set to null");
            }
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_parses_compact_dates_and_nulls_the_rest() {
        let ds = Dataset::from_columns(vec![(
            "fecini",
            vec![
                Value::Int(20240131),
                Value::from("20230815"),
                Value::Int(0),
                Value::from("0"),
                Value::from(""),
                Value::from("20231340"),
                Value::from("2023-01-01"),
                Value::Null,
            ],
        )])
        .unwrap();

        let out = NormalizeDates::new(["fecini"], true).transform(ds).unwrap();

        assert_eq!(
            out.column("fecini").unwrap(),
            &[
                date(2024, 1, 31),
                date(2023, 8, 15),
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_zero_is_null_disabled_still_yields_null_for_zero() {
        let ds = Dataset::from_columns(vec![("f", vec![Value::Int(0)])]).unwrap();
        let out = NormalizeDates::new(["f"], false).transform(ds).unwrap();
        assert_eq!(out.column("f").unwrap(), &[Value::Null]);
    }

    #[test]
    fn test_idempotent_on_normalized_values() {
        let ds = Dataset::from_columns(vec![(
            "f",
            vec![Value::Int(20200229), Value::Int(19991301), Value::Null],
        )])
        .unwrap();
        let step = NormalizeDates::new(["f"], true);
        let once = step.transform(ds).unwrap();
        let twice = step.transform(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_missing_column_is_skipped_and_order_kept() {
        let ds = Dataset::from_columns(vec![
            ("a", vec![Value::Int(20200101)]),
            ("b", vec![Value::Int(1)]),
        ])
        .unwrap();
        let out = NormalizeDates::new(["a", "zz"], true).transform(ds).unwrap();
        assert_eq!(out.column_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(out.row_count(), 1);
    }
}
