//! Temporal allocation of budget lines over their execution phases.
//!
//! A budget line carries a `|`-separated plan of percentages, one per phase.
//! Each line is exploded into one row per phase with the amount allocated to
//! that phase, the change against the previous phase and the month the amount
//! falls in.

use super::{require_input, EnrichmentContext, EnrichmentJob};
use crate::calendar::phase_month_end;
use crate::dataset::{Dataset, Key, Value};
use crate::error::{EtlError, Result};
use crate::store::InsertMode;
use crate::transform::join::LookupIndex;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Column names of the budget-line entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumns {
    pub obra_id: String,
    pub plan: String,
    pub quantity: String,
    pub unit_price: String,
    pub item: String,
    pub phase: String,
    pub area: String,
}

impl Default for SourceColumns {
    fn default() -> Self {
        Self {
            obra_id: "obride".into(),
            plan: "planif".into(),
            quantity: "can".into(),
            unit_price: "pre".into(),
            item: "paride".into(),
            phase: "fas".into(),
            area: "amb".into(),
        }
    }
}

/// End date of each numbered phase of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseCalendar {
    pub key: String,
    pub obra_id: String,
    pub phase_number: String,
    pub end_date: String,
}

impl Default for PhaseCalendar {
    fn default() -> Self {
        Self {
            key: "obrfas".into(),
            obra_id: "obride".into(),
            phase_number: "fasnum".into(),
            end_date: "fecha_fin".into(),
        }
    }
}

/// Planned date per project, area and phase tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCalendar {
    pub key: String,
    pub obra_id: String,
    pub area: String,
    pub phase: String,
    pub planned_date: String,
}

impl Default for AreaCalendar {
    fn default() -> Self {
        Self {
            key: "obrfasamb".into(),
            obra_id: "obride".into(),
            area: "amb".into(),
            phase: "fas".into(),
            planned_date: "plafec".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSettings {
    pub source_key: String,
    pub output_key: String,
    /// Area whose rows get phase deltas
    pub target_area: i64,
    pub columns: SourceColumns,
    pub phase_calendar: PhaseCalendar,
    pub area_calendar: AreaCalendar,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            source_key: "obrparpre".into(),
            output_key: "obrparpre_planif".into(),
            target_area: 8,
            columns: SourceColumns::default(),
            phase_calendar: PhaseCalendar::default(),
            area_calendar: AreaCalendar::default(),
        }
    }
}

impl AllocationSettings {
    pub fn with_target_area(mut self, target_area: i64) -> Self {
        self.target_area = target_area;
        self
    }
}

/// One phase of one budget line.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRow {
    pub obra_id: Value,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub item_id: Value,
    pub phase_tag: Value,
    pub area_tag: Value,
    pub percentage: Option<f64>,
    /// 1-based position of the segment in its line's plan
    pub phase_number: i64,
    pub amount: Option<f64>,
    pub phase_amount: Option<f64>,
    pub phase_amount_delta: Option<f64>,
    pub phase_end_date: Option<NaiveDate>,
    pub area_planned_date: Option<NaiveDate>,
    pub allocated_date: Option<NaiveDate>,
}

impl AllocationRow {
    pub const COLUMNS: [&'static str; 14] = [
        "obra_id",
        "quantity",
        "unit_price",
        "item_id",
        "phase_tag",
        "area_tag",
        "percentage",
        "phase_number",
        "amount",
        "phase_amount",
        "phase_amount_delta",
        "phase_end_date",
        "area_planned_date",
        "allocated_date",
    ];

    fn into_values(self) -> [Value; 14] {
        [
            self.obra_id,
            self.quantity.into(),
            self.unit_price.into(),
            self.item_id,
            self.phase_tag,
            self.area_tag,
            self.percentage.into(),
            Value::Int(self.phase_number),
            self.amount.into(),
            self.phase_amount.into(),
            self.phase_amount_delta.into(),
            self.phase_end_date.into(),
            self.area_planned_date.into(),
            self.allocated_date.into(),
        ]
    }
}

fn multiply(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? * b?)
}

fn parse_percentage(segment: &str) -> Option<f64> {
    segment.trim().parse::<f64>().ok().filter(|p| p.is_finite())
}

/// Explode every line with a non-blank plan into one row per plan segment.
///
/// Unparseable segments keep their row with a null percentage.
pub fn explode(source: &Dataset, settings: &AllocationSettings) -> Vec<AllocationRow> {
    let c = &settings.columns;
    let mut rows = Vec::new();
    let mut unparsed = 0usize;

    for line in 0..source.row_count() {
        let plan = source.value(line, &c.plan).render();
        if plan.trim().is_empty() {
            continue;
        }
        let quantity = source.value(line, &c.quantity).as_f64();
        let unit_price = source.value(line, &c.unit_price).as_f64();
        let amount = multiply(quantity, unit_price);

        for (position, segment) in plan.split('|').enumerate() {
            let percentage = parse_percentage(segment);
            if percentage.is_none() {
                unparsed += 1;
            }
            rows.push(AllocationRow {
                obra_id: source.value(line, &c.obra_id).clone(),
                quantity,
                unit_price,
                item_id: source.value(line, &c.item).clone(),
                phase_tag: source.value(line, &c.phase).clone(),
                area_tag: source.value(line, &c.area).clone(),
                percentage,
                phase_number: position as i64 + 1,
                amount,
                phase_amount: multiply(amount, percentage).map(|v| v / 100.0),
                phase_amount_delta: None,
                phase_end_date: None,
                area_planned_date: None,
                allocated_date: None,
            });
        }
    }

    if unparsed > 0 {
        debug!(count = unparsed, "plan segments without a percentage");
    }
    rows
}

/// Phase-over-phase change of `phase_amount` within each phase tag, for rows
/// of `target_area` only.
///
/// The first phase takes its own amount; a row with a zero amount gets no
/// delta; rows outside the area get no delta.
pub fn apply_deltas(rows: &mut [AllocationRow], target_area: i64) {
    let mut previous: HashMap<Key, Option<f64>> = HashMap::new();
    for row in rows.iter_mut() {
        if row.area_tag.as_i64() != Some(target_area) {
            row.phase_amount_delta = None;
            continue;
        }
        let difference = row.phase_tag.key().and_then(|tag| {
            let before = previous.insert(tag, row.phase_amount).flatten();
            Some(row.phase_amount? - before?)
        });
        row.phase_amount_delta = if row.phase_number == 1 {
            row.phase_amount
        } else if row.phase_amount == Some(0.0) {
            None
        } else {
            difference
        };
    }
}

/// Attach `phase_end_date` by `(obra_id, phase_number)`. Returns false when
/// the calendar is unusable.
pub fn attach_phase_end(rows: &mut [AllocationRow], calendar: &Dataset, spec: &PhaseCalendar) -> bool {
    let keys = [spec.obra_id.as_str(), spec.phase_number.as_str()];
    if calendar.is_empty() || calendar.first_missing(&[keys[0], keys[1], spec.end_date.as_str()]).is_some() {
        warn!(calendar = %spec.key, "phase calendar empty or incomplete, phase_end_date left null");
        return false;
    }
    let index = LookupIndex::build(calendar, &keys);
    for row in rows.iter_mut() {
        let phase = Value::Int(row.phase_number);
        row.phase_end_date = index
            .find(&[&row.obra_id, &phase])
            .and_then(|hit| calendar.value(hit, &spec.end_date).as_date());
    }
    true
}

/// Attach `area_planned_date` by `(obra_id, area_tag, phase_tag)`.
pub fn attach_area_dates(rows: &mut [AllocationRow], calendar: &Dataset, spec: &AreaCalendar) -> bool {
    let keys = [spec.obra_id.as_str(), spec.area.as_str(), spec.phase.as_str()];
    if calendar.is_empty()
        || calendar
            .first_missing(&[keys[0], keys[1], keys[2], spec.planned_date.as_str()])
            .is_some()
    {
        warn!(calendar = %spec.key, "area calendar empty or incomplete, area_planned_date left null");
        return false;
    }
    let index = LookupIndex::build(calendar, &keys);
    for row in rows.iter_mut() {
        row.area_planned_date = index
            .find(&[&row.obra_id, &row.area_tag, &row.phase_tag])
            .and_then(|hit| calendar.value(hit, &spec.planned_date).as_date());
    }
    true
}

pub fn rows_to_dataset(rows: Vec<AllocationRow>) -> Result<Dataset> {
    let mut columns: Vec<Vec<Value>> = AllocationRow::COLUMNS
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for row in rows {
        for (column, value) in columns.iter_mut().zip(row.into_values()) {
            column.push(value);
        }
    }
    Dataset::from_columns(AllocationRow::COLUMNS.iter().copied().zip(columns).collect())
        .map_err(|e| EtlError::enrichment("allocation", e.to_string()))
}

/// Run the whole allocation over in-memory inputs.
///
/// The source must have the obra-id and plan columns; calendars are optional.
pub fn allocate(
    source: &Dataset,
    phases: &Dataset,
    areas: &Dataset,
    settings: &AllocationSettings,
) -> Result<Dataset> {
    let c = &settings.columns;
    if let Some(column) = source.first_missing(&[c.obra_id.as_str(), c.plan.as_str()]) {
        return Err(EtlError::enrichment(
            "allocation",
            format!("budget lines have no column '{}'", column),
        ));
    }

    let mut rows = explode(source, settings);
    apply_deltas(&mut rows, settings.target_area);
    attach_phase_end(&mut rows, phases, &settings.phase_calendar);
    if attach_area_dates(&mut rows, areas, &settings.area_calendar) {
        for row in rows.iter_mut() {
            row.allocated_date = row
                .area_planned_date
                .and_then(|planned| phase_month_end(planned, row.phase_number));
        }
    }
    rows_to_dataset(rows)
}

/// Allocation as a second-phase job writing the output entity.
#[derive(Debug, Clone, Default)]
pub struct AllocationJob {
    settings: AllocationSettings,
}

impl AllocationJob {
    pub fn new(settings: AllocationSettings) -> Self {
        Self { settings }
    }
}

impl EnrichmentJob for AllocationJob {
    fn name(&self) -> &str {
        "allocation"
    }

    fn run(&self, context: &EnrichmentContext<'_>) -> Result<usize> {
        let s = &self.settings;
        let source = context.read_or_empty(self.name(), &s.source_key)?;
        require_input(
            self.name(),
            &context.target(&s.source_key),
            &source,
            &[s.columns.obra_id.as_str(), s.columns.plan.as_str()],
        )?;
        let phases = context.read_or_empty(self.name(), &s.phase_calendar.key)?;
        let areas = context.read_or_empty(self.name(), &s.area_calendar.key)?;

        let output = allocate(&source, &phases, &areas, s)?;
        let target = context.target(&s.output_key);
        if output.is_empty() {
            return Err(EtlError::enrichment(
                self.name(),
                format!("no budget line has a plan, '{}' left as is", target),
            ));
        }
        let rows = context
            .sink
            .insert(&output, &target, InsertMode::Replace)
            .map_err(|e| EtlError::sink_write(target.clone(), e))?;
        info!(target_table = %target, rows, "allocation written");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn lines(plans: Vec<Value>, area: i64) -> Dataset {
        let n = plans.len();
        Dataset::from_columns(vec![
            ("obride", vec![Value::Int(1); n]),
            ("planif", plans),
            ("can", vec![Value::Int(10); n]),
            ("pre", vec![Value::Float(2.0); n]),
            ("paride", vec![Value::Int(300); n]),
            ("fas", vec![Value::Int(4); n]),
            ("amb", vec![Value::Int(area); n]),
        ])
        .unwrap()
    }

    #[test]
    fn test_even_split() {
        let source = lines(vec![Value::from("50|50")], 8);

        let out = allocate(&source, &Dataset::new(), &Dataset::new(), &AllocationSettings::default())
            .unwrap();

        assert_eq!(out.row_count(), 2);
        assert_eq!(out.column("phase_number").unwrap(), &[Value::Int(1), Value::Int(2)]);
        assert_eq!(out.column("amount").unwrap(), &[Value::Float(20.0), Value::Float(20.0)]);
        assert_eq!(
            out.column("phase_amount").unwrap(),
            &[Value::Float(10.0), Value::Float(10.0)]
        );
        assert_eq!(
            out.column("phase_amount_delta").unwrap(),
            &[Value::Float(10.0), Value::Float(0.0)]
        );
    }

    #[test]
    fn test_blank_plans_dropped_and_bad_segments_kept() {
        let source = lines(
            vec![Value::from("  "), Value::Null, Value::from("30|x|70")],
            8,
        );

        let rows = explode(&source, &AllocationSettings::default());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].percentage, None);
        assert_eq!(rows[1].phase_amount, None);
        assert_eq!(rows[2].phase_number, 3);
        assert_eq!(rows[2].phase_amount, Some(14.0));
    }

    #[test]
    fn test_deltas_only_in_target_area() {
        let source = lines(vec![Value::from("25|75")], 3);
        let mut rows = explode(&source, &AllocationSettings::default());
        apply_deltas(&mut rows, 8);
        assert!(rows.iter().all(|r| r.phase_amount_delta.is_none()));
    }

    #[test]
    fn test_zero_phase_amount_has_no_delta() {
        let source = lines(vec![Value::from("0|0|100")], 8);
        let mut rows = explode(&source, &AllocationSettings::default());
        apply_deltas(&mut rows, 8);

        let deltas: Vec<Option<f64>> = rows.iter().map(|r| r.phase_amount_delta).collect();
        assert_eq!(deltas, vec![Some(0.0), None, Some(20.0)]);
    }

    #[test]
    fn test_calendars_and_allocated_date() {
        let source = lines(vec![Value::from("50|50")], 8);
        let phases = Dataset::from_columns(vec![
            ("obride", vec![Value::Int(1)]),
            ("fasnum", vec![Value::Int(2)]),
            ("fecha_fin", vec![Value::Date(d(2024, 6, 30))]),
        ])
        .unwrap();
        let areas = Dataset::from_columns(vec![
            ("obride", vec![Value::Int(1)]),
            ("amb", vec![Value::Int(8)]),
            ("fas", vec![Value::Int(4)]),
            ("plafec", vec![Value::Date(d(2024, 1, 31))]),
        ])
        .unwrap();

        let out = allocate(&source, &phases, &areas, &AllocationSettings::default()).unwrap();

        assert_eq!(
            out.column("phase_end_date").unwrap(),
            &[Value::Null, Value::Date(d(2024, 6, 30))]
        );
        assert_eq!(
            out.column("allocated_date").unwrap(),
            &[Value::Date(d(2024, 1, 31)), Value::Date(d(2024, 2, 29))]
        );
    }

    #[test]
    fn test_missing_plan_column_is_an_error() {
        let source = Dataset::from_columns(vec![("obride", vec![Value::Int(1)])]).unwrap();
        let err = allocate(&source, &Dataset::new(), &Dataset::new(), &AllocationSettings::default())
            .unwrap_err();
        assert!(matches!(err, EtlError::EnrichmentJoin { .. }));
    }
}
