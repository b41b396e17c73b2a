//! Month arithmetic with end-of-month clamping.

use chrono::{Datelike, NaiveDate};

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-based) of `year`. Returns 0 for an invalid month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, days_in_month(year, month))
}

/// Shift `date` by `months`, keeping the day of month where possible and
/// clamping to the last day of the resulting month otherwise.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use tabular_etl::calendar::add_months_clamped;
///
/// let aug31 = NaiveDate::from_ymd_opt(2023, 8, 31).unwrap();
/// assert_eq!(add_months_clamped(aug31, 1), NaiveDate::from_ymd_opt(2023, 9, 30));
/// ```
pub fn add_months_clamped(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Allocation date for a phase: the month of `planned`, moved forward
/// `phase_number - 1` months, snapped to that month's last day.
pub fn phase_month_end(planned: NaiveDate, phase_number: i64) -> Option<NaiveDate> {
    let shifted = add_months_clamped(first_of_month(planned), phase_number - 1)?;
    month_end(shifted.year(), shifted.month())
}

/// Whole calendar months from `start` to `end`; negative when `end` is earlier.
pub fn whole_months_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return -whole_months_between(end, start);
    }
    let mut months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
        - i64::from(start.month());
    if end.day() < start.day() {
        months -= 1;
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_days_in_month_handles_leap_february() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2023, 13), 0);
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months_clamped(d(2024, 1, 31), 1), Some(d(2024, 2, 29)));
        assert_eq!(add_months_clamped(d(2023, 1, 31), 1), Some(d(2023, 2, 28)));
        assert_eq!(add_months_clamped(d(2023, 8, 31), 1), Some(d(2023, 9, 30)));
        assert_eq!(add_months_clamped(d(2023, 11, 15), 3), Some(d(2024, 2, 15)));
        assert_eq!(add_months_clamped(d(2024, 3, 31), -1), Some(d(2024, 2, 29)));
    }

    #[test]
    fn test_phase_month_end() {
        assert_eq!(phase_month_end(d(2024, 1, 31), 2), Some(d(2024, 2, 29)));
        assert_eq!(phase_month_end(d(2023, 8, 31), 2), Some(d(2023, 9, 30)));
        assert_eq!(phase_month_end(d(2023, 8, 5), 1), Some(d(2023, 8, 31)));
        assert_eq!(phase_month_end(d(2023, 12, 10), 3), Some(d(2024, 2, 29)));
    }

    #[test]
    fn test_whole_months_between() {
        assert_eq!(whole_months_between(d(2023, 1, 15), d(2023, 7, 15)), 6);
        assert_eq!(whole_months_between(d(2023, 1, 15), d(2023, 7, 14)), 5);
        assert_eq!(whole_months_between(d(2022, 3, 1), d(2024, 3, 1)), 24);
        assert_eq!(whole_months_between(d(2023, 7, 15), d(2023, 1, 15)), -6);
    }
}
