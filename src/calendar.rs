use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

pub const MONTH_SHORT_NAMES: [&str; 12] = [
    "Янв", "Фев", "Мар", "Апр", "Май", "Июн", "Июл", "Авг", "Сен", "Окт", "Ноя", "Дек",
];

pub const MONTH_SHORT_NAMES_EN: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) { 366 } else { 365 }
}

/// The "zeroth" day of `year`: December 31st of the previous year.
fn day_zero(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.pred_opt()
}

/// 1-based day of the year for a calendar date.
pub fn day_of_year(date: NaiveDate) -> u32 {
    day_of_year_at(date.and_time(chrono::NaiveTime::MIN))
}

/// 1-based day of the year for a wall-clock moment.
///
/// Counts whole 24h units since midnight of day zero, truncating, so any
/// time within a date maps to that date's index.
pub fn day_of_year_at(moment: NaiveDateTime) -> u32 {
    let Some(start) = day_zero(moment.year()) else {
        return moment.ordinal();
    };
    let elapsed = moment - start.and_time(chrono::NaiveTime::MIN);
    elapsed.num_milliseconds().div_euclid(MILLIS_PER_DAY) as u32
}

/// Calendar date for day `n` of `year`, rolling over month and year
/// boundaries the way a calendar does (0 is December 31st of the year before).
pub fn date_for_day_index(year: i32, n: i64) -> Option<NaiveDate> {
    day_zero(year)?.checked_add_signed(Duration::try_days(n)?)
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn date_key_for_day_index(year: i32, n: i64) -> Option<String> {
    date_for_day_index(year, n).map(date_key)
}

/// Parses a `YYYY-MM-DD` key into a real calendar date.
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    if key.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Every date key of `year`, in day order.
pub fn date_keys(year: i32) -> Vec<String> {
    (1..=i64::from(days_in_year(year)))
        .filter_map(|n| date_key_for_day_index(year, n))
        .collect()
}

pub fn month_start_indices(year: i32) -> BTreeMap<u32, &'static str> {
    month_start_indices_with(year, &MONTH_SHORT_NAMES)
}

pub fn month_start_indices_with(
    year: i32,
    names: &[&'static str; 12],
) -> BTreeMap<u32, &'static str> {
    names
        .iter()
        .zip(1u32..)
        .filter_map(|(name, month)| {
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some((day_of_year(first), *name))
        })
        .collect()
}

/// Index of `today` when viewing `view_year`, or 0 for any other year.
pub fn today_index(view_year: i32, today: NaiveDate) -> u32 {
    if today.year() == view_year {
        day_of_year(today)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leap_years_follow_gregorian_rule() {
        assert!(is_leap_year(2000));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2025));
        for year in 1890..2110 {
            assert_eq!(days_in_year(year) == 366, is_leap_year(year), "year {year}");
        }
    }

    #[test]
    fn day_of_year_is_one_based() {
        let first = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        assert_eq!(day_of_year(first), 1);
        assert_eq!(day_of_year(last), 365);

        let noon = first.and_hms_opt(12, 0, 0).unwrap();
        let late = last.and_hms_opt(23, 59, 59).unwrap();
        assert_eq!(day_of_year_at(noon), 1);
        assert_eq!(day_of_year_at(late), 365);
    }

    #[test]
    fn date_keys_roll_over_months() {
        assert_eq!(date_key_for_day_index(2026, 1).as_deref(), Some("2026-01-01"));
        assert_eq!(date_key_for_day_index(2026, 32).as_deref(), Some("2026-02-01"));
        assert_eq!(date_key_for_day_index(2024, 60).as_deref(), Some("2024-02-29"));
        assert_eq!(date_key_for_day_index(2025, 60).as_deref(), Some("2025-03-01"));
        assert_eq!(date_key_for_day_index(2026, 0).as_deref(), Some("2025-12-31"));
    }

    #[test]
    fn every_day_key_maps_back_to_its_index() {
        for year in [1900, 2000, 2023, 2024, 2026] {
            let keys = date_keys(year);
            assert_eq!(keys.len() as u32, days_in_year(year));
            for (i, key) in keys.iter().enumerate() {
                let date = parse_date_key(key).expect("valid key");
                assert_eq!(date.year(), year);
                assert_eq!(day_of_year(date) as usize, i + 1);
            }
        }
    }

    #[test]
    fn month_starts_have_twelve_entries() {
        let common = month_start_indices(2026);
        assert_eq!(common.len(), 12);
        assert_eq!(common.get(&1), Some(&"Янв"));
        assert_eq!(common.get(&32), Some(&"Фев"));
        assert_eq!(common.get(&60), Some(&"Мар"));

        let leap = month_start_indices(2024);
        assert_eq!(leap.len(), 12);
        assert_eq!(leap.get(&61), Some(&"Мар"));

        let english = month_start_indices_with(2024, &MONTH_SHORT_NAMES_EN);
        assert_eq!(english.get(&336), Some(&"Dec"));
    }

    #[test]
    fn parse_date_key_rejects_non_dates() {
        assert!(parse_date_key("2026-02-30").is_none());
        assert!(parse_date_key("2026-2-3").is_none());
        assert!(parse_date_key("hello").is_none());
        assert!(parse_date_key("2024-02-29").is_some());
    }

    #[test]
    fn today_index_is_zero_for_other_years() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(today_index(2026, today), 60);
        assert_eq!(today_index(2025, today), 0);
    }
}
