use crate::calendar::{date_key_for_day_index, days_in_year};
use crate::models::{DayRecord, Days, Mood};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearStats {
    pub filled_days: u32,
    pub total_past_days: u32,
    pub fill_percentage: u32,
    pub mood_counts: BTreeMap<Mood, u32>,
    pub most_common_mood: Option<Mood>,
    pub longest_streak: u32,
    pub current_streak: u32,
    pub days_with_word: u32,
}

impl Default for YearStats {
    fn default() -> Self {
        Self {
            filled_days: 0,
            total_past_days: 0,
            fill_percentage: 0,
            mood_counts: empty_mood_counts(),
            most_common_mood: None,
            longest_streak: 0,
            current_streak: 0,
            days_with_word: 0,
        }
    }
}

fn empty_mood_counts() -> BTreeMap<Mood, u32> {
    Mood::ALL.into_iter().map(|mood| (mood, 0)).collect()
}

/// Statistics over days `1..=scan_limit` of `year`.
///
/// `today_index` is the 1-based index of today when viewing the current year,
/// or 0 for a past year, in which case the whole year is scanned.
pub fn compute_year_stats(days: &Days, year: i32, today_index: u32) -> YearStats {
    let total_days = days_in_year(year);
    let scan_limit = if today_index > 0 {
        today_index.min(total_days)
    } else {
        total_days
    };

    let records: Vec<Option<&DayRecord>> = (1..=scan_limit)
        .map(|n| date_key_for_day_index(year, i64::from(n)).and_then(|key| days.get(&key)))
        .collect();

    let mut stats = YearStats {
        total_past_days: scan_limit,
        ..YearStats::default()
    };
    let mut run = 0u32;

    for record in records.iter().copied() {
        match record.and_then(|record| record.mood) {
            Some(mood) => {
                stats.filled_days += 1;
                *stats.mood_counts.entry(mood).or_insert(0) += 1;
                run += 1;
                stats.longest_streak = stats.longest_streak.max(run);
            }
            None => run = 0,
        }

        if record.is_some_and(DayRecord::has_word) {
            stats.days_with_word += 1;
        }
    }

    stats.current_streak = records
        .iter()
        .rev()
        .take_while(|record| record.is_some_and(DayRecord::is_filled))
        .count() as u32;

    stats.most_common_mood = most_common_mood(&stats.mood_counts);
    stats.fill_percentage = fill_percentage(stats.filled_days, stats.total_past_days);
    stats
}

fn most_common_mood(counts: &BTreeMap<Mood, u32>) -> Option<Mood> {
    let mut best: Option<(Mood, u32)> = None;
    for mood in Mood::ALL {
        let count = counts.get(&mood).copied().unwrap_or(0);
        if count > best.map_or(0, |(_, max)| max) {
            best = Some((mood, count));
        }
    }
    best.map(|(mood, _)| mood)
}

fn fill_percentage(filled: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (f64::from(filled) / f64::from(total) * 100.0).round() as u32
}
