use crate::badges::Badge;
use crate::stats::YearStats;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 1;

/// `YYYY-MM-DD`
pub type DateKey = String;

pub type Days = BTreeMap<DateKey, DayRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Blue,
    Green,
    Red,
    Yellow,
}

impl Mood {
    /// Enumeration order; earlier moods win ties.
    pub const ALL: [Mood; 4] = [Mood::Blue, Mood::Green, Mood::Red, Mood::Yellow];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

impl DayRecord {
    pub fn is_filled(&self) -> bool {
        self.mood.is_some()
    }

    pub fn has_word(&self) -> bool {
        self.word.as_deref().is_some_and(|word| !word.is_empty())
    }

    pub fn apply(&mut self, patch: &DayPatch) {
        if let Some(mood) = patch.mood {
            self.mood = mood;
        }
        if let Some(word) = &patch.word {
            self.word = Some(word.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearStore {
    #[serde(rename = "schemaVersion", alias = "version")]
    pub schema_version: u32,
    /// Restamped on every load, so a missing or odd value is not an error.
    #[serde(default, deserialize_with = "deserialize_year")]
    pub year: i32,
    #[serde(default, deserialize_with = "deserialize_days")]
    pub days: Days,
}

impl YearStore {
    pub fn empty(year: i32) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            year,
            days: Days::new(),
        }
    }
}

/// Builds a day map out of an arbitrary JSON value.
///
/// Returns `None` unless the value is an object. Entries whose record does
/// not parse are dropped one by one.
pub fn days_from_value(value: Value) -> Option<Days> {
    let Value::Object(entries) = value else {
        return None;
    };

    let mut days = Days::new();
    for (key, raw) in entries {
        match serde_json::from_value::<DayRecord>(raw) {
            Ok(record) => {
                days.insert(key, record);
            }
            Err(err) => debug!(%key, "dropping unreadable day record: {err}"),
        }
    }
    Some(days)
}

fn deserialize_days<'de, D>(deserializer: D) -> Result<Days, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(days_from_value(value).unwrap_or_default())
}

fn deserialize_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .and_then(|year| i32::try_from(year).ok())
        .unwrap_or_default())
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of one day. `mood: null` clears the mood.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayPatch {
    #[serde(default, deserialize_with = "deserialize_present")]
    pub mood: Option<Option<Mood>>,
    #[serde(default)]
    pub word: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DayResponse {
    pub date: DateKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResponse {
    pub year: i32,
    pub total_days: u32,
    pub today_index: u32,
    pub date_keys: Vec<DateKey>,
    pub month_starts: BTreeMap<u32, &'static str>,
    pub days: Days,
    pub stats: YearStats,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: YearStats,
    pub badges: Vec<Badge>,
}
