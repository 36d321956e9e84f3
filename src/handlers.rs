use crate::badges::get_earned_badges;
use crate::calendar::{date_keys, days_in_year, month_start_indices, today_index};
use crate::errors::AppError;
use crate::layout::{GridDensity, GridLayout, compute_best_layout};
use crate::models::{DayPatch, DayResponse, StatsResponse, YearResponse, YearStore};
use crate::state::AppState;
use crate::stats::compute_year_stats;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;

const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

#[derive(Debug, Deserialize)]
pub struct LayoutQuery {
    pub width: u32,
    #[serde(default)]
    pub density: GridDensity,
}

pub async fn get_year(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<Json<YearResponse>, AppError> {
    check_year(year)?;
    let store = state.tracker.open_year(year).await;
    Ok(Json(build_year_response(store, today())))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<Json<StatsResponse>, AppError> {
    check_year(year)?;
    let store = state.tracker.open_year(year).await;
    let stats = compute_year_stats(&store.days, year, today_index(year, today()));
    let badges = get_earned_badges(&stats);
    Ok(Json(StatsResponse { stats, badges }))
}

pub async fn export_year(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> Result<Response, AppError> {
    check_year(year)?;
    let store = state.tracker.open_year(year).await;
    let body = serde_json::to_string_pretty(&store)?;
    let disposition = format!("attachment; filename=\"days-of-year-{year}.json\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/json; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn update_day(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(patch): Json<DayPatch>,
) -> Result<Json<DayResponse>, AppError> {
    let response = state.tracker.update_day(&date, &patch, today()).await?;
    Ok(Json(response))
}

pub async fn get_layout(Query(query): Query<LayoutQuery>) -> Json<GridLayout> {
    Json(compute_best_layout(query.width, query.density))
}

pub fn build_year_response(store: YearStore, today: NaiveDate) -> YearResponse {
    let year = store.year;
    let today_index = today_index(year, today);
    let stats = compute_year_stats(&store.days, year, today_index);
    let badges = get_earned_badges(&stats);

    YearResponse {
        year,
        total_days: days_in_year(year),
        today_index,
        date_keys: date_keys(year),
        month_starts: month_start_indices(year),
        days: store.days,
        stats,
        badges,
    }
}

fn check_year(year: i32) -> Result<(), AppError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}"
        )))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayRecord, Mood};

    #[test]
    fn year_response_for_current_year() {
        let mut store = YearStore::empty(2026);
        for day in 1..=3 {
            store.days.insert(
                format!("2026-01-{day:02}"),
                DayRecord {
                    mood: Some(Mood::Blue),
                    word: None,
                },
            );
        }
        let today = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        let response = build_year_response(store, today);
        assert_eq!(response.total_days, 365);
        assert_eq!(response.today_index, 3);
        assert_eq!(response.date_keys.len(), 365);
        assert_eq!(response.month_starts.len(), 12);
        assert_eq!(response.stats.current_streak, 3);
        assert_eq!(response.stats.fill_percentage, 100);
        assert!(response.badges.iter().any(|b| b.id == "first-day" && b.earned));
    }

    #[test]
    fn year_response_for_past_year_scans_everything() {
        let store = YearStore::empty(2024);
        let today = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        let response = build_year_response(store, today);
        assert_eq!(response.today_index, 0);
        assert_eq!(response.total_days, 366);
        assert_eq!(response.stats.total_past_days, 366);
    }

    #[test]
    fn year_bounds() {
        assert!(check_year(2026).is_ok());
        assert!(check_year(0).is_err());
        assert!(check_year(10_000).is_err());
    }
}
