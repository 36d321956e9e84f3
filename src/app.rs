use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, put}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/years/:year", get(handlers::get_year))
        .route("/api/years/:year/stats", get(handlers::get_stats))
        .route("/api/years/:year/export", get(handlers::export_year))
        .route("/api/days/:date", put(handlers::update_day))
        .route("/api/layout", get(handlers::get_layout))
        .with_state(state)
}
