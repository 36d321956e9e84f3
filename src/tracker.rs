//! The in-memory year store and its two persistence sinks.
//!
//! Every edit produces a new snapshot, writes it through the local store and
//! hands it to the year's debounced remote writer. Remote data is merged in
//! once per year, before that year is first read or edited. A failed remote
//! read leaves the year unhydrated so the next access tries again.

use crate::calendar::{day_of_year, parse_date_key};
use crate::errors::AppError;
use crate::local_store::LocalStore;
use crate::models::{DateKey, DayPatch, DayResponse, Days, YearStore};
use crate::remote::RemoteKv;
use crate::sync::{YearWriter, fetch_year};
use chrono::{Datelike, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct Session {
    store: YearStore,
    /// Days edited in this process. They win over remote data merged later.
    edited: HashSet<DateKey>,
}

pub struct Tracker {
    local: LocalStore,
    remote: Arc<dyn RemoteKv>,
    debounce: Duration,
    session: Mutex<Session>,
    hydration: std::sync::Mutex<HashMap<i32, Arc<Mutex<bool>>>>,
    writers: std::sync::Mutex<HashMap<i32, Arc<YearWriter>>>,
}

impl Tracker {
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteKv>, debounce: Duration, year: i32) -> Self {
        let store = local.load(year);
        Self {
            local,
            remote,
            debounce,
            session: Mutex::new(Session {
                store,
                edited: HashSet::new(),
            }),
            hydration: std::sync::Mutex::new(HashMap::new()),
            writers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot stamped with `year`, hydrated from remote on first open.
    pub async fn open_year(&self, year: i32) -> YearStore {
        self.ensure_hydrated(year).await;

        let mut session = self.session.lock().await;
        session.store.year = year;
        session.store.clone()
    }

    /// Merges the remote copy of `year` unless that already succeeded.
    ///
    /// Concurrent callers for the same year wait for the first one.
    pub async fn ensure_hydrated(&self, year: i32) {
        let guard = self.hydration_guard(year);
        let mut hydrated = guard.lock().await;
        if *hydrated {
            return;
        }

        match fetch_year(self.remote.as_ref(), year).await {
            Ok(remote_days) => {
                self.merge_remote(year, remote_days).await;
                *hydrated = true;
            }
            Err(err) => warn!(year, "remote hydration failed; retrying on next access: {err}"),
        }
    }

    fn hydration_guard(&self, year: i32) -> Arc<Mutex<bool>> {
        let mut guards = match self.hydration.lock() {
            Ok(guards) => guards,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(guards.entry(year).or_default())
    }

    async fn merge_remote(&self, year: i32, remote_days: Days) {
        let mut session = self.session.lock().await;
        let Session { store, edited } = &mut *session;
        let mut days = store.days.clone();
        let mut merged_count = 0usize;
        for (key, record) in remote_days {
            if !edited.contains(&key) {
                days.insert(key, record);
                merged_count += 1;
            }
        }
        if merged_count == 0 {
            return;
        }

        let merged = YearStore {
            year,
            days,
            ..store.clone()
        };
        if let Err(err) = self.local.save(&merged) {
            warn!(year, "failed to save hydrated store: {err}");
        }
        info!(year, days = merged_count, "merged remote days");
        *store = merged;
    }

    pub async fn update_day(
        &self,
        date_key: &str,
        patch: &DayPatch,
        today: NaiveDate,
    ) -> Result<DayResponse, AppError> {
        let date = parse_date_key(date_key)
            .ok_or_else(|| AppError::bad_request("date must be a YYYY-MM-DD calendar date"))?;
        if !is_editable(date, today) {
            return Err(AppError::bad_request("future days cannot be edited"));
        }
        self.ensure_hydrated(date.year()).await;

        let mut session = self.session.lock().await;
        let mut next = YearStore {
            year: date.year(),
            ..session.store.clone()
        };
        let record = next.days.entry(date_key.to_string()).or_default();
        record.apply(patch);
        let response = DayResponse {
            date: date_key.to_string(),
            mood: record.mood,
            word: record.word.clone(),
        };

        self.local.save(&next)?;
        self.writer(next.year).set_year(next.days.clone());
        session.edited.insert(date_key.to_string());
        session.store = next;

        Ok(response)
    }

    pub fn writer(&self, year: i32) -> Arc<YearWriter> {
        let mut writers = match self.writers.lock() {
            Ok(writers) => writers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let writer = writers.entry(year).or_insert_with(|| {
            Arc::new(YearWriter::new(Arc::clone(&self.remote), year, self.debounce))
        });
        Arc::clone(writer)
    }

    /// Sends every pending snapshot now and waits for flushes already running.
    pub async fn flush_all(&self) {
        let writers: Vec<Arc<YearWriter>> = match self.writers.lock() {
            Ok(writers) => writers.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        for writer in writers {
            writer.flush_now().await;
        }
    }
}

/// Past years are always editable; in the current year only days up to today.
pub fn is_editable(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() < today.year()
        || (date.year() == today.year() && day_of_year(date) <= day_of_year(today))
}
