//! Best-effort mirror of a year's days to the remote key-value store.
//!
//! Days are stored as one JSON object per month under `doy:{year}:{MM}`.
//! Older clients wrote the whole year under `doy:{year}`; that key is only
//! read when no monthly chunk exists, and every flush overwrites it with an
//! empty string.
//!
//! Nothing here returns an error to the caller. Local storage is the source of
//! truth, so remote failures are logged and dropped.

use crate::models::{Days, days_from_value};
use crate::remote::{KvPair, RemoteError, RemoteKv};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

const KEY_PREFIX: &str = "doy:";

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);

pub fn year_key(year: i32) -> String {
    format!("{KEY_PREFIX}{year}")
}

pub fn month_key(year: i32, month: u32) -> String {
    format!("{KEY_PREFIX}{year}:{month:02}")
}

fn parse_chunk(raw: Option<&str>) -> Option<Days> {
    let raw = raw.filter(|raw| !raw.is_empty())?;
    let value = serde_json::from_str(raw).ok()?;
    days_from_value(value)
}

/// Reads the remote copy of `year`.
///
/// Monthly chunks win over the legacy blob whenever at least one of them
/// holds data. Any failure yields an empty map.
pub async fn load_year(remote: &dyn RemoteKv, year: i32) -> Days {
    match fetch_year(remote, year).await {
        Ok(days) => days,
        Err(err) => {
            warn!(year, "remote load failed: {err}");
            Days::new()
        }
    }
}

/// Like [`load_year`], but reports a failed request instead of treating it
/// as an empty year. Unreadable values still count as absent.
pub async fn fetch_year(remote: &dyn RemoteKv, year: i32) -> Result<Days, RemoteError> {
    let legacy = year_key(year);
    let mut keys: Vec<String> = (1..=12).map(|month| month_key(year, month)).collect();
    keys.push(legacy.clone());

    let pairs = remote.get(&keys).await?;
    let values: BTreeMap<&str, &str> = pairs
        .iter()
        .map(|pair| (pair.key.as_str(), pair.value.as_str()))
        .collect();

    let mut merged = Days::new();
    let mut found_chunk = false;
    for key in &keys[..12] {
        if let Some(chunk) = parse_chunk(values.get(key.as_str()).copied()) {
            found_chunk = true;
            merged.extend(chunk);
        }
    }

    if found_chunk {
        debug!(year, days = merged.len(), "loaded monthly chunks");
        return Ok(merged);
    }

    Ok(match parse_chunk(values.get(legacy.as_str()).copied()) {
        Some(days) => {
            info!(year, days = days.len(), "loaded legacy year blob");
            days
        }
        None => Days::new(),
    })
}

/// Splits the days of `year` into per-month chunks keyed by month number.
///
/// Keys of other years, and keys without a readable month, are left out.
pub fn partition_by_month(year: i32, days: &Days) -> BTreeMap<u32, Days> {
    let prefix = format!("{year}-");
    let mut chunks: BTreeMap<u32, Days> = BTreeMap::new();
    for (key, record) in days {
        if !key.starts_with(&prefix) {
            continue;
        }
        let month = key
            .get(5..7)
            .and_then(|mm| mm.parse::<u32>().ok())
            .filter(|month| (1..=12).contains(month));
        match month {
            Some(month) => {
                chunks
                    .entry(month)
                    .or_default()
                    .insert(key.clone(), record.clone());
            }
            None => debug!(%key, "skipping day key without a month"),
        }
    }
    chunks
}

/// Writes every non-empty month chunk plus the legacy-key clear, all at once.
async fn flush_days(remote: Arc<dyn RemoteKv>, year: i32, days: Days) {
    let mut writes: Vec<KvPair> = Vec::new();
    for (month, chunk) in partition_by_month(year, &days) {
        match serde_json::to_string(&chunk) {
            Ok(value) => writes.push(KvPair {
                key: month_key(year, month),
                value,
            }),
            Err(err) => warn!(year, month, "failed to encode month chunk: {err}"),
        }
    }
    writes.push(KvPair {
        key: year_key(year),
        value: String::new(),
    });

    let total = writes.len();
    let mut tasks = JoinSet::new();
    for pair in writes {
        let remote = Arc::clone(&remote);
        tasks.spawn(async move {
            let key = pair.key.clone();
            remote.set(pair).await.map_err(|err| (key, err))
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err((key, err))) => {
                failed += 1;
                warn!(year, %key, "remote write failed: {err}");
            }
            Err(err) => {
                failed += 1;
                warn!(year, "remote write task failed: {err}");
            }
        }
    }

    if failed == 0 {
        debug!(year, writes = total, "remote flush complete");
    } else {
        warn!(year, failed, writes = total, "remote flush incomplete; next edit retries");
    }
}

struct WriterShared {
    year: i32,
    remote: Arc<dyn RemoteKv>,
    pending: Mutex<Option<Days>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl WriterShared {
    fn take_pending(&self) -> Option<Days> {
        self.pending.lock().ok()?.take()
    }

    fn spawn_flush(&self, days: Days) {
        let flush = tokio::spawn(flush_days(Arc::clone(&self.remote), self.year, days));
        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.retain(|handle| !handle.is_finished());
                in_flight.push(flush);
            }
            Err(err) => warn!(year = self.year, "writer state poisoned: {err}"),
        }
    }

    fn take_in_flight(&self) -> Vec<JoinHandle<()>> {
        self.in_flight
            .lock()
            .map(|mut in_flight| std::mem::take(&mut *in_flight))
            .unwrap_or_default()
    }
}

/// Debounced writer for one year.
///
/// `set_year` replaces the pending snapshot and restarts the timer; only the
/// latest snapshot is flushed once the timer fires. A flush already running
/// keeps its own copy and is never cancelled; [`YearWriter::flush_now`]
/// waits for it.
///
/// Must be used from within a tokio runtime.
pub struct YearWriter {
    shared: Arc<WriterShared>,
    debounce: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl YearWriter {
    pub fn new(remote: Arc<dyn RemoteKv>, year: i32, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(WriterShared {
                year,
                remote,
                pending: Mutex::new(None),
                in_flight: Mutex::new(Vec::new()),
            }),
            debounce,
            timer: Mutex::new(None),
        }
    }

    pub fn year(&self) -> i32 {
        self.shared.year
    }

    pub fn is_pending(&self) -> bool {
        self.shared
            .pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    pub fn set_year(&self, days: Days) {
        match self.shared.pending.lock() {
            Ok(mut pending) => *pending = Some(days),
            Err(err) => {
                warn!(year = self.shared.year, "writer state poisoned: {err}");
                return;
            }
        }

        let shared = Arc::clone(&self.shared);
        let delay = self.debounce;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(days) = shared.take_pending() {
                shared.spawn_flush(days);
            }
        });

        if let Ok(mut slot) = self.timer.lock() {
            if let Some(previous) = slot.replace(timer) {
                previous.abort();
            }
        }
    }

    /// Waits for flushes already started, then sends the pending snapshot
    /// right away and waits for it too.
    pub async fn flush_now(&self) {
        let timer = self.timer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(timer) = timer {
            timer.abort();
            // A timer that already fired may still be handing off its flush.
            let _ = timer.await;
        }
        for flush in self.shared.take_in_flight() {
            if let Err(err) = flush.await {
                warn!(year = self.shared.year, "remote flush task failed: {err}");
            }
        }
        if let Some(days) = self.shared.take_pending() {
            flush_days(Arc::clone(&self.shared.remote), self.shared.year, days).await;
        }
    }
}

impl Drop for YearWriter {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DayRecord, Mood};
    use crate::remote::MemoryRemoteKv;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    /// Memory store whose writes take a while to land.
    struct SlowRemote {
        inner: MemoryRemoteKv,
        delay: Duration,
    }

    #[async_trait]
    impl RemoteKv for SlowRemote {
        async fn get(&self, keys: &[String]) -> Result<Vec<KvPair>, RemoteError> {
            self.inner.get(keys).await
        }

        async fn set(&self, pair: KvPair) -> Result<(), RemoteError> {
            tokio::time::sleep(self.delay).await;
            self.inner.set(pair).await
        }
    }

    fn word(word: &str) -> DayRecord {
        DayRecord {
            mood: None,
            word: Some(word.to_string()),
        }
    }

    fn mood(mood: Mood) -> DayRecord {
        DayRecord {
            mood: Some(mood),
            word: None,
        }
    }

    fn days(entries: &[(&str, DayRecord)]) -> Days {
        entries
            .iter()
            .map(|(key, record)| (key.to_string(), record.clone()))
            .collect()
    }

    fn as_json(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn key_formats() {
        assert_eq!(year_key(2026), "doy:2026");
        assert_eq!(month_key(2026, 1), "doy:2026:01");
        assert_eq!(month_key(2026, 12), "doy:2026:12");
    }

    #[tokio::test]
    async fn load_requests_thirteen_keys_in_one_call() {
        let remote = MemoryRemoteKv::new();
        let loaded = load_year(&remote, 2026).await;
        assert!(loaded.is_empty());

        let calls = remote.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 13);
        assert!(calls[0].contains(&"doy:2026:01".to_string()));
        assert!(calls[0].contains(&"doy:2026:12".to_string()));
        assert!(calls[0].contains(&"doy:2026".to_string()));
    }

    #[tokio::test]
    async fn load_merges_monthly_chunks() {
        let remote = MemoryRemoteKv::with_values([
            ("doy:2026:01", json!({ "2026-01-01": { "word": "jan" } }).to_string()),
            ("doy:2026:03", json!({ "2026-03-15": { "mood": "red" } }).to_string()),
            ("doy:2026", String::new()),
        ]);
        let loaded = load_year(&remote, 2026).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["2026-01-01"].word.as_deref(), Some("jan"));
        assert_eq!(loaded["2026-03-15"].mood, Some(Mood::Red));
    }

    #[tokio::test]
    async fn load_falls_back_to_legacy_blob() {
        let remote = MemoryRemoteKv::with_values([(
            "doy:2026",
            json!({ "2026-01-01": { "word": "legacy" } }).to_string(),
        )]);
        let loaded = load_year(&remote, 2026).await;
        assert_eq!(loaded["2026-01-01"].word.as_deref(), Some("legacy"));
    }

    #[tokio::test]
    async fn load_ignores_legacy_when_any_chunk_exists() {
        let remote = MemoryRemoteKv::with_values([
            ("doy:2026:01", json!({ "2026-01-01": { "word": "monthly" } }).to_string()),
            (
                "doy:2026",
                json!({ "2026-01-01": { "word": "legacy" }, "2026-05-05": { "word": "old" } })
                    .to_string(),
            ),
        ]);
        let loaded = load_year(&remote, 2026).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["2026-01-01"].word.as_deref(), Some("monthly"));
    }

    #[tokio::test]
    async fn load_treats_non_objects_as_absent() {
        for raw in [json!("oops").to_string(), "null".to_string(), "{bad".to_string()] {
            let remote = MemoryRemoteKv::with_values([("doy:2026", raw)]);
            assert!(load_year(&remote, 2026).await.is_empty());
        }

        let remote = MemoryRemoteKv::with_values([
            ("doy:2026:02", "[1,2]".to_string()),
            ("doy:2026", json!({ "2026-01-01": { "word": "legacy" } }).to_string()),
        ]);
        let loaded = load_year(&remote, 2026).await;
        assert_eq!(loaded["2026-01-01"].word.as_deref(), Some("legacy"));
    }

    #[tokio::test]
    async fn load_swallows_transport_errors() {
        let remote = MemoryRemoteKv::with_values([(
            "doy:2026",
            json!({ "2026-01-01": { "word": "x" } }).to_string(),
        )]);
        remote.set_failing(true);
        assert!(load_year(&remote, 2026).await.is_empty());
    }

    #[tokio::test]
    async fn fetch_reports_transport_errors() {
        let remote = MemoryRemoteKv::new();
        remote.set_failing(true);
        assert!(matches!(
            fetch_year(&remote, 2026).await,
            Err(RemoteError::Unavailable(_))
        ));

        remote.set_failing(false);
        assert!(fetch_year(&remote, 2026).await.unwrap().is_empty());
    }

    #[test]
    fn partition_groups_by_month_and_skips_other_years() {
        let input = days(&[
            ("2026-01-01", word("a")),
            ("2026-01-31", word("b")),
            ("2026-03-15", mood(Mood::Green)),
            ("2025-01-01", word("old")),
            ("2026-xx-01", word("junk")),
        ]);
        let chunks = partition_by_month(2026, &input);
        assert_eq!(chunks.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(chunks[&1].len(), 2);
        assert_eq!(chunks[&3].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_debounces_and_writes_monthly_chunks() {
        let remote = Arc::new(MemoryRemoteKv::new());
        let writer = YearWriter::new(remote.clone(), 2026, DEFAULT_DEBOUNCE);

        writer.set_year(days(&[
            ("2026-01-01", word("a")),
            ("2026-03-15", mood(Mood::Green)),
        ]));
        tokio::time::sleep(Duration::from_millis(300)).await;
        writer.set_year(days(&[
            ("2026-01-01", word("b")),
            ("2026-03-15", mood(Mood::Green)),
        ]));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(remote.set_calls().is_empty());
        assert!(writer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let calls = remote.set_calls();
        assert_eq!(calls.len(), 3);
        assert!(!writer.is_pending());

        let jan = calls.iter().find(|c| c.key == "doy:2026:01").unwrap();
        assert_eq!(as_json(&jan.value), json!({ "2026-01-01": { "word": "b" } }));
        let mar = calls.iter().find(|c| c.key == "doy:2026:03").unwrap();
        assert_eq!(as_json(&mar.value), json!({ "2026-03-15": { "mood": "green" } }));
        let legacy = calls.iter().find(|c| c.key == "doy:2026").unwrap();
        assert_eq!(legacy.value, "");
    }

    #[tokio::test(start_paused = true)]
    async fn writer_clears_legacy_key_for_single_month() {
        let remote = Arc::new(MemoryRemoteKv::with_values([("doy:2026", "{}")]));
        let writer = YearWriter::new(remote.clone(), 2026, DEFAULT_DEBOUNCE);
        writer.set_year(days(&[("2026-05-10", word("hello"))]));

        tokio::time::sleep(Duration::from_millis(650)).await;
        let keys: Vec<String> = remote.set_calls().into_iter().map(|c| c.key).collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"doy:2026:05".to_string()));
        assert!(keys.contains(&"doy:2026".to_string()));
        assert_eq!(remote.value("doy:2026").as_deref(), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn writer_swallows_remote_failures() {
        let remote = Arc::new(MemoryRemoteKv::new());
        remote.set_failing(true);
        let writer = YearWriter::new(remote.clone(), 2026, DEFAULT_DEBOUNCE);
        writer.set_year(days(&[("2026-02-02", word("x"))]));

        tokio::time::sleep(Duration::from_millis(650)).await;
        assert_eq!(remote.set_calls().len(), 2);
        assert!(!writer.is_pending());

        remote.set_failing(false);
        writer.set_year(days(&[("2026-02-02", word("y"))]));
        tokio::time::sleep(Duration::from_millis(650)).await;
        let loaded = load_year(remote.as_ref(), 2026).await;
        assert_eq!(loaded["2026-02-02"].word.as_deref(), Some("y"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_now_skips_the_timer() {
        let remote = Arc::new(MemoryRemoteKv::new());
        let writer = YearWriter::new(remote.clone(), 2026, DEFAULT_DEBOUNCE);
        writer.set_year(days(&[("2026-07-04", mood(Mood::Yellow))]));
        writer.flush_now().await;
        assert_eq!(remote.set_calls().len(), 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(remote.set_calls().len(), 2);

        writer.flush_now().await;
        assert_eq!(remote.set_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip_through_writer_and_loader() {
        let remote = Arc::new(MemoryRemoteKv::new());
        let writer = YearWriter::new(remote.clone(), 2024, DEFAULT_DEBOUNCE);
        let input = days(&[
            ("2024-02-29", mood(Mood::Blue)),
            ("2024-12-31", word("end")),
        ]);
        writer.set_year(input.clone());
        writer.flush_now().await;
        assert_eq!(load_year(remote.as_ref(), 2024).await, input);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_now_waits_for_a_flush_already_running() {
        let remote = Arc::new(SlowRemote {
            inner: MemoryRemoteKv::new(),
            delay: Duration::from_secs(5),
        });
        let writer = YearWriter::new(remote.clone(), 2026, DEFAULT_DEBOUNCE);
        writer.set_year(days(&[("2026-08-08", word("late"))]));

        tokio::time::sleep(Duration::from_millis(650)).await;
        assert!(!writer.is_pending());
        assert!(remote.inner.set_calls().is_empty());

        writer.flush_now().await;
        let calls = remote.inner.set_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().any(|c| c.key == "doy:2026:08"));
    }
}
