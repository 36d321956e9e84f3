//! Per-account key-value store offered by the host platform.
//!
//! The core only needs two calls: a batched get and a single-key set. The
//! host exposes them over HTTP; [`MemoryRemoteKv`] stands in when the app
//! runs outside a host.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("remote storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct GetRequest<'a> {
    keys: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    keys: Vec<KvPair>,
}

#[async_trait]
pub trait RemoteKv: Send + Sync {
    /// Values for `keys`. Keys the store has never seen may be missing from
    /// the result or come back with an empty value.
    async fn get(&self, keys: &[String]) -> Result<Vec<KvPair>, RemoteError>;

    async fn set(&self, pair: KvPair) -> Result<(), RemoteError>;
}

/// Client for the host bridge's storage endpoints.
#[derive(Debug, Clone)]
pub struct HttpRemoteKv {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemoteKv {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteKv for HttpRemoteKv {
    async fn get(&self, keys: &[String]) -> Result<Vec<KvPair>, RemoteError> {
        let response = self
            .post("/storage/get")
            .json(&GetRequest { keys })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        let body: GetResponse = serde_json::from_slice(&bytes)?;
        Ok(body.keys)
    }

    async fn set(&self, pair: KvPair) -> Result<(), RemoteError> {
        let response = self.post("/storage/set").json(&pair).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status()));
        }
        Ok(())
    }
}

/// Process-local store. Records every `set` so callers can inspect what was
/// written, and can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryRemoteKv {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, String>,
    get_calls: Vec<Vec<String>>,
    set_calls: Vec<KvPair>,
    failing: bool,
}

impl MemoryRemoteKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.values = values
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect();
        }
        store
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing = failing;
        }
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.inner.lock().ok()?.values.get(key).cloned()
    }

    pub fn get_calls(&self) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .map(|inner| inner.get_calls.clone())
            .unwrap_or_default()
    }

    pub fn set_calls(&self) -> Vec<KvPair> {
        self.inner
            .lock()
            .map(|inner| inner.set_calls.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, RemoteError> {
        self.inner
            .lock()
            .map_err(|err| RemoteError::Unavailable(format!("memory store poisoned: {err}")))
    }
}

#[async_trait]
impl RemoteKv for MemoryRemoteKv {
    async fn get(&self, keys: &[String]) -> Result<Vec<KvPair>, RemoteError> {
        let mut inner = self.lock()?;
        inner.get_calls.push(keys.to_vec());
        if inner.failing {
            return Err(RemoteError::Unavailable("memory store set to fail".into()));
        }
        Ok(keys
            .iter()
            .filter_map(|key| {
                inner.values.get(key).map(|value| KvPair {
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect())
    }

    async fn set(&self, pair: KvPair) -> Result<(), RemoteError> {
        let mut inner = self.lock()?;
        inner.set_calls.push(pair.clone());
        if inner.failing {
            return Err(RemoteError::Unavailable("memory store set to fail".into()));
        }
        inner.values.insert(pair.key, pair.value);
        Ok(())
    }
}
