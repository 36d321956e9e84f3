use crate::sync::DEFAULT_DEBOUNCE;
use std::{env, path::PathBuf, time::Duration};
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/storage.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub remote_url: Option<String>,
    pub remote_token: Option<String>,
    pub sync_debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            remote_url: None,
            remote_token: None,
            sync_debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            port: parse_or(non_empty("PORT"), "PORT", defaults.port),
            data_path: non_empty("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            remote_url: non_empty("DOY_REMOTE_URL"),
            remote_token: non_empty("DOY_REMOTE_TOKEN"),
            sync_debounce: Duration::from_millis(parse_or(
                non_empty("DOY_SYNC_DEBOUNCE_MS"),
                "DOY_SYNC_DEBOUNCE_MS",
                defaults.sync_debounce.as_millis() as u64,
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, name: &str, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("ignoring invalid {name}={value}");
            default
        }),
        None => default,
    }
}
