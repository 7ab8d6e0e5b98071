use std::{env, fmt::Display, str::FromStr, time::Duration};

use crate::{mapper::NormalizationMode, search::SearchStrategy};

/// Per-process settings of the locator, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorConfig {
    pub search_timeout: Duration,
    pub ingest_timeout: Duration,
    pub fetch_timeout: Duration,
    pub search_strategy: SearchStrategy,
    pub normalization: NormalizationMode,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            search_timeout: Duration::from_secs(10),
            ingest_timeout: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(15),
            search_strategy: SearchStrategy::default(),
            normalization: NormalizationMode::default(),
        }
    }
}

impl LocatorConfig {
    /// Reads `SEARCH_TIMEOUT_SECS`, `INGEST_TIMEOUT_SECS`,
    /// `FETCH_TIMEOUT_SECS`, `SEARCH_STRATEGY` and `NORMALIZATION`. Unset or
    /// invalid variables keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let seconds = |key: &str, default: Duration| {
            match parse_or(&lookup, key, default.as_secs()) {
                0 => {
                    log::warn!("ignoring {}=0: a deadline must be positive", key);
                    default
                }
                seconds => Duration::from_secs(seconds),
            }
        };
        Self {
            search_timeout: seconds("SEARCH_TIMEOUT_SECS", defaults.search_timeout),
            ingest_timeout: seconds("INGEST_TIMEOUT_SECS", defaults.ingest_timeout),
            fetch_timeout: seconds("FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            search_strategy: parse_or(&lookup, "SEARCH_STRATEGY", defaults.search_strategy),
            normalization: parse_or(&lookup, "NORMALIZATION", defaults.normalization),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|why| {
            log::warn!("ignoring {}={:?}: {}", key, raw, why);
            default
        }),
    }
}
