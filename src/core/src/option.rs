use std::fmt::Display;
use std::time::Duration;

use common_exception::{BoundariesError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};

use crate::header::HEADER_PREFIX_SIZE;

/// Default largest gap, in bytes, bridged when merging feature ranges.
pub const DEFAULT_RANGE_GAP_TOLERANCE: u64 = 32 * 1024;

/// Default number of merged ranges fetched concurrently.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Default size of the first read, which usually holds the whole header.
pub const DEFAULT_HEADER_PREFETCH_BYTES: u64 = 16 * 1024;

/// Default largest index loaded in full when a dataset is opened.
pub const DEFAULT_INDEX_PREFETCH_LIMIT: u64 = 8 * 1024 * 1024;

/// Prefix of option keys and, upper-cased, of their environment variables.
pub const OPTION_PREFIX: &str = "boundaries";

/// A single option with its current value, as listed by
/// [`ReaderOptions::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
    pub description: &'static str,
}

/// Configuration options for reading datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Feature ranges separated by at most this many bytes are fetched with a
    /// single request
    pub range_gap_tolerance: u64,

    /// Maximum number of range requests in flight for one query
    pub fetch_concurrency: usize,

    /// Size of the first read of a dataset; a larger header costs one more
    /// request
    pub header_prefetch_bytes: u64,

    /// Indexes up to this size are loaded when a dataset is opened; larger ones
    /// are traversed remotely level by level
    pub index_prefetch_limit: u64,

    /// Options for HTTP sources
    pub http: HttpOptions,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            range_gap_tolerance: DEFAULT_RANGE_GAP_TOLERANCE,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            header_prefetch_bytes: DEFAULT_HEADER_PREFETCH_BYTES,
            index_prefetch_limit: DEFAULT_INDEX_PREFETCH_LIMIT,
            http: HttpOptions::default(),
        }
    }
}

/// Configuration options for HTTP sources.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Deadline of a single request, in seconds when deserialized
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub timeout: Duration,

    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            user_agent: format!("boundaries/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ReaderOptions {
    /// Set an option from its string form, e.g. `("range_gap_tolerance",
    /// "64KiB")`. Keys may carry the `boundaries.` prefix.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let key = key
            .strip_prefix(OPTION_PREFIX)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(key);
        match key {
            "range_gap_tolerance" => self.range_gap_tolerance = parse_byte_size(value)?,
            "fetch_concurrency" => self.fetch_concurrency = parse_number(key, value)?,
            "header_prefetch_bytes" => self.header_prefetch_bytes = parse_byte_size(value)?,
            "index_prefetch_limit" => self.index_prefetch_limit = parse_byte_size(value)?,
            "http.timeout" => self.http.timeout = parse_duration(value)?,
            "http.pool_max_idle_per_host" => {
                self.http.pool_max_idle_per_host = parse_number(key, value)?;
            }
            "http.user_agent" => value.clone_into(&mut self.http.user_agent),
            _ => {
                return Err(BoundariesError::Config(format!("Unknown option: {key}")));
            }
        }
        Ok(())
    }

    /// Defaults overridden by `BOUNDARIES_*` environment variables, e.g.
    /// `BOUNDARIES_HTTP_TIMEOUT=5s`.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        options.apply_env(std::env::vars())?;
        Ok(options)
    }

    /// Apply the variables among `vars` that name an option.
    pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        let keys: Vec<(String, String)> = self
            .entries()
            .into_iter()
            .map(|entry| (env_var_name(&entry.key), entry.key))
            .collect();

        for (name, value) in vars {
            if let Some((_, key)) = keys.iter().find(|(var, _)| *var == name) {
                self.set(key, &value)?;
            }
        }
        self.validate()
    }

    /// Every option with its current value and description.
    pub fn entries(&self) -> Vec<ConfigEntry> {
        struct Visitor(Vec<ConfigEntry>);

        impl Visitor {
            fn some<V: Display>(&mut self, key: &str, value: V, description: &'static str) {
                self.0.push(ConfigEntry {
                    key: format!("{OPTION_PREFIX}.{key}"),
                    value: Some(value.to_string()),
                    description,
                })
            }
        }

        let mut v = Visitor(vec![]);
        v.some(
            "range_gap_tolerance",
            self.range_gap_tolerance,
            "Feature ranges separated by at most this many bytes are fetched with a single request",
        );
        v.some(
            "fetch_concurrency",
            self.fetch_concurrency,
            "Maximum number of range requests in flight for one query",
        );
        v.some(
            "header_prefetch_bytes",
            self.header_prefetch_bytes,
            "Size of the first read of a dataset",
        );
        v.some(
            "index_prefetch_limit",
            self.index_prefetch_limit,
            "Indexes up to this size are loaded when a dataset is opened",
        );
        v.some(
            "http.timeout",
            format!("{}ms", self.http.timeout.as_millis()),
            "Deadline of a single HTTP request",
        );
        v.some(
            "http.pool_max_idle_per_host",
            self.http.pool_max_idle_per_host,
            "Idle HTTP connections kept per host",
        );
        v.some(
            "http.user_agent",
            &self.http.user_agent,
            "User agent sent with every HTTP request",
        );
        v.0
    }

    /// Reject option combinations the reader cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch_concurrency == 0 {
            return Err(BoundariesError::Config("fetch_concurrency must be at least 1".to_owned()));
        }
        if self.header_prefetch_bytes < HEADER_PREFIX_SIZE as u64 {
            return Err(BoundariesError::Config(format!(
                "header_prefetch_bytes must be at least {HEADER_PREFIX_SIZE}, got {}",
                self.header_prefetch_bytes
            )));
        }
        if self.http.timeout.is_zero() {
            return Err(BoundariesError::Config("http.timeout must be positive".to_owned()));
        }
        Ok(())
    }
}

fn env_var_name(key: &str) -> String {
    key.replace('.', "_").to_uppercase()
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        BoundariesError::Config(format!("Invalid value for {key}: {value}"))
    })
}

/// Parse `1024`, `64KiB`, `8 MiB`, `16kb` and similar into bytes.
fn parse_byte_size(value: &str) -> Result<u64> {
    let size_regex = Regex::new(r"^(?i)\s*(\d+)\s*(b|kb|kib|mb|mib|gb|gib)?\s*$")
        .map_err(|err| BoundariesError::Config(err.to_string()))?;
    let captures = size_regex.captures(value).ok_or_else(|| {
        BoundariesError::Config(format!(
            "Invalid byte size: {value}. Expected formats: 1024, 64KiB, 8MiB, 1GiB"
        ))
    })?;

    let number: u64 = parse_number("byte size", &captures[1])?;
    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_lowercase())
        .unwrap_or_default();
    let multiplier: u64 = match unit.as_str() {
        "" | "b" => 1,
        "kb" | "kib" => 1024,
        "mb" | "mib" => 1024 * 1024,
        _ => 1024 * 1024 * 1024,
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| BoundariesError::Config(format!("Byte size out of range: {value}")))
}

/// Parse `30s`, `1500ms`, `2m` or a bare number of seconds.
fn parse_duration(value: &str) -> Result<Duration> {
    let duration_regex = Regex::new(r"^(?i)\s*(\d+)\s*(ms|s|m)?\s*$")
        .map_err(|err| BoundariesError::Config(err.to_string()))?;
    let captures = duration_regex.captures(value).ok_or_else(|| {
        BoundariesError::Config(format!(
            "Invalid duration: {value}. Expected formats: 30, 30s, 1500ms, 2m"
        ))
    })?;

    let number: u64 = parse_number("duration", &captures[1])?;
    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_lowercase())
        .unwrap_or_default();
    Ok(match unit.as_str() {
        "ms" => Duration::from_millis(number),
        "m" => Duration::from_secs(number.saturating_mul(60)),
        _ => Duration::from_secs(number),
    })
}
