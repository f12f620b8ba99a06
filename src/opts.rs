//! Connection options.

use std::time::Duration;

#[cfg(not(debug_assertions))]
use no_panic::no_panic;
use url::Url;

use crate::error::Error;
use crate::state::transaction::{IsolationLevel, SchemeQueryTxMode};

/// Connection options for YDB.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Hostname or IP address of the endpoint.
    ///
    /// Default: `""`
    pub host: String,

    /// Port number of the endpoint.
    ///
    /// Default: `2135`
    pub port: u16,

    /// Use a TLS endpoint (`grpcs://`).
    ///
    /// Default: `false`
    pub secure: bool,

    /// Database path, e.g. `/local`.
    ///
    /// Default: `""`
    pub database: String,

    /// Commit every execution on its own.
    ///
    /// Default: `true`
    pub auto_commit: bool,

    /// Isolation level of new transactions.
    ///
    /// Default: `IsolationLevel::SerializableRw`
    pub isolation_level: IsolationLevel,

    /// How DDL behaves while a transaction is open.
    ///
    /// Default: `SchemeQueryTxMode::CommitFirst`
    pub scheme_query_tx_mode: SchemeQueryTxMode,

    /// Upper bound of every blocking join (session creation, result set
    /// resolution, commit).
    ///
    /// Default: 5 minutes
    pub join_duration: Duration,

    /// Deadline of one query, counted from its start.
    ///
    /// Default: `None`
    pub query_timeout: Option<Duration>,

    /// Number of row batches buffered per result set before the stream is
    /// paused.
    ///
    /// Default: `5`
    pub result_queue_capacity: usize,

    /// Interval at which blocked producers and consumers re-check for
    /// cancellation.
    ///
    /// Default: 100ms
    pub poll_interval: Duration,

    /// Additional connection parameters.
    ///
    /// Default: `[]`
    pub params: Vec<(String, String)>,
}

impl Default for Opts {
    #[cfg_attr(not(debug_assertions), no_panic)]
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 2135,
            secure: false,
            database: String::new(),
            auto_commit: true,
            isolation_level: IsolationLevel::SerializableRw,
            scheme_query_tx_mode: SchemeQueryTxMode::CommitFirst,
            join_duration: Duration::from_secs(300),
            query_timeout: None,
            result_queue_capacity: 5,
            poll_interval: Duration::from_millis(100),
            params: Vec::new(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {}: {}", key, value))),
    }
}

/// Parse a duration such as `1500ms`, `30s` or `1m 30s`. A bare number is
/// seconds.
fn parse_duration(key: &str, value: &str) -> Result<Duration, Error> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value)
        .map_err(|e| Error::InvalidUsage(format!("Invalid {}: {} ({})", key, value, e)))
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a YDB connection URL.
    ///
    /// Format: `ydb://host[:port]/database[?param1=value1&param2=value2&..]`
    /// (`grpc://` and `grpcs://` are accepted as well)
    ///
    /// Supported query parameters:
    /// - `autoCommit`: true/True/1/yes/on or false/False/0/no/off
    /// - `isolation`: serializable, online-consistent, stale, online-inconsistent
    /// - `schemeQueryTxMode`: COMMIT_FIRST (alias ERROR), SHADOW_COMMIT, FAKE_TX
    /// - `joinDuration`, `queryTimeout`, `pollInterval`: bare seconds or a
    ///   humantime duration such as `1500ms`, `30s`, `1m 30s`
    /// - `resultQueueCapacity`: positive integer
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let secure = match url.scheme() {
            "ydb" | "grpc" => false,
            "grpcs" => true,
            other => {
                return Err(Error::InvalidUsage(format!(
                    "Invalid scheme: expected 'ydb://', 'grpc://' or 'grpcs://', got '{}://'",
                    other
                )));
            }
        };

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(2135),
            secure,
            database: url.path().trim_end_matches('/').to_string(),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "autoCommit" => {
                    opts.auto_commit = parse_bool(&key, &value)?;
                }
                "isolation" => {
                    opts.isolation_level = value.parse()?;
                }
                "schemeQueryTxMode" => {
                    opts.scheme_query_tx_mode = value.parse()?;
                }
                "joinDuration" => {
                    opts.join_duration = parse_duration(&key, &value)?;
                }
                "queryTimeout" => {
                    opts.query_timeout = Some(parse_duration(&key, &value)?);
                }
                "pollInterval" => {
                    opts.poll_interval = parse_duration(&key, &value)?;
                }
                "resultQueueCapacity" => {
                    opts.result_queue_capacity = match value.parse::<usize>() {
                        Ok(n) if n > 0 => n,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid resultQueueCapacity: {}",
                                value
                            )));
                        }
                    };
                }
                _ => {
                    opts.params.push((key.to_string(), value.to_string()));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
