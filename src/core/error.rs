//! Error types shared by the fetch, store and valuation layers

use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// Failure to retrieve a series from the market-data provider.
///
/// A fetch error is never retried within a run: the ticker is skipped and the
/// next scheduled update picks it up again with a wider window.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request error for {symbol}: {source}")]
    Request {
        symbol: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error: {status} for symbol: {symbol}")]
    Status {
        symbol: String,
        status: reqwest::StatusCode,
    },
    #[error("No price data found for symbol: {0}")]
    NoData(String),
    #[error("Failed to parse response for {symbol}: {message}")]
    Parse { symbol: String, message: String },
}

/// A fetched value that disagrees with the one already stored for the same key.
///
/// Conflicts are reported, never applied: the stored value wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationConflict {
    pub key: String,
    pub date: NaiveDate,
    pub stored: f64,
    pub fetched: f64,
}

impl fmt::Display for ReconciliationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}: stored {} but provider returned {}",
            self.key, self.date, self.stored, self.fetched
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No exchange rate from {from} to {to} on or before {date}")]
pub struct MissingFxRate {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Row for {found} passed in a batch for {expected}")]
    TickerMismatch { expected: String, found: String },
    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}
