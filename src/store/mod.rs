//! SQLite-backed store for prices, exchange rates and positions.
//!
//! All series tables share one reconciliation rule: a `(key, date)` row is
//! written once and never rewritten. Re-fetched rows that match are counted as
//! unchanged, rows that disagree are reported as conflicts and dropped.

pub mod positions;
pub mod prices;
pub mod rates;

use crate::core::error::{ReconciliationConflict, StoreError};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, warn};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS daily_prices (
    ticker      TEXT NOT NULL,
    date        TEXT NOT NULL,
    close_price REAL NOT NULL,
    currency    TEXT NOT NULL,
    PRIMARY KEY (ticker, date)
);

CREATE TABLE IF NOT EXISTS exchange_rates (
    from_currency TEXT NOT NULL,
    to_currency   TEXT NOT NULL,
    date          TEXT NOT NULL,
    rate          REAL NOT NULL,
    PRIMARY KEY (from_currency, to_currency, date)
);

CREATE TABLE IF NOT EXISTS positions (
    participant TEXT NOT NULL,
    ticker      TEXT NOT NULL,
    exchange    TEXT,
    quantity    REAL,
    weight      REAL,
    entry_date  TEXT NOT NULL,
    PRIMARY KEY (participant, ticker)
);
"#;

/// Relative tolerance under which a re-fetched value equals the stored one.
const VALUE_TOLERANCE: f64 = 1e-9;

/// Outcome of reconciling one fetched batch with stored history.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpsertReport {
    pub inserted: usize,
    pub unchanged: usize,
    pub conflicts: Vec<ReconciliationConflict>,
}

pub struct PriceStore {
    conn: Connection,
}

impl PriceStore {
    /// Opens or creates the database at `path` and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening price store at {}", path.as_ref().display());
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

fn values_match(stored: f64, fetched: f64) -> bool {
    stored == fetched || (stored - fetched).abs() <= VALUE_TOLERANCE * stored.abs().max(fetched.abs())
}

/// Applies insert-or-keep to each row of a batch.
///
/// `insert` returns the number of rows written (0 when the key already
/// exists); `lookup` returns the stored value for a date. Must run inside the
/// caller's transaction so the batch commits or rolls back as one.
fn reconcile<T>(
    key: &str,
    rows: &[T],
    date_value: impl Fn(&T) -> (NaiveDate, f64),
    mut insert: impl FnMut(&T) -> rusqlite::Result<usize>,
    mut lookup: impl FnMut(NaiveDate) -> rusqlite::Result<f64>,
) -> Result<UpsertReport, StoreError> {
    let mut report = UpsertReport::default();

    for row in rows {
        if insert(row)? > 0 {
            report.inserted += 1;
            continue;
        }

        let (date, fetched) = date_value(row);
        let stored = lookup(date)?;
        if values_match(stored, fetched) {
            report.unchanged += 1;
        } else {
            let conflict = ReconciliationConflict {
                key: key.to_string(),
                date,
                stored,
                fetched,
            };
            warn!("Reconciliation conflict, keeping stored value: {conflict}");
            report.conflicts.push(conflict);
        }
    }

    debug!(
        "{key}: {} inserted, {} unchanged, {} conflicts",
        report.inserted,
        report.unchanged,
        report.conflicts.len()
    );
    Ok(report)
}
