use super::{PriceStore, UpsertReport, reconcile};
use crate::core::error::StoreError;
use crate::core::price::PriceObservation;
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;

impl PriceStore {
    /// Most recent date with a stored close for `ticker`.
    pub fn latest_stored_date(&self, ticker: &str) -> Result<Option<NaiveDate>, StoreError> {
        let latest = self
            .conn
            .query_row(
                "SELECT MAX(date) FROM daily_prices WHERE ticker = ?1",
                params![ticker],
                |row| row.get::<_, Option<NaiveDate>>(0),
            )
            .optional()?
            .flatten();
        Ok(latest)
    }

    /// Inserts new `(ticker, date)` rows and keeps stored ones untouched.
    ///
    /// The whole batch is written in one transaction. Calling this again with
    /// the same or overlapping rows inserts nothing new.
    pub fn upsert_observations(
        &mut self,
        ticker: &str,
        rows: &[PriceObservation],
    ) -> Result<UpsertReport, StoreError> {
        if let Some(row) = rows.iter().find(|r| r.ticker != ticker) {
            return Err(StoreError::TickerMismatch {
                expected: ticker.to_string(),
                found: row.ticker.clone(),
            });
        }

        let tx = self.conn.transaction()?;
        let report = {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO daily_prices (ticker, date, close_price, currency)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut lookup = tx.prepare_cached(
                "SELECT close_price FROM daily_prices WHERE ticker = ?1 AND date = ?2",
            )?;

            reconcile(
                ticker,
                rows,
                |row| (row.date, row.close_price),
                |row| insert.execute(params![row.ticker, row.date, row.close_price, row.currency]),
                |date| lookup.query_row(params![ticker, date], |row| row.get(0)),
            )?
        };
        tx.commit()?;
        Ok(report)
    }

    /// Stored closes for `ticker` between `start` and `end` inclusive, oldest
    /// first. Days without a stored close are absent.
    pub fn query_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ticker, date, close_price, currency FROM daily_prices
             WHERE ticker = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;
        let rows = stmt
            .query_map(params![ticker, start, end], |row| {
                Ok(PriceObservation {
                    ticker: row.get(0)?,
                    date: row.get(1)?,
                    close_price: row.get(2)?,
                    currency: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `query_range` for several tickers, keyed by ticker.
    pub fn price_history(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Vec<PriceObservation>>, StoreError> {
        tickers
            .iter()
            .map(|ticker| Ok((ticker.clone(), self.query_range(ticker, start, end)?)))
            .collect()
    }

    pub fn row_count(&self, ticker: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_prices WHERE ticker = ?1",
            params![ticker],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn tickers(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT ticker FROM daily_prices ORDER BY ticker")?;
        let tickers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tickers)
    }

    /// Quote currencies of all stored closes.
    pub fn currencies_in_use(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT currency FROM daily_prices ORDER BY currency")?;
        let currencies = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(currencies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn obs(ticker: &str, date: &str, close: f64) -> PriceObservation {
        PriceObservation::new(ticker, d(date), close, "USD")
    }

    fn all_rows(store: &PriceStore, ticker: &str) -> Vec<PriceObservation> {
        store
            .query_range(ticker, d("2000-01-01"), d("2100-01-01"))
            .unwrap()
    }

    #[test]
    fn test_latest_stored_date_empty() {
        let store = PriceStore::open_in_memory().unwrap();
        assert_eq!(store.latest_stored_date("ACME").unwrap(), None);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = PriceStore::open_in_memory().unwrap();
        let rows = vec![
            obs("ACME", "2025-01-02", 10.0),
            obs("ACME", "2025-01-03", 10.5),
            obs("ACME", "2025-01-06", 11.0),
        ];

        let first = store.upsert_observations("ACME", &rows).unwrap();
        let after_first = all_rows(&store, "ACME");
        let second = store.upsert_observations("ACME", &rows).unwrap();

        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.unchanged, 3);
        assert!(second.conflicts.is_empty());
        assert_eq!(all_rows(&store, "ACME"), after_first);
    }

    #[test]
    fn test_sequential_updates_leave_no_gaps_or_duplicates() {
        let mut store = PriceStore::open_in_memory().unwrap();
        store
            .upsert_observations(
                "ACME",
                &[obs("ACME", "2025-01-02", 10.0), obs("ACME", "2025-01-03", 10.5)],
            )
            .unwrap();

        // A refetch overlapping the last stored day
        store
            .upsert_observations(
                "ACME",
                &[
                    obs("ACME", "2025-01-03", 10.5),
                    obs("ACME", "2025-01-06", 11.0),
                    obs("ACME", "2025-01-07", 11.5),
                    obs("ACME", "2025-01-08", 12.0),
                ],
            )
            .unwrap();

        let dates: Vec<NaiveDate> = all_rows(&store, "ACME").iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![
                d("2025-01-02"),
                d("2025-01-03"),
                d("2025-01-06"),
                d("2025-01-07"),
                d("2025-01-08")
            ]
        );
        assert_eq!(store.row_count("ACME").unwrap(), 5);
    }

    #[test]
    fn test_conflicting_refetch_keeps_stored_value() {
        let mut store = PriceStore::open_in_memory().unwrap();
        store
            .upsert_observations("ACME", &[obs("ACME", "2025-01-02", 10.0)])
            .unwrap();

        let report = store
            .upsert_observations(
                "ACME",
                &[obs("ACME", "2025-01-02", 99.0), obs("ACME", "2025-01-03", 10.5)],
            )
            .unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].stored, 10.0);
        assert_eq!(report.conflicts[0].fetched, 99.0);
        assert_eq!(report.conflicts[0].key, "ACME");

        let rows = all_rows(&store, "ACME");
        assert_eq!(rows[0].close_price, 10.0);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_mismatched_ticker_writes_nothing() {
        let mut store = PriceStore::open_in_memory().unwrap();
        let rows = vec![obs("ACME", "2025-01-02", 10.0), obs("OTHER", "2025-01-02", 5.0)];

        let err = store.upsert_observations("ACME", &rows).unwrap_err();

        assert!(matches!(err, StoreError::TickerMismatch { .. }));
        assert_eq!(store.row_count("ACME").unwrap(), 0);
    }

    #[test]
    fn test_query_range_is_inclusive_and_ordered() {
        let mut store = PriceStore::open_in_memory().unwrap();
        store
            .upsert_observations(
                "ACME",
                &[
                    obs("ACME", "2025-01-08", 12.0),
                    obs("ACME", "2025-01-02", 10.0),
                    obs("ACME", "2025-01-06", 11.0),
                ],
            )
            .unwrap();

        let rows = store
            .query_range("ACME", d("2025-01-02"), d("2025-01-06"))
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d("2025-01-02"));
        assert_eq!(rows[1].date, d("2025-01-06"));
        assert_eq!(store.latest_stored_date("ACME").unwrap(), Some(d("2025-01-08")));
    }

    #[test]
    fn test_tickers_and_currencies() {
        let mut store = PriceStore::open_in_memory().unwrap();
        store
            .upsert_observations("TSM", &[obs("TSM", "2025-01-02", 200.0)])
            .unwrap();
        store
            .upsert_observations(
                "0700.HK",
                &[PriceObservation::new("0700.HK", d("2025-01-02"), 400.0, "HKD")],
            )
            .unwrap();

        assert_eq!(store.tickers().unwrap(), vec!["0700.HK", "TSM"]);
        assert_eq!(store.currencies_in_use().unwrap(), vec!["HKD", "USD"]);

        let history = store
            .price_history(&["TSM".to_string(), "NVDA".to_string()], d("2025-01-01"), d("2025-01-31"))
            .unwrap();
        assert_eq!(history["TSM"].len(), 1);
        assert!(history["NVDA"].is_empty());
    }

    #[test]
    fn test_failing_row_rolls_back_whole_batch() {
        let mut store = PriceStore::open_in_memory().unwrap();
        store
            .upsert_observations("ACME", &[obs("ACME", "2025-01-02", 10.0)])
            .unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_negative_close BEFORE INSERT ON daily_prices
                 WHEN NEW.close_price < 0
                 BEGIN SELECT RAISE(ABORT, 'negative close'); END;",
            )
            .unwrap();

        let err = store
            .upsert_observations(
                "ACME",
                &[
                    obs("ACME", "2025-01-03", 10.5),
                    obs("ACME", "2025-01-06", 11.0),
                    obs("ACME", "2025-01-07", -1.0),
                ],
            )
            .unwrap_err();

        assert!(matches!(err, StoreError::Sqlite(_)));
        let dates: Vec<NaiveDate> = all_rows(&store, "ACME").iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![d("2025-01-02")]);
        assert_eq!(store.latest_stored_date("ACME").unwrap(), Some(d("2025-01-02")));
    }
}
