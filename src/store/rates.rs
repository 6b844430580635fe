use super::{PriceStore, UpsertReport, reconcile};
use crate::core::currency::{CurrencyNormalizer, CurrencyPair, FxRate};
use crate::core::error::StoreError;
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};

impl PriceStore {
    pub fn latest_rate_date(&self, pair: &CurrencyPair) -> Result<Option<NaiveDate>, StoreError> {
        let latest = self
            .conn
            .query_row(
                "SELECT MAX(date) FROM exchange_rates WHERE from_currency = ?1 AND to_currency = ?2",
                params![pair.from, pair.to],
                |row| row.get::<_, Option<NaiveDate>>(0),
            )
            .optional()?
            .flatten();
        Ok(latest)
    }

    /// Same contract as `upsert_observations`, keyed by `(pair, date)`.
    pub fn upsert_rates(
        &mut self,
        pair: &CurrencyPair,
        rows: &[FxRate],
    ) -> Result<UpsertReport, StoreError> {
        if let Some(row) = rows.iter().find(|r| &r.pair != pair) {
            return Err(StoreError::TickerMismatch {
                expected: pair.to_string(),
                found: row.pair.to_string(),
            });
        }

        let key = pair.to_string();
        let tx = self.conn.transaction()?;
        let report = {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO exchange_rates (from_currency, to_currency, date, rate)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut lookup = tx.prepare_cached(
                "SELECT rate FROM exchange_rates
                 WHERE from_currency = ?1 AND to_currency = ?2 AND date = ?3",
            )?;

            reconcile(
                &key,
                rows,
                |row| (row.date, row.rate),
                |row| insert.execute(params![pair.from, pair.to, row.date, row.rate]),
                |date| lookup.query_row(params![pair.from, pair.to, date], |row| row.get(0)),
            )?
        };
        tx.commit()?;
        Ok(report)
    }

    pub fn query_rates(
        &self,
        pair: &CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FxRate>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT date, rate FROM exchange_rates
             WHERE from_currency = ?1 AND to_currency = ?2 AND date >= ?3 AND date <= ?4
             ORDER BY date ASC",
        )?;
        let rates = stmt
            .query_map(params![pair.from, pair.to, start, end], |row| {
                Ok(FxRate {
                    pair: pair.clone(),
                    date: row.get(0)?,
                    rate: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rates)
    }

    /// Every stored rate into `currency`, for loading a normalizer.
    pub fn rates_to(&self, currency: &str) -> Result<Vec<FxRate>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT from_currency, date, rate FROM exchange_rates
             WHERE to_currency = ?1
             ORDER BY from_currency, date",
        )?;
        let rates = stmt
            .query_map(params![currency], |row| {
                Ok(FxRate {
                    pair: CurrencyPair::new(&row.get::<_, String>(0)?, currency),
                    date: row.get(1)?,
                    rate: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rates)
    }

    /// Normalizer loaded with every stored rate into `reporting`.
    pub fn normalizer(&self, reporting: &str) -> Result<CurrencyNormalizer, StoreError> {
        let mut normalizer = CurrencyNormalizer::new(reporting);
        normalizer.add_rates(self.rates_to(reporting)?);
        Ok(normalizer)
    }
}
