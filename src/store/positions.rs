use super::PriceStore;
use crate::core::error::StoreError;
use crate::core::portfolio::Position;
use rusqlite::params;
use std::collections::HashSet;
use tracing::{debug, warn};

impl PriceStore {
    /// Replaces the stored position set with `positions`.
    ///
    /// Rows absent from `positions` are removed. A quantity already resolved
    /// for a weight-based pick survives, so entry sizes stay fixed across runs,
    /// unless its weight or entry date changed and it has to be sized again.
    pub fn save_positions(&mut self, positions: &[Position]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO positions (participant, ticker, exchange, quantity, weight, entry_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (participant, ticker) DO UPDATE SET
                     exchange = excluded.exchange,
                     weight = excluded.weight,
                     entry_date = excluded.entry_date,
                     quantity = CASE
                         WHEN excluded.weight IS NULL THEN excluded.quantity
                         WHEN positions.weight IS excluded.weight
                              AND positions.entry_date IS excluded.entry_date
                             THEN positions.quantity
                         ELSE NULL
                     END",
            )?;
            for p in positions {
                upsert.execute(params![
                    p.participant,
                    p.ticker,
                    p.exchange.map(|e| e.code()),
                    p.quantity,
                    p.weight,
                    p.entry_date,
                ])?;
            }

            let keep: HashSet<(&str, &str)> = positions
                .iter()
                .map(|p| (p.participant.as_str(), p.ticker.as_str()))
                .collect();
            let mut existing = tx.prepare_cached("SELECT participant, ticker FROM positions")?;
            let stale = existing
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .filter(|(participant, ticker)| !keep.contains(&(participant.as_str(), ticker.as_str())))
                .collect::<Vec<_>>();

            let mut delete =
                tx.prepare_cached("DELETE FROM positions WHERE participant = ?1 AND ticker = ?2")?;
            for (participant, ticker) in stale {
                debug!("Removing position {participant}/{ticker} no longer in config");
                delete.execute(params![participant, ticker])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_quantity(
        &self,
        participant: &str,
        ticker: &str,
        quantity: f64,
    ) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE positions SET quantity = ?3 WHERE participant = ?1 AND ticker = ?2",
            params![participant, ticker, quantity],
        )?;
        if updated == 0 {
            warn!("No stored position {participant}/{ticker} to size");
        }
        Ok(())
    }

    pub fn load_positions(&self) -> Result<Vec<Position>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT participant, ticker, exchange, quantity, weight, entry_date
             FROM positions ORDER BY participant, ticker",
        )?;
        let positions = stmt
            .query_map([], |row| {
                let exchange: Option<String> = row.get(2)?;
                Ok(Position {
                    participant: row.get(0)?,
                    ticker: row.get(1)?,
                    exchange: exchange.and_then(|e| e.parse().ok()),
                    quantity: row.get(3)?,
                    weight: row.get(4)?,
                    entry_date: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(positions)
    }
}
