//! Terminal front end: one module per subcommand plus shared table helpers.

pub mod alloc;
pub mod history;
pub mod prices;
pub mod setup;
pub mod standings;
pub mod ui;
pub mod update;

use crate::core::config::AppConfig;
use crate::core::currency::CurrencyNormalizer;
use crate::core::portfolio::Position;
use crate::core::price::PriceObservation;
use crate::core::valuation::{ValuationPoint, valuation_series};
use crate::store::PriceStore;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Everything stored that the reports value portfolios from.
pub struct MarketData {
    pub positions: Vec<Position>,
    pub prices: HashMap<String, Vec<PriceObservation>>,
    pub normalizer: CurrencyNormalizer,
}

impl MarketData {
    /// Loads positions, closes from the competition start through `end`, and
    /// every rate into the reporting currency.
    pub fn load(config: &AppConfig, store: &PriceStore, end: NaiveDate) -> Result<Self> {
        let positions = store.load_positions()?;
        let mut tickers: Vec<String> = positions.iter().map(|p| p.ticker.clone()).collect();
        tickers.sort();
        tickers.dedup();

        Ok(Self {
            prices: store.price_history(&tickers, config.competition.start_date, end)?,
            normalizer: store.normalizer(&config.currency)?,
            positions,
        })
    }

    /// Participants with stored positions, in name order.
    pub fn participants(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.positions.iter().map(|p| p.participant.as_str()).collect();
        names.dedup();
        names
    }

    pub fn valuation(&self, participant: &str) -> Vec<ValuationPoint> {
        valuation_series(participant, &self.positions, &self.prices, &self.normalizer)
    }
}
