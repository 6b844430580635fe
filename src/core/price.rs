//! Pricing abstractions and core types

use super::error::FetchError;
use super::window::DateWindow;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A daily close for one ticker. Uniquely identified by `(ticker, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub ticker: String,
    pub date: NaiveDate,
    pub close_price: f64,
    pub currency: String,
}

impl PriceObservation {
    pub fn new(ticker: &str, date: NaiveDate, close_price: f64, currency: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            date,
            close_price,
            currency: currency.to_string(),
        }
    }
}

#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Fetches daily closes for `ticker` within `window`, ascending by date.
    async fn fetch_history(
        &self,
        ticker: &str,
        window: &DateWindow,
    ) -> Result<Vec<PriceObservation>, FetchError>;
}
