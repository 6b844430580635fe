//! Currency conversion abstractions

use super::error::{FetchError, MissingFxRate};
use super::window::DateWindow;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Symbol used by the market-data provider, e.g. `HKDUSD=X`.
    pub fn provider_symbol(&self) -> String {
        format!("{}{}=X", self.from, self.to)
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FxRate {
    pub pair: CurrencyPair,
    pub date: NaiveDate,
    pub rate: f64,
}

#[async_trait]
pub trait FxRateProvider: Send + Sync {
    /// Fetches daily rates for `pair` within `window`, ascending by date.
    async fn fetch_rates(
        &self,
        pair: &CurrencyPair,
        window: &DateWindow,
    ) -> Result<Vec<FxRate>, FetchError>;
}

/// Splits a quoted currency into the currency that carries FX rates and the
/// factor that turns a quote into that currency.
///
/// London listings are quoted in pence (`GBp`) and Tel Aviv in agorot (`ILA`).
pub fn major_unit(currency: &str) -> (String, f64) {
    match currency {
        "GBp" | "GBX" => ("GBP".to_string(), 0.01),
        "ILA" => ("ILS".to_string(), 0.01),
        "ZAc" => ("ZAR".to_string(), 0.01),
        other => (other.to_string(), 1.0),
    }
}

/// Converts native-currency amounts into the reporting currency.
///
/// Missing rates fall back to the most recent prior day.
#[derive(Debug, Clone)]
pub struct CurrencyNormalizer {
    reporting: String,
    rates: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl CurrencyNormalizer {
    pub fn new(reporting: &str) -> Self {
        Self {
            reporting: reporting.to_string(),
            rates: HashMap::new(),
        }
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting
    }

    pub fn add_rates(&mut self, rates: impl IntoIterator<Item = FxRate>) {
        for rate in rates {
            if rate.pair.to != self.reporting {
                debug!("Ignoring rate for {} (reporting is {})", rate.pair, self.reporting);
                continue;
            }
            self.rates
                .entry(rate.pair.from)
                .or_default()
                .insert(rate.date, rate.rate);
        }
    }

    /// Rate converting one unit of `from` into the reporting currency on `date`.
    pub fn rate_on(&self, from: &str, date: NaiveDate) -> Result<f64, MissingFxRate> {
        let (major, factor) = major_unit(from);
        if major == self.reporting {
            return Ok(factor);
        }

        self.rates
            .get(&major)
            .and_then(|series| series.range(..=date).next_back())
            .map(|(rate_date, rate)| {
                if *rate_date != date {
                    debug!("Using {major} rate from {rate_date} for {date}");
                }
                rate * factor
            })
            .ok_or_else(|| MissingFxRate {
                from: from.to_string(),
                to: self.reporting.clone(),
                date,
            })
    }

    pub fn convert(&self, amount: f64, from: &str, date: NaiveDate) -> Result<f64, MissingFxRate> {
        Ok(amount * self.rate_on(from, date)?)
    }
}
