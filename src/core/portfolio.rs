//! Participants' positions and how weight-based picks turn into share counts.
use super::currency::CurrencyNormalizer;
use super::exchange::Exchange;
use super::price::PriceObservation;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub participant: String,
    /// Provider symbol, e.g. `0700.HK`.
    pub ticker: String,
    pub exchange: Option<Exchange>,
    /// Share count; `None` until a weight-based pick has been resolved.
    pub quantity: Option<f64>,
    pub weight: Option<f64>,
    pub entry_date: NaiveDate,
}

impl Position {
    pub fn is_held_on(&self, date: NaiveDate) -> bool {
        self.entry_date <= date
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuantity {
    pub participant: String,
    pub ticker: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub price_date: NaiveDate,
}

/// Picks the close a position is bought at: the last one on or before the
/// entry date, or the first one after it when the entry date precedes all
/// stored history.
pub fn entry_observation(
    observations: &[PriceObservation],
    entry_date: NaiveDate,
) -> Option<&PriceObservation> {
    observations
        .iter()
        .filter(|o| o.date <= entry_date)
        .max_by_key(|o| o.date)
        .or_else(|| {
            observations
                .iter()
                .filter(|o| o.date > entry_date)
                .min_by_key(|o| o.date)
        })
}

/// Computes share counts for positions configured by weight.
///
/// Each participant's weights are normalized to sum to one and applied to
/// `initial_capital` in the reporting currency. Positions that already have a
/// quantity are left alone. Positions whose entry date is after
/// `settled_through`, or that miss a price or FX rate, are skipped and retried
/// on the next run.
pub fn resolve_quantities(
    positions: &[Position],
    prices: &HashMap<String, Vec<PriceObservation>>,
    normalizer: &CurrencyNormalizer,
    initial_capital: f64,
    settled_through: NaiveDate,
) -> Vec<ResolvedQuantity> {
    let mut weight_totals: HashMap<&str, f64> = HashMap::new();
    for position in positions {
        if let Some(weight) = position.weight {
            *weight_totals.entry(position.participant.as_str()).or_insert(0.0) += weight;
        }
    }

    let mut resolved = Vec::new();
    for position in positions {
        let Some(weight) = position.weight else {
            continue;
        };
        if position.quantity.is_some() {
            continue;
        }
        if position.entry_date > settled_through {
            debug!(
                "{}'s {} enters on {}; closes are settled through {settled_through}",
                position.participant, position.ticker, position.entry_date
            );
            continue;
        }
        let total = weight_totals
            .get(position.participant.as_str())
            .copied()
            .unwrap_or(0.0);
        if total <= 0.0 {
            continue;
        }

        let Some(observation) = prices
            .get(&position.ticker)
            .and_then(|obs| entry_observation(obs, position.entry_date))
        else {
            warn!(
                "No price for {} to size {}'s position; will retry next run",
                position.ticker, position.participant
            );
            continue;
        };

        let allocation = initial_capital * weight / total;
        let rate = match normalizer.rate_on(&observation.currency, observation.date) {
            Ok(rate) if rate > 0.0 => rate,
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    "Cannot size {}'s position in {}: {e}",
                    position.participant, position.ticker
                );
                continue;
            }
        };
        if observation.close_price <= 0.0 {
            continue;
        }

        let native_allocation = allocation / rate;
        let quantity = native_allocation / observation.close_price;
        debug!(
            "{} buys {quantity:.4} {} at {} on {} ({allocation:.2} {})",
            position.participant,
            position.ticker,
            observation.close_price,
            observation.date,
            normalizer.reporting_currency()
        );
        resolved.push(ResolvedQuantity {
            participant: position.participant.clone(),
            ticker: position.ticker.clone(),
            quantity,
            entry_price: observation.close_price,
            price_date: observation.date,
        });
    }
    resolved
}

/// Distance from 100% under which a participant's weights count as complete.
const WEIGHT_TOLERANCE: f64 = 0.01;

/// Sum of one participant's configured weights.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightCheck {
    pub participant: String,
    pub total: f64,
}

impl WeightCheck {
    pub fn is_complete(&self) -> bool {
        (self.total - 1.0).abs() < WEIGHT_TOLERANCE
    }
}

/// Weight totals for every participant holding weight-based picks, in order
/// of first appearance.
pub fn weight_checks(positions: &[Position]) -> Vec<WeightCheck> {
    let mut checks: Vec<WeightCheck> = Vec::new();
    for position in positions {
        let Some(weight) = position.weight else {
            continue;
        };
        match checks.iter_mut().find(|c| c.participant == position.participant) {
            Some(check) => check.total += weight,
            None => checks.push(WeightCheck {
                participant: position.participant.clone(),
                total: weight,
            }),
        }
    }
    checks
}
