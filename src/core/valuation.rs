//! Valuation of participants' portfolios over time, normalized to the
//! reporting currency.
use super::currency::CurrencyNormalizer;
use super::portfolio::Position;
use super::price::PriceObservation;
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// A participant's portfolio value on one day. `value` is `None` when an
/// exchange rate was unavailable; it is never reported as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationPoint {
    pub participant: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub participant: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return_pct: f64,
    pub annualized_return_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationEntry {
    pub ticker: String,
    pub value: f64,
    pub weight_pct: f64,
}

type PriceIndex<'a> = HashMap<&'a str, BTreeMap<NaiveDate, &'a PriceObservation>>;

fn index_prices(prices: &HashMap<String, Vec<PriceObservation>>) -> PriceIndex<'_> {
    prices
        .iter()
        .map(|(ticker, observations)| {
            (
                ticker.as_str(),
                observations.iter().map(|o| (o.date, o)).collect(),
            )
        })
        .collect()
}

fn held_positions<'a>(participant: &str, positions: &'a [Position]) -> Vec<(&'a Position, f64)> {
    positions
        .iter()
        .filter(|p| p.participant == participant)
        .filter_map(|p| match p.quantity {
            Some(quantity) => Some((p, quantity)),
            None => {
                warn!(
                    "{}'s position in {} has no quantity yet; leaving it out",
                    participant, p.ticker
                );
                None
            }
        })
        .collect()
}

/// Computes `Σ quantity × close` in the reporting currency for every day on
/// which a held ticker has a stored close.
///
/// A day on which any held ticker lacks a close is left out of the series
/// rather than forward-filled. A day whose FX rate is unavailable is kept with
/// `value: None`.
pub fn valuation_series(
    participant: &str,
    positions: &[Position],
    prices: &HashMap<String, Vec<PriceObservation>>,
    normalizer: &CurrencyNormalizer,
) -> Vec<ValuationPoint> {
    let held = held_positions(participant, positions);
    let Some(first_entry) = held.iter().map(|(p, _)| p.entry_date).min() else {
        return Vec::new();
    };
    let index = index_prices(prices);

    let dates: BTreeSet<NaiveDate> = held
        .iter()
        .filter_map(|(p, _)| index.get(p.ticker.as_str()))
        .flat_map(|series| series.range(first_entry..).map(|(date, _)| *date))
        .collect();

    let mut series = Vec::with_capacity(dates.len());
    'dates: for date in dates {
        let mut total = 0.0;
        let mut available = true;

        for (position, quantity) in held.iter().filter(|(p, _)| p.is_held_on(date)) {
            let Some(observation) = index
                .get(position.ticker.as_str())
                .and_then(|series| series.get(&date))
            else {
                debug!("{participant}: no close for {} on {date}, skipping day", position.ticker);
                continue 'dates;
            };

            match normalizer.convert(quantity * observation.close_price, &observation.currency, date) {
                Ok(value) => total += value,
                Err(e) => {
                    debug!("{participant}: valuation unavailable on {date}: {e}");
                    available = false;
                }
            }
        }

        series.push(ValuationPoint {
            participant: participant.to_string(),
            date,
            value: available.then_some(total),
        });
    }
    series
}

/// Total and annualized return between the first and last available points.
pub fn performance_summary(series: &[ValuationPoint]) -> Option<PerformanceSummary> {
    let mut available = series
        .iter()
        .filter_map(|p| p.value.map(|v| (p, v)));
    let (first, initial_value) = available.next()?;
    let (last, final_value) = available.last().unwrap_or((first, initial_value));

    if initial_value <= 0.0 {
        return None;
    }

    let total_return_pct = (final_value / initial_value - 1.0) * 100.0;
    let days = (last.date - first.date).num_days();
    let annualized_return_pct = annualized_return(initial_value, final_value, days)
        .map_err(|e| debug!("Annualized return unavailable for {}: {e}", first.participant))
        .ok();

    Some(PerformanceSummary {
        participant: first.participant.clone(),
        start_date: first.date,
        end_date: last.date,
        initial_value,
        final_value,
        total_return_pct,
        annualized_return_pct,
    })
}

fn annualized_return(initial_value: f64, final_value: f64, days: i64) -> Result<f64> {
    if days < 1 {
        return Err(anyhow!("span shorter than one day"));
    }
    let n_years = days as f64 / 365.25;

    let begin_bal =
        Decimal::from_f64(initial_value).ok_or_else(|| anyhow!("Invalid initial value"))?;
    let end_bal = Decimal::from_f64(final_value).ok_or_else(|| anyhow!("Invalid final value"))?;
    let n_years = Decimal::from_f64(n_years).ok_or_else(|| anyhow!("Invalid duration"))?;

    let rate = cagr(begin_bal, end_bal, n_years);
    let percentage = (rate * Decimal::from(100))
        .to_f64()
        .ok_or_else(|| anyhow!("CAGR percentage conversion failed"))?;
    debug!("cagr: {begin_bal}, {end_bal}, {n_years} = {rate}, {percentage}");
    Ok(percentage)
}

/// Percent change of each point relative to the first available value.
pub fn percent_change_series(series: &[ValuationPoint]) -> Vec<(NaiveDate, Option<f64>)> {
    let base = series.iter().find_map(|p| p.value).filter(|v| *v > 0.0);
    series
        .iter()
        .map(|p| {
            let change = match (p.value, base) {
                (Some(value), Some(base)) => Some((value / base - 1.0) * 100.0),
                _ => None,
            };
            (p.date, change)
        })
        .collect()
}

/// Value and weight of each held ticker on `date`.
pub fn allocation(
    participant: &str,
    positions: &[Position],
    prices: &HashMap<String, Vec<PriceObservation>>,
    normalizer: &CurrencyNormalizer,
    date: NaiveDate,
) -> Result<Vec<AllocationEntry>> {
    let index = index_prices(prices);
    let mut entries = Vec::new();

    for (position, quantity) in held_positions(participant, positions)
        .into_iter()
        .filter(|(p, _)| p.is_held_on(date))
    {
        let Some(observation) = index
            .get(position.ticker.as_str())
            .and_then(|series| series.get(&date))
        else {
            debug!("{participant}: no close for {} on {date}", position.ticker);
            continue;
        };
        let value =
            normalizer.convert(quantity * observation.close_price, &observation.currency, date)?;
        entries.push(AllocationEntry {
            ticker: position.ticker.clone(),
            value,
            weight_pct: 0.0,
        });
    }

    let total: f64 = entries.iter().map(|e| e.value).sum();
    if total > 0.0 {
        for entry in &mut entries {
            entry.weight_pct = entry.value / total * 100.0;
        }
    }
    entries.sort_by(|a, b| b.value.total_cmp(&a.value));
    Ok(entries)
}

/// Orders summaries best total return first.
pub fn rank(mut summaries: Vec<PerformanceSummary>) -> Vec<PerformanceSummary> {
    summaries.sort_by(|a, b| b.total_return_pct.total_cmp(&a.total_return_pct));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::currency::{CurrencyPair, FxRate};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn position(participant: &str, ticker: &str, quantity: f64, entry: &str) -> Position {
        Position {
            participant: participant.to_string(),
            ticker: ticker.to_string(),
            exchange: None,
            quantity: Some(quantity),
            weight: None,
            entry_date: d(entry),
        }
    }

    fn prices(rows: &[(&str, &str, f64, &str)]) -> HashMap<String, Vec<PriceObservation>> {
        let mut map: HashMap<String, Vec<PriceObservation>> = HashMap::new();
        for (ticker, date, close, currency) in rows {
            map.entry(ticker.to_string())
                .or_default()
                .push(PriceObservation::new(ticker, d(date), *close, currency));
        }
        map
    }

    #[test]
    fn test_value_is_sum_of_quantity_times_close() {
        let positions = vec![
            position("Ivan", "VST", 10.0, "2025-03-03"),
            position("Ivan", "DGX", 2.0, "2025-03-03"),
            position("Other", "VST", 100.0, "2025-03-03"),
        ];
        let prices = prices(&[
            ("VST", "2025-03-03", 100.0, "USD"),
            ("DGX", "2025-03-03", 50.0, "USD"),
            ("VST", "2025-03-04", 110.0, "USD"),
            ("DGX", "2025-03-04", 55.0, "USD"),
        ]);
        let normalizer = CurrencyNormalizer::new("USD");

        let series = valuation_series("Ivan", &positions, &prices, &normalizer);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, Some(1100.0));
        assert_eq!(series[1].value, Some(1210.0));
        assert_eq!(series[1].participant, "Ivan");
    }

    #[test]
    fn test_missing_price_excludes_date() {
        let positions = vec![
            position("Conor", "PFE", 10.0, "2025-03-03"),
            position("Conor", "RR.L", 100.0, "2025-03-03"),
        ];
        let prices = prices(&[
            ("PFE", "2025-03-03", 25.0, "USD"),
            ("RR.L", "2025-03-03", 7.0, "USD"),
            ("PFE", "2025-03-04", 26.0, "USD"),
            // RR.L has no close on 2025-03-04 (UK holiday)
            ("PFE", "2025-03-05", 27.0, "USD"),
            ("RR.L", "2025-03-05", 8.0, "USD"),
        ]);
        let normalizer = CurrencyNormalizer::new("USD");

        let series = valuation_series("Conor", &positions, &prices, &normalizer);

        let dates: Vec<NaiveDate> = series.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d("2025-03-03"), d("2025-03-05")]);
        assert!(series.iter().all(|p| p.value.unwrap() > 0.0));
    }

    #[test]
    fn test_currency_fallback_uses_prior_rate() {
        let positions = vec![position("Abhi", "0700.HK", 10.0, "2025-03-01")];
        let prices = prices(&[
            ("0700.HK", "2025-03-01", 400.0, "HKD"),
            ("0700.HK", "2025-03-02", 420.0, "HKD"),
        ]);
        let mut normalizer = CurrencyNormalizer::new("USD");
        normalizer.add_rates([FxRate {
            pair: CurrencyPair::new("HKD", "USD"),
            date: d("2025-03-01"),
            rate: 0.125,
        }]);

        let series = valuation_series("Abhi", &positions, &prices, &normalizer);

        assert_eq!(series[0].value, Some(500.0));
        assert_eq!(series[1].value, Some(525.0));
    }

    #[test]
    fn test_missing_fx_rate_marks_point_unavailable() {
        let positions = vec![
            position("Radu", "DBK.DE", 10.0, "2025-03-03"),
            position("Radu", "RTX", 1.0, "2025-03-03"),
        ];
        let prices = prices(&[
            ("DBK.DE", "2025-03-03", 20.0, "EUR"),
            ("RTX", "2025-03-03", 130.0, "USD"),
        ]);
        let normalizer = CurrencyNormalizer::new("USD");

        let series = valuation_series("Radu", &positions, &prices, &normalizer);

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, None);
    }

    #[test]
    fn test_positions_count_from_entry_date() {
        let positions = vec![
            position("Silvia", "NVO", 1.0, "2025-03-03"),
            position("Silvia", "OPRA", 10.0, "2025-03-04"),
        ];
        let prices = prices(&[
            ("NVO", "2025-03-03", 80.0, "USD"),
            ("NVO", "2025-03-04", 81.0, "USD"),
            ("OPRA", "2025-03-04", 20.0, "USD"),
        ]);
        let normalizer = CurrencyNormalizer::new("USD");

        let series = valuation_series("Silvia", &positions, &prices, &normalizer);

        assert_eq!(series[0].value, Some(80.0));
        assert_eq!(series[1].value, Some(281.0));
    }

    #[test]
    fn test_unknown_participant_has_empty_series() {
        let positions = vec![position("Ivan", "VST", 1.0, "2025-03-03")];
        let normalizer = CurrencyNormalizer::new("USD");
        assert!(valuation_series("Nobody", &positions, &HashMap::new(), &normalizer).is_empty());
    }

    fn point(date: &str, value: Option<f64>) -> ValuationPoint {
        ValuationPoint {
            participant: "Ivan".to_string(),
            date: d(date),
            value,
        }
    }

    #[test]
    fn test_performance_summary_skips_unavailable_points() {
        let series = vec![
            point("2025-03-01", None),
            point("2025-03-03", Some(100_000.0)),
            point("2026-03-03", Some(125_000.0)),
            point("2026-03-04", None),
        ];

        let summary = performance_summary(&series).unwrap();

        assert_eq!(summary.start_date, d("2025-03-03"));
        assert_eq!(summary.end_date, d("2026-03-03"));
        assert!((summary.total_return_pct - 25.0).abs() < 1e-9);
        let expected = ((1.25f64).powf(365.25 / 365.0) - 1.0) * 100.0;
        assert!((summary.annualized_return_pct.unwrap() - expected).abs() < 0.1);
    }

    #[test]
    fn test_performance_summary_single_point() {
        let summary = performance_summary(&[point("2025-03-03", Some(10.0))]).unwrap();
        assert_eq!(summary.total_return_pct, 0.0);
        assert!(summary.annualized_return_pct.is_none());
        assert!(performance_summary(&[point("2025-03-03", None)]).is_none());
        assert!(performance_summary(&[]).is_none());
    }

    #[test]
    fn test_percent_change_series() {
        let series = vec![
            point("2025-03-03", Some(200.0)),
            point("2025-03-04", None),
            point("2025-03-05", Some(250.0)),
        ];
        let changes = percent_change_series(&series);
        assert_eq!(changes[0].1, Some(0.0));
        assert_eq!(changes[1].1, None);
        assert!((changes[2].1.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_weights() {
        let positions = vec![
            position("Ivan", "VST", 3.0, "2025-03-03"),
            position("Ivan", "DGX", 1.0, "2025-03-03"),
        ];
        let prices = prices(&[
            ("VST", "2025-03-03", 100.0, "USD"),
            ("DGX", "2025-03-03", 100.0, "USD"),
        ]);
        let normalizer = CurrencyNormalizer::new("USD");

        let entries = allocation("Ivan", &positions, &prices, &normalizer, d("2025-03-03")).unwrap();

        assert_eq!(entries[0].ticker, "VST");
        assert!((entries[0].weight_pct - 75.0).abs() < 1e-9);
        assert!((entries[1].weight_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_total_return() {
        let summary = |name: &str, ret: f64| PerformanceSummary {
            participant: name.to_string(),
            start_date: d("2025-03-03"),
            end_date: d("2025-03-04"),
            initial_value: 1.0,
            final_value: 1.0,
            total_return_pct: ret,
            annualized_return_pct: None,
        };
        let ranked = rank(vec![summary("a", 1.0), summary("b", 5.0), summary("c", -2.0)]);
        let names: Vec<&str> = ranked.iter().map(|s| s.participant.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
