//! The scheduled update run: fetch what is missing, persist it, size picks.
//!
//! Windows end at the last settled day, so a run during market hours never
//! stores a moving intraday price. Every ticker and currency pair is handled
//! on its own. A failure is logged,
//! recorded in the summary and picked up again by the next run with a wider
//! window; it never stops the rest of the run.

use crate::core::config::AppConfig;
use crate::core::currency::{CurrencyPair, FxRateProvider, major_unit};
use crate::core::error::ReconciliationConflict;
use crate::core::portfolio::{resolve_quantities, weight_checks};
use crate::core::price::PriceHistoryProvider;
use crate::core::window::{fetch_window, last_settled_day};
use crate::store::{PriceStore, UpsertReport};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateSummary {
    pub series_updated: usize,
    pub series_up_to_date: usize,
    pub rows_inserted: usize,
    pub conflicts: Vec<ReconciliationConflict>,
    pub failures: Vec<UpdateFailure>,
    pub positions_resolved: usize,
}

impl UpdateSummary {
    fn record(&mut self, report: UpsertReport) {
        self.series_updated += 1;
        self.rows_inserted += report.inserted;
        self.conflicts.extend(report.conflicts);
    }

    fn fail(&mut self, key: &str, error: &anyhow::Error) {
        warn!("Skipping {key} this run: {error:#}");
        self.failures.push(UpdateFailure {
            key: key.to_string(),
            reason: format!("{error:#}"),
        });
    }
}

/// Number of series the run will visit, for progress reporting.
pub fn planned_series(config: &AppConfig, store: &PriceStore) -> Result<usize> {
    Ok(config.tickers().len() + fx_pairs(config, store)?.len())
}

fn fx_pairs(config: &AppConfig, store: &PriceStore) -> Result<Vec<CurrencyPair>> {
    let mut majors: Vec<String> = store
        .currencies_in_use()?
        .iter()
        .map(|c| major_unit(c).0)
        .filter(|c| *c != config.currency)
        .collect();
    majors.sort();
    majors.dedup();
    Ok(majors
        .iter()
        .map(|from| CurrencyPair::new(from, &config.currency))
        .collect())
}

async fn update_ticker(
    store: &mut PriceStore,
    provider: &dyn PriceHistoryProvider,
    ticker: &str,
    competition_start: NaiveDate,
    settled: NaiveDate,
) -> Result<Option<UpsertReport>> {
    let latest = store.latest_stored_date(ticker)?;
    let Some(window) = fetch_window(latest, competition_start, settled) else {
        debug!("{ticker} is up to date (latest {latest:?})");
        return Ok(None);
    };

    info!("Fetching {ticker} for {window}");
    let rows = provider.fetch_history(ticker, &window).await?;
    let report = store
        .upsert_observations(ticker, &rows)
        .with_context(|| format!("Failed to store prices for {ticker}"))?;
    Ok(Some(report))
}

async fn update_pair(
    store: &mut PriceStore,
    provider: &dyn FxRateProvider,
    pair: &CurrencyPair,
    competition_start: NaiveDate,
    settled: NaiveDate,
) -> Result<Option<UpsertReport>> {
    let latest = store.latest_rate_date(pair)?;
    let Some(window) = fetch_window(latest, competition_start, settled) else {
        debug!("{pair} is up to date (latest {latest:?})");
        return Ok(None);
    };

    info!("Fetching {pair} rates for {window}");
    let rows = provider.fetch_rates(pair, &window).await?;
    let report = store
        .upsert_rates(pair, &rows)
        .with_context(|| format!("Failed to store rates for {pair}"))?;
    Ok(Some(report))
}

/// Sizes weight-based positions that have no quantity yet.
///
/// Tickers that failed this run are left for the next one, since their stored
/// history may stop short of the entry date.
fn resolve_positions(
    config: &AppConfig,
    store: &PriceStore,
    settled: NaiveDate,
    failed: &[UpdateFailure],
) -> Result<usize> {
    let positions = store.load_positions()?;
    let mut pending: Vec<String> = positions
        .iter()
        .filter(|p| p.quantity.is_none() && p.weight.is_some())
        .filter(|p| !failed.iter().any(|f| f.key == p.ticker))
        .map(|p| p.ticker.clone())
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }
    pending.sort();
    pending.dedup();

    let prices = store.price_history(&pending, config.competition.start_date, settled)?;
    let normalizer = store.normalizer(&config.currency)?;
    let resolved = resolve_quantities(
        &positions,
        &prices,
        &normalizer,
        config.competition.initial_capital,
        settled,
    );

    for r in &resolved {
        info!(
            "{} holds {:.4} {} bought at {} on {}",
            r.participant, r.quantity, r.ticker, r.entry_price, r.price_date
        );
        store.set_quantity(&r.participant, &r.ticker, r.quantity)?;
    }
    Ok(resolved.len())
}

/// Runs one incremental update over every configured ticker and the FX pairs
/// their currencies need.
///
/// Only failures to read or write the store's position set abort the run.
pub async fn run_update(
    config: &AppConfig,
    store: &mut PriceStore,
    price_provider: &dyn PriceHistoryProvider,
    fx_provider: &dyn FxRateProvider,
    today: NaiveDate,
    on_progress: &dyn Fn(&str),
) -> Result<UpdateSummary> {
    let start = config.competition.start_date;
    let settled =
        last_settled_day(today).ok_or_else(|| anyhow!("No day settles before {today}"))?;
    let mut summary = UpdateSummary::default();

    let positions = config.positions();
    for check in weight_checks(&positions).iter().filter(|c| !c.is_complete()) {
        warn!(
            "{}'s weights sum to {:.2}, not 1; they will be scaled to the initial capital",
            check.participant, check.total
        );
    }
    store
        .save_positions(&positions)
        .context("Failed to save positions")?;

    for ticker in config.tickers() {
        on_progress(&ticker);
        match update_ticker(store, price_provider, &ticker, start, settled).await {
            Ok(Some(report)) => summary.record(report),
            Ok(None) => summary.series_up_to_date += 1,
            Err(e) => summary.fail(&ticker, &e),
        }
    }

    // Currencies are only known once prices are stored
    for pair in fx_pairs(config, store)? {
        let key = pair.to_string();
        on_progress(&key);
        match update_pair(store, fx_provider, &pair, start, settled).await {
            Ok(Some(report)) => summary.record(report),
            Ok(None) => summary.series_up_to_date += 1,
            Err(e) => summary.fail(&key, &e),
        }
    }

    summary.positions_resolved = resolve_positions(config, store, settled, &summary.failures)?;

    info!(
        "Update finished: {} series updated, {} up to date, {} rows inserted, {} conflicts, {} failures",
        summary.series_updated,
        summary.series_up_to_date,
        summary.rows_inserted,
        summary.conflicts.len(),
        summary.failures.len()
    );
    Ok(summary)
}
