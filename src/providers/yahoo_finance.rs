use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::core::currency::{CurrencyPair, FxRate, FxRateProvider};
use crate::core::error::FetchError;
use crate::core::price::{PriceHistoryProvider, PriceObservation};
use crate::core::window::DateWindow;

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    currency: Option<String>,
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// Daily closes of one chart, restricted to the requested window.
struct DailySeries {
    currency: Option<String>,
    closes: BTreeMap<NaiveDate, f64>,
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Maps bar timestamps to exchange-local trading days, skipping missing
/// closes and anything outside `window`. A repeated day keeps its last bar.
fn extract_daily_closes(item: &ChartItem, window: &DateWindow) -> BTreeMap<NaiveDate, f64> {
    let mut closes = BTreeMap::new();

    let (Some(timestamps), Some(values)) = (
        item.timestamp.as_ref(),
        item.indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return closes;
    };

    for (ts, close) in timestamps.iter().zip(values) {
        let Some(close) = close else {
            continue;
        };
        let Some(date) =
            DateTime::from_timestamp(ts + item.meta.gmtoffset, 0).map(|dt| dt.date_naive())
        else {
            continue;
        };
        if window.contains(date) {
            closes.insert(date, *close);
        }
    }
    closes
}

pub struct YahooFinanceProvider {
    base_url: String,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Self {
        YahooFinanceProvider {
            base_url: base_url.to_string(),
        }
    }

    async fn fetch_daily(&self, symbol: &str, window: &DateWindow) -> Result<DailySeries, FetchError> {
        let period1 = unix_midnight(window.start);
        let period2 = window
            .end
            .checked_add_days(Days::new(1))
            .map_or(period1, unix_midnight);
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
            self.base_url, symbol, period1, period2
        );
        debug!("Requesting daily closes from {}", url);

        let request_error = |source| FetchError::Request {
            symbol: symbol.to_string(),
            source,
        };
        let client = reqwest::Client::builder()
            .user_agent("stockpicks/1.0")
            .build()
            .map_err(request_error)?;
        let response = client.get(&url).send().await.map_err(request_error)?;

        let status = response.status();
        let text = response.text().await.map_err(request_error)?;
        let data: Option<YahooChartResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            if let Some(description) = data
                .as_ref()
                .and_then(|d| d.chart.error.as_ref())
                .and_then(|e| e.description.as_ref())
            {
                debug!("Yahoo error for {symbol}: {description}");
            }
            return Err(FetchError::Status {
                symbol: symbol.to_string(),
                status,
            });
        }

        let data = match data {
            Some(data) => data,
            None => {
                let message = serde_json::from_str::<YahooChartResponse>(&text)
                    .err()
                    .map_or_else(|| "unexpected body".to_string(), |e| e.to_string());
                return Err(FetchError::Parse {
                    symbol: symbol.to_string(),
                    message,
                });
            }
        };

        let item = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| FetchError::NoData(symbol.to_string()))?;

        let closes = extract_daily_closes(&item, window);
        debug!("{symbol}: {} daily closes in {window}", closes.len());
        Ok(DailySeries {
            currency: item.meta.currency,
            closes,
        })
    }
}

#[async_trait]
impl PriceHistoryProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooPriceFetch",
        skip(self),
        fields(ticker = %ticker, window = %window)
    )]
    async fn fetch_history(
        &self,
        ticker: &str,
        window: &DateWindow,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        let series = self.fetch_daily(ticker, window).await?;
        let currency = series.currency.ok_or_else(|| FetchError::Parse {
            symbol: ticker.to_string(),
            message: "missing quote currency".to_string(),
        })?;

        Ok(series
            .closes
            .into_iter()
            .map(|(date, close)| PriceObservation::new(ticker, date, close, &currency))
            .collect())
    }
}

#[async_trait]
impl FxRateProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooRateFetch",
        skip(self),
        fields(pair = %pair, window = %window)
    )]
    async fn fetch_rates(
        &self,
        pair: &CurrencyPair,
        window: &DateWindow,
    ) -> Result<Vec<FxRate>, FetchError> {
        let series = self.fetch_daily(&pair.provider_symbol(), window).await?;
        Ok(series
            .closes
            .into_iter()
            .map(|(date, rate)| FxRate {
                pair: pair.clone(),
                date,
                rate,
            })
            .collect())
    }
}
