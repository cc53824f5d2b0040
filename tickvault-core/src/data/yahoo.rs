//! Yahoo Finance provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API. Retries and call
//! counting live in the download engine; this adapter maps one request
//! to one HTTP call and classifies failures.
//!
//! Yahoo has no official API and is subject to unannounced format changes.

use super::provider::{FetchError, Provider};
use crate::domain::{Bar, BarTable, Instrument, Period};
use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

const SUPPORTED: [Period; 9] = [
    Period::Minute1,
    Period::Minute5,
    Period::Minute15,
    Period::Minute30,
    Period::Hour1,
    Period::Daily,
    Period::Weekly,
    Period::Monthly,
    Period::Quarterly,
];

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    min_rows: usize,
}

impl YahooProvider {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Rejected(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: "https://query2.finance.yahoo.com".to_string(),
            min_rows: 2,
        })
    }

    /// Fewest rows a response must carry to be worth archiving.
    pub fn with_min_rows(mut self, min_rows: usize) -> Self {
        self.min_rows = min_rows;
        self
    }

    fn interval(period: Period) -> Option<&'static str> {
        match period {
            Period::Minute1 => Some("1m"),
            Period::Minute5 => Some("5m"),
            Period::Minute15 => Some("15m"),
            Period::Minute30 => Some("30m"),
            Period::Hour1 => Some("60m"),
            Period::Daily => Some("1d"),
            Period::Weekly => Some("1wk"),
            Period::Monthly => Some("1mo"),
            Period::Quarterly => Some("3mo"),
            Period::Hour4 => None,
        }
    }

    /// Ticker Yahoo knows the instrument by. Dated contracts need the
    /// exchange suffix, e.g. `GCQ25.CMX`.
    fn ticker(instrument: &Instrument) -> String {
        match instrument.contract().and_then(|c| c.exchange.as_deref()) {
            Some(exchange) => format!("{}.{exchange}", instrument.symbol()),
            None => instrument.symbol(),
        }
    }

    fn chart_url(&self, ticker: &str, interval: &str, start: NaiveDateTime, end: NaiveDateTime) -> String {
        let start_ts = start.and_utc().timestamp();
        let end_ts = end.and_utc().timestamp();
        format!(
            "{}/v8/finance/chart/{ticker}?period1={start_ts}&period2={end_ts}&interval={interval}",
            self.base_url
        )
    }

    /// Parse the chart API response into bars.
    fn parse_response(
        symbol: &str,
        period: Period,
        resp: ChartResponse,
    ) -> Result<Vec<Bar>, FetchError> {
        let not_found = || FetchError::NotFound {
            symbol: symbol.to_string(),
            period,
        };

        let result = match (resp.chart.result, resp.chart.error) {
            (Some(result), _) => result,
            (None, Some(err)) if err.code == "Not Found" => return Err(not_found()),
            (None, Some(err)) => {
                return Err(FetchError::Rejected(format!("{}: {}", err.code, err.description)))
            }
            (None, None) => return Err(not_found()),
        };

        let Some(data) = result.into_iter().next() else {
            return Err(not_found());
        };
        let Some(timestamps) = data.timestamp else {
            return Err(not_found());
        };
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Rejected("response format changed: no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| FetchError::Rejected(format!("invalid timestamp: {ts}")))?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Holidays and halted sessions come back as all-null rows.
            if open.is_none() && high.is_none() && low.is_none() && close.is_none() {
                continue;
            }

            bars.push(Bar {
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0.0),
            });
        }

        Ok(bars)
    }
}

impl Provider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn supported_periods(&self) -> &[Period] {
        &SUPPORTED
    }

    fn max_request_window(&self, period: Period) -> Option<Duration> {
        match period {
            Period::Minute1 => Some(Duration::days(7)),
            Period::Minute5 | Period::Minute15 | Period::Minute30 => Some(Duration::days(60)),
            Period::Hour1 | Period::Hour4 => Some(Duration::days(730)),
            _ => None,
        }
    }

    fn earliest_start(&self, period: Period, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match period {
            Period::Minute1 => Some(now - Duration::days(30)),
            Period::Minute5 | Period::Minute15 | Period::Minute30 => Some(now - Duration::days(60)),
            Period::Hour1 | Period::Hour4 => Some(now - Duration::days(730)),
            _ => None,
        }
    }

    fn fetch(
        &self,
        instrument: &Instrument,
        period: Period,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<BarTable, FetchError> {
        let interval = Self::interval(period)
            .ok_or_else(|| FetchError::Rejected(format!("period {period} not served")))?;
        let symbol = instrument.symbol();
        let url = self.chart_url(&Self::ticker(instrument), interval, start, end);

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::Transient(e.to_string())
            } else {
                FetchError::Rejected(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            // Yahoo answers a blocked client with 403 for every symbol.
            return Err(FetchError::QuotaExceeded);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { symbol, period });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(FetchError::Transient(format!("HTTP {status} for {symbol}")));
        }
        if !status.is_success() {
            return Err(FetchError::Rejected(format!("HTTP {status} for {symbol}")));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::Rejected(format!("failed to parse response for {symbol}: {e}"))
        })?;
        let bars = Self::parse_response(&symbol, period, chart)?;

        if bars.is_empty() {
            return Err(FetchError::NotFound { symbol, period });
        }
        if bars.len() < self.min_rows {
            return Err(FetchError::LowData {
                symbol,
                rows: bars.len(),
                min_rows: self.min_rows,
            });
        }

        BarTable::from_bars(symbol.clone(), period, start, end, self.name(), bars)
            .ok_or(FetchError::NotFound { symbol, period })
    }
}
