//! Yahoo Finance price provider.
//!
//! Fetches bars from Yahoo's v8 chart API, one request per ticker, and
//! reshapes them into a wide table with two-level `TICKER/field` columns.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.

use super::align::{align_series, LabeledSeries};
use super::frame::{dated_frame, DATE_COLUMN};
use super::provider::{http_client, join_url, send, CollectError, DataSource};
use chrono::{NaiveDate, NaiveTime};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Public chart API host.
pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

/// Separator between the ticker and field levels of a column name.
pub const COLUMN_SEPARATOR: char = '/';

/// Price fields, in column order.
pub const PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Corporate-action fields appended when actions are requested.
pub const ACTION_FIELDS: [&str; 2] = ["dividends", "stock_splits"];

/// Bar interval. Only daily-or-coarser bars are supported, since every
/// table is indexed by calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    #[default]
    Day,
    FiveDays,
    Week,
    Month,
    Quarter,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Day => "1d",
            Interval::FiveDays => "5d",
            Interval::Week => "1wk",
            Interval::Month => "1mo",
            Interval::Quarter => "3mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1d" => Ok(Interval::Day),
            "5d" => Ok(Interval::FiveDays),
            "1wk" => Ok(Interval::Week),
            "1mo" => Ok(Interval::Month),
            "3mo" => Ok(Interval::Quarter),
            "1m" | "2m" | "5m" | "15m" | "30m" | "60m" | "90m" | "1h" => {
                Err(CollectError::InvalidRequest(format!(
                    "intraday interval '{s}' is not supported (use 1d, 5d, 1wk, 1mo or 3mo)"
                )))
            }
            other => Err(CollectError::InvalidRequest(format!(
                "unknown interval '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = CollectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

// ── Chart API response ──────────────────────────────────────────────

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
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<ChartEvents>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC, in seconds.
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

// ── Parsed bars ─────────────────────────────────────────────────────

/// One adjusted bar for a ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    /// Cash dividend paid on this date, 0 if none.
    pub dividends: f64,
    /// Split ratio effective on this date, 0 if none.
    pub stock_splits: f64,
}

impl PriceBar {
    fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => self.open,
            "high" => self.high,
            "low" => self.low,
            "close" => self.close,
            "volume" => self.volume,
            "dividends" => Some(self.dividends),
            "stock_splits" => Some(self.stock_splits),
            _ => None,
        }
    }

    /// No prices, no volume and no corporate action.
    fn is_empty(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
            && self.dividends == 0.0
            && self.stock_splits == 0.0
    }
}

/// Bars for one ticker, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
}

/// Yahoo Finance client.
pub struct YahooClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CollectError> {
        Ok(Self {
            client: http_client(DataSource::YahooFinance)?,
            base_url: base_url.into(),
        })
    }

    /// Fetch bars for one ticker over `[start, end)`.
    pub fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
        include_actions: bool,
    ) -> Result<PriceHistory, CollectError> {
        let url = join_url(&self.base_url, &format!("v8/finance/chart/{symbol}"));
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp();

        let mut query: Vec<(&str, String)> = vec![
            ("period1", period1.to_string()),
            ("period2", period2.to_string()),
            ("interval", interval.as_str().to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ];
        if include_actions {
            query.push(("events", "div,splits".to_string()));
        }

        debug!(symbol, %interval, "requesting chart");
        let resp = send(
            DataSource::YahooFinance,
            self.client.get(&url).query(&query),
        )?;

        let chart: ChartResponse = resp.json().map_err(|e| {
            CollectError::ResponseFormat(format!("failed to parse chart for {symbol}: {e}"))
        })?;

        parse_chart(symbol, chart)
    }
}

/// Parse the chart API response into adjusted bars.
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<PriceHistory, CollectError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) => CollectError::Provider {
            provider: DataSource::YahooFinance,
            message: format!("{symbol}: {}: {}", err.code, err.description),
        },
        None => CollectError::ResponseFormat("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| CollectError::ResponseFormat("result array is empty".into()))?;

    let offset = data.meta.gmtoffset;
    let local_date = |ts: i64| {
        chrono::DateTime::from_timestamp(ts + offset, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| CollectError::ResponseFormat(format!("invalid timestamp: {ts}")))
    };

    // A range with no trading days comes back without timestamps.
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    // Keyed by date so a repeated trailing bar replaces the earlier one.
    let mut by_date: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();

    for (i, &ts) in timestamps.iter().enumerate() {
        let date = local_date(ts)?;
        let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();

        let close = at(&quote.close);
        let adj_close = adj_closes.as_ref().and_then(at);
        let factor = match (adj_close, close) {
            (Some(adj), Some(raw)) if raw != 0.0 => adj / raw,
            _ => 1.0,
        };

        by_date.insert(
            date,
            PriceBar {
                date,
                open: at(&quote.open).map(|v| v * factor),
                high: at(&quote.high).map(|v| v * factor),
                low: at(&quote.low).map(|v| v * factor),
                close: adj_close.or(close),
                volume: at(&quote.volume),
                dividends: 0.0,
                stock_splits: 0.0,
            },
        );
    }

    // Each event lands in the bar whose period contains it.
    let events = data.events.unwrap_or_default();
    for event in events.dividends.values() {
        if let Some(bar) = containing_bar(&mut by_date, local_date(event.date)?) {
            bar.dividends += event.amount;
        }
    }
    for event in events.splits.values() {
        if event.denominator == 0.0 {
            continue;
        }
        if let Some(bar) = containing_bar(&mut by_date, local_date(event.date)?) {
            bar.stock_splits = event.numerator / event.denominator;
        }
    }

    // Holidays and other non-trading days come back as all-null bars.
    by_date.retain(|_, bar| !bar.is_empty());

    Ok(PriceHistory {
        symbol: symbol.to_string(),
        bars: by_date.into_values().collect(),
    })
}

/// The bar dated on or most recently before `date`.
fn containing_bar(
    bars: &mut BTreeMap<NaiveDate, PriceBar>,
    date: NaiveDate,
) -> Option<&mut PriceBar> {
    bars.range_mut(..=date).next_back().map(|(_, bar)| bar)
}

/// Normalize a ticker list: trim, upper-case, drop blanks and duplicates.
pub fn normalize_tickers(tickers: &[&str]) -> Vec<String> {
    let mut seen = Vec::new();
    for ticker in tickers {
        let t = ticker.trim().to_uppercase();
        if !t.is_empty() && !seen.contains(&t) {
            seen.push(t);
        }
    }
    seen
}

/// Two-level column name for a ticker's field.
pub fn column_name(ticker: &str, field: &str) -> String {
    format!("{ticker}{COLUMN_SEPARATOR}{field}")
}

/// Split a two-level column name back into `(ticker, field)`.
pub fn split_column(name: &str) -> Option<(&str, &str)> {
    if name == DATE_COLUMN {
        return None;
    }
    name.rsplit_once(COLUMN_SEPARATOR)
}

/// Reshape per-ticker histories into one wide table.
///
/// Columns are grouped by ticker in request order. The shape is the same
/// whether one or many tickers were requested. A ticker without history
/// (`None`) contributes all-null columns.
pub fn price_frame(
    histories: &[(String, Option<PriceHistory>)],
    include_actions: bool,
) -> Result<DataFrame, CollectError> {
    let fields: Vec<&str> = if include_actions {
        PRICE_FIELDS.iter().chain(ACTION_FIELDS.iter()).copied().collect()
    } else {
        PRICE_FIELDS.to_vec()
    };

    let mut series = Vec::with_capacity(histories.len() * fields.len());
    for (ticker, history) in histories {
        for field in &fields {
            let label = column_name(ticker, field);
            let points = history
                .as_ref()
                .map(|h| h.bars.iter().map(|b| (b.date, b.field(field))).collect())
                .unwrap_or_default();
            series.push(LabeledSeries::new(label, points));
        }
    }

    dated_frame(align_series(series))
}
