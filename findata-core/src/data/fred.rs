//! FRED (Federal Reserve Economic Data) provider.
//!
//! One `series/observations` request per indicator. Observations come back
//! as strings, with `"."` marking a missing value.

use super::align::{align_series, LabeledSeries};
use super::frame::dated_frame;
use super::provider::{http_client, join_url, send, CollectError, DataSource};
use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Public FRED API host.
pub const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";

/// FRED's marker for a missing observation.
const MISSING_VALUE: &str = ".";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct FredErrorBody {
    error_message: String,
}

/// Observations of one series by date.
pub type Observations = BTreeMap<NaiveDate, Option<f64>>;

/// FRED client.
pub struct FredClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FredClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, CollectError> {
        Ok(Self {
            client: http_client(DataSource::Fred)?,
            base_url: base_url.into(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch one series bounded to `[start, end]`.
    pub fn fetch_series(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Observations, CollectError> {
        let url = join_url(&self.base_url, "fred/series/observations");
        let mut query: Vec<(&str, String)> = vec![
            ("series_id", series_id.to_string()),
            ("observation_start", start.format("%Y-%m-%d").to_string()),
            ("observation_end", end.format("%Y-%m-%d").to_string()),
            ("file_type", "json".to_string()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key.clone()));
        }

        debug!(series_id, "requesting observations");
        let resp = match send(DataSource::Fred, self.client.get(&url).query(&query)) {
            Ok(resp) => resp,
            Err(CollectError::HttpStatus { status, body, .. }) => {
                return Err(describe_error(series_id, status, body));
            }
            Err(e) => return Err(e),
        };

        let parsed: ObservationsResponse = resp.json().map_err(|e| {
            CollectError::ResponseFormat(format!("failed to parse FRED series {series_id}: {e}"))
        })?;

        parse_observations(parsed)
    }
}

/// Prefer FRED's own error message over the raw body.
fn describe_error(series_id: &str, status: u16, body: String) -> CollectError {
    match serde_json::from_str::<FredErrorBody>(&body) {
        Ok(err) => CollectError::Provider {
            provider: DataSource::Fred,
            message: format!("{series_id}: {} (HTTP {status})", err.error_message),
        },
        Err(_) => CollectError::HttpStatus {
            provider: DataSource::Fred,
            status,
            body,
        },
    }
}

fn parse_observations(resp: ObservationsResponse) -> Result<Observations, CollectError> {
    let mut points = BTreeMap::new();
    for obs in resp.observations {
        let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
            CollectError::ResponseFormat(format!("bad observation date '{}': {e}", obs.date))
        })?;
        let value = match obs.value.trim() {
            MISSING_VALUE | "" => None,
            v => Some(v.parse::<f64>().map_err(|e| {
                CollectError::ResponseFormat(format!("bad observation value '{v}': {e}"))
            })?),
        };
        points.insert(date, value);
    }
    Ok(points)
}

/// Trim series ids and drop blanks and repeats, keeping first-seen order.
pub fn normalize_series_ids(ids: &[&str]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for id in ids {
        let id = id.trim();
        if !id.is_empty() && !seen.iter().any(|s| s == id) {
            seen.push(id.to_string());
        }
    }
    seen
}

/// Combine series into one table: `date` plus one column per series id.
pub fn indicators_frame(series: Vec<(String, Observations)>) -> Result<DataFrame, CollectError> {
    let labeled = series
        .into_iter()
        .map(|(id, points)| LabeledSeries::new(id, points))
        .collect();
    dated_frame(align_series(labeled))
}
