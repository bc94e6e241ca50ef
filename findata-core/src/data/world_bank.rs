//! World Bank Indicators API provider.
//!
//! The API answers with a two-element JSON array: a paging header and the
//! data page. Errors come back as a one-element array holding a `message`
//! list, often with HTTP 200.

use super::align::{align_series, LabeledSeries};
use super::provider::{http_client, join_url, send, CollectError, DataSource};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Public World Bank API root.
pub const DEFAULT_BASE_URL: &str = "https://api.worldbank.org/v2";

/// Rows requested in the single page fetched per indicator.
pub const PAGE_SIZE: u32 = 20_000;

pub const COUNTRY_COLUMN: &str = "country";
pub const YEAR_COLUMN: &str = "date";

/// An indicator id and the column name it gets in the output table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBankIndicator {
    pub id: String,
    pub name: String,
}

impl WorldBankIndicator {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Drop repeated indicator ids, keeping the first, and reject two ids that
/// share one column name.
pub fn normalize_indicators(
    indicators: &[WorldBankIndicator],
) -> Result<Vec<WorldBankIndicator>, CollectError> {
    let mut kept: Vec<WorldBankIndicator> = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        if kept.iter().any(|k| k.id == indicator.id) {
            continue;
        }
        if let Some(other) = kept.iter().find(|k| k.name == indicator.name) {
            return Err(CollectError::InvalidRequest(format!(
                "indicators {} and {} both map to column '{}'",
                other.id, indicator.id, indicator.name
            )));
        }
        kept.push(indicator.clone());
    }
    Ok(kept)
}

/// One country/year observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelObservation {
    pub country: String,
    pub date: String,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Row {
    country: NamedRef,
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

/// World Bank client.
pub struct WorldBankClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl WorldBankClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CollectError> {
        Ok(Self {
            client: http_client(DataSource::WorldBank)?,
            base_url: base_url.into(),
        })
    }

    /// Fetch one indicator for all `countries` over the given years.
    pub fn fetch_indicator(
        &self,
        indicator_id: &str,
        countries: &[&str],
        start_year: i32,
        end_year: i32,
    ) -> Result<Vec<PanelObservation>, CollectError> {
        let url = join_url(
            &self.base_url,
            &format!("country/{}/indicator/{indicator_id}", countries.join(";")),
        );
        let query = [
            ("format", "json".to_string()),
            ("date", format!("{start_year}:{end_year}")),
            ("per_page", PAGE_SIZE.to_string()),
        ];

        debug!(indicator_id, countries = countries.len(), "requesting indicator");
        let resp = send(DataSource::WorldBank, self.client.get(&url).query(&query))?;
        let payload: Value = resp.json().map_err(|e| {
            CollectError::ResponseFormat(format!("failed to parse World Bank {indicator_id}: {e}"))
        })?;

        parse_payload(indicator_id, payload)
    }
}

fn parse_payload(indicator_id: &str, payload: Value) -> Result<Vec<PanelObservation>, CollectError> {
    let parts = payload.as_array().ok_or_else(|| {
        CollectError::ResponseFormat(format!("{indicator_id}: expected a JSON array"))
    })?;

    if let Some(messages) = parts.first().and_then(|header| header.get("message")) {
        let messages: Vec<ErrorMessage> =
            serde_json::from_value(messages.clone()).unwrap_or_default();
        let text: Vec<String> = messages
            .iter()
            .map(|m| format!("{}: {}", m.key, m.value))
            .collect();
        return Err(CollectError::Provider {
            provider: DataSource::WorldBank,
            message: format!("{indicator_id}: {}", text.join("; ")),
        });
    }

    let rows: Vec<Row> = match parts.get(1) {
        None | Some(Value::Null) => Vec::new(),
        Some(page) => serde_json::from_value(page.clone()).map_err(|e| {
            CollectError::ResponseFormat(format!("{indicator_id}: bad data page: {e}"))
        })?,
    };

    Ok(rows
        .into_iter()
        .map(|r| PanelObservation {
            country: r.country.value,
            date: r.date,
            value: r.value,
        })
        .collect())
}

/// Reshape per-indicator observations into the country/date panel.
///
/// The panel index is reset into plain `country` and `date` columns, followed
/// by one column per indicator name. Rows are sorted by country, then date.
pub fn panel_frame(
    indicators: Vec<(String, Vec<PanelObservation>)>,
) -> Result<DataFrame, CollectError> {
    let labeled = indicators
        .into_iter()
        .map(|(name, observations)| {
            let points: BTreeMap<(String, String), Option<f64>> = observations
                .into_iter()
                .map(|o| ((o.country, o.date), o.value))
                .collect();
            LabeledSeries::new(name, points)
        })
        .collect();

    let aligned = align_series(labeled);
    if let Some(label) = aligned.duplicate_label() {
        return Err(CollectError::InvalidRequest(format!(
            "indicator name '{label}' is used more than once"
        )));
    }
    let (countries, dates): (Vec<String>, Vec<String>) = aligned.keys.into_iter().unzip();

    let mut columns = Vec::with_capacity(aligned.columns.len() + 2);
    columns.push(Column::new(COUNTRY_COLUMN.into(), countries));
    columns.push(Column::new(YEAR_COLUMN.into(), dates));
    for (label, values) in aligned.columns {
        columns.push(Column::new(label.into(), values));
    }

    DataFrame::new(columns)
        .map_err(|e| CollectError::Parquet(format!("dataframe creation: {e}")))
}
