//! Kenneth French data library provider.
//!
//! Each dataset is a zip archive holding one CSV-like text file. The file is
//! a sequence of blank-line separated blocks: free-text description blocks,
//! and tables whose header line starts with a comma. Tables are keyed by
//! `YYYY` (annual), `YYYYMM` (monthly) or `YYYYMMDD` (daily) and hold
//! returns in percent.

use super::frame::{date_column, DATE_COLUMN};
use super::provider::{http_client, join_url, send, CollectError, DataSource};
use chrono::{Datelike, NaiveDate};
use polars::prelude::{Column, DataFrame, NamedFrom};
use std::io::{Cursor, Read};
use tracing::debug;

/// Public data library root.
pub const DEFAULT_BASE_URL: &str = "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp";

/// The three-factor monthly dataset.
pub const DEFAULT_DATASET: &str = "F-F_Research_Data_Factors";

/// Period granularity of a table, inferred from its date keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Annual,
    Monthly,
    Daily,
}

impl Frequency {
    fn from_key(key: &str) -> Option<Self> {
        if !key.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match key.len() {
            4 => Some(Frequency::Annual),
            6 => Some(Frequency::Monthly),
            8 => Some(Frequency::Daily),
            _ => None,
        }
    }

    /// The first calendar day of the period a key names.
    fn period_start(self, key: &str) -> Option<NaiveDate> {
        let year: i32 = key.get(0..4)?.parse().ok()?;
        match self {
            Frequency::Annual => NaiveDate::from_ymd_opt(year, 1, 1),
            Frequency::Monthly => NaiveDate::from_ymd_opt(year, key.get(4..6)?.parse().ok()?, 1),
            Frequency::Daily => NaiveDate::from_ymd_opt(
                year,
                key.get(4..6)?.parse().ok()?,
                key.get(6..8)?.parse().ok()?,
            ),
        }
    }

    /// Truncate a date to the start of its period.
    fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Annual => date.with_ordinal(1).unwrap_or(date),
            Frequency::Monthly => date.with_day(1).unwrap_or(date),
            Frequency::Daily => date,
        }
    }
}

/// One table row: period start date and factor values in percent.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorRow {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// One table of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorTable {
    /// Text above the header line, e.g. "Annual Factors: January-December".
    pub title: String,
    pub frequency: Frequency,
    pub columns: Vec<String>,
    pub rows: Vec<FactorRow>,
}

impl FactorTable {
    /// Keep rows whose period overlaps `[start, end]`.
    pub fn truncate(&self, start: NaiveDate, end: NaiveDate) -> FactorTable {
        let first = self.frequency.truncate(start);
        FactorTable {
            title: self.title.clone(),
            frequency: self.frequency,
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| r.date >= first && r.date <= end)
                .cloned()
                .collect(),
        }
    }

    /// Convert to a `date` + factor-columns frame, dividing every value by `divisor`.
    pub fn to_frame(&self, divisor: f64) -> Result<DataFrame, CollectError> {
        let dates: Vec<NaiveDate> = self.rows.iter().map(|r| r.date).collect();
        let mut columns = Vec::with_capacity(self.columns.len() + 1);
        columns.push(date_column(DATE_COLUMN, &dates)?);

        for (i, name) in self.columns.iter().enumerate() {
            let values: Vec<Option<f64>> = self
                .rows
                .iter()
                .map(|r| r.values.get(i).copied().flatten().map(|v| v / divisor))
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }

        DataFrame::new(columns)
            .map_err(|e| CollectError::Parquet(format!("dataframe creation: {e}")))
    }
}

/// A parsed dataset: description text and all of its tables.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorDataset {
    pub description: String,
    pub tables: Vec<FactorTable>,
}

/// Kenneth French data library client.
pub struct FamaFrenchClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl FamaFrenchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CollectError> {
        Ok(Self {
            client: http_client(DataSource::FamaFrench)?,
            base_url: base_url.into(),
        })
    }

    /// Download and parse a dataset by name.
    pub fn fetch_dataset(&self, dataset: &str) -> Result<FactorDataset, CollectError> {
        let url = join_url(&self.base_url, &format!("{dataset}_CSV.zip"));
        debug!(dataset, "requesting archive");

        let resp = send(DataSource::FamaFrench, self.client.get(&url))?;
        let bytes = resp.bytes().map_err(|e| CollectError::Network {
            provider: DataSource::FamaFrench,
            message: format!("reading archive body: {e}"),
        })?;

        let text = read_archive(&bytes)?;
        parse_dataset(&text)
    }
}

/// Extract the first member of a dataset archive as text.
pub fn read_archive(bytes: &[u8]) -> Result<String, CollectError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CollectError::Archive(format!("open archive: {e}")))?;
    if archive.len() == 0 {
        return Err(CollectError::Archive("archive has no members".into()));
    }

    let mut member = archive
        .by_index(0)
        .map_err(|e| CollectError::Archive(format!("read member: {e}")))?;
    let mut raw = Vec::new();
    member.read_to_end(&mut raw)?;

    // Older files carry Latin-1 copyright signs.
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Parse the text of a dataset file.
pub fn parse_dataset(text: &str) -> Result<FactorDataset, CollectError> {
    let mut description = Vec::new();
    let mut tables = Vec::new();

    for block in blocks(text) {
        match block.iter().position(|l| l.trim_start().starts_with(',')) {
            Some(header_at) => {
                let title = block[..header_at]
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" ");
                tables.push(parse_table(title, &block[header_at..])?);
            }
            None => description.push(
                block
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        }
    }

    if tables.is_empty() {
        return Err(CollectError::ResponseFormat(
            "dataset file contains no tables".into(),
        ));
    }

    Ok(FactorDataset {
        description: description.join("\n"),
        tables,
    })
}

/// Split text into runs of non-blank lines.
fn blocks(text: &str) -> Vec<Vec<&str>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end_matches('\r'));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Parse a header line and the data rows below it.
fn parse_table(title: String, lines: &[&str]) -> Result<FactorTable, CollectError> {
    let joined = lines.join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(joined.as_bytes());

    let mut records = reader.records();
    let header = records
        .next()
        .ok_or_else(|| CollectError::ResponseFormat("table without header".into()))?
        .map_err(|e| CollectError::ResponseFormat(format!("table header: {e}")))?;
    let columns: Vec<String> = header.iter().skip(1).map(str::to_string).collect();

    let mut frequency = None;
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| CollectError::ResponseFormat(format!("table row: {e}")))?;
        let Some(key) = record.get(0) else { continue };

        // Footer lines inside a table block end the table.
        let Some(row_freq) = Frequency::from_key(key) else {
            break;
        };
        let freq = *frequency.get_or_insert(row_freq);
        if freq != row_freq {
            return Err(CollectError::ResponseFormat(format!(
                "mixed date keys in table '{title}': {key}"
            )));
        }

        let date = freq
            .period_start(key)
            .ok_or_else(|| CollectError::ResponseFormat(format!("bad date key '{key}'")))?;
        let values = record
            .iter()
            .skip(1)
            .map(|v| {
                if v.is_empty() {
                    Ok(None)
                } else {
                    v.parse::<f64>().map(Some).map_err(|e| {
                        CollectError::ResponseFormat(format!("bad value '{v}' at {key}: {e}"))
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        rows.push(FactorRow { date, values });
    }

    let frequency = frequency.ok_or_else(|| {
        CollectError::ResponseFormat(format!("table '{title}' has no rows"))
    })?;

    Ok(FactorTable {
        title,
        frequency,
        columns,
        rows,
    })
}
