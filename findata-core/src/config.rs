//! Collector configuration: the shared date range and output directory,
//! provider endpoints, and the TOML description of a full collection run.

use crate::data::world_bank::WorldBankIndicator;
use crate::data::yahoo::Interval;
use crate::data::{fama_french, fred, world_bank, yahoo};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding the FRED API key.
pub const FRED_API_KEY_VAR: &str = "FRED_API_KEY";

pub const DEFAULT_START_DATE: &str = "2010-01-01";
pub const DEFAULT_DATA_DIR: &str = "data/raw";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("read config file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("parse config: {0}")]
    Parse(String),
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2010, 1, 1).expect("constant date is valid")
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Treat blank keys as absent.
fn non_empty(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

/// Read the FRED API key from the environment.
pub fn fred_api_key_from_env() -> Option<String> {
    non_empty(std::env::var(FRED_API_KEY_VAR).ok())
}

/// Base URLs for each provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub yahoo: String,
    pub fred: String,
    pub world_bank: String,
    pub fama_french: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            yahoo: yahoo::DEFAULT_BASE_URL.to_string(),
            fred: fred::DEFAULT_BASE_URL.to_string(),
            world_bank: world_bank::DEFAULT_BASE_URL.to_string(),
            fama_french: fama_french::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point every provider at one host (a local mock server, for instance).
    pub fn all(base_url: &str) -> Self {
        Self {
            yahoo: base_url.to_string(),
            fred: base_url.to_string(),
            world_bank: base_url.to_string(),
            fama_french: base_url.to_string(),
        }
    }
}

/// Shared settings for every collector operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// First date of the requested range.
    pub start_date: NaiveDate,
    /// Last date of the requested range.
    pub end_date: NaiveDate,
    /// Directory the Parquet files are written to.
    pub data_dir: PathBuf,
    pub fred_api_key: Option<String>,
    pub endpoints: Endpoints,
}

impl CollectorConfig {
    /// Build a config; a missing end date means today. The FRED key is read
    /// from the environment.
    pub fn new(
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let end_date = end_date.unwrap_or_else(today);
        if start_date > end_date {
            return Err(ConfigError::InvalidDateRange {
                start: start_date,
                end: end_date,
            });
        }

        Ok(Self {
            start_date,
            end_date,
            data_dir: data_dir.into(),
            fred_api_key: fred_api_key_from_env(),
            endpoints: Endpoints::default(),
        })
    }

    /// Build a config from `YYYY-MM-DD` strings.
    pub fn from_strs(
        start_date: &str,
        end_date: Option<&str>,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let start = parse_date(start_date)?;
        let end = end_date.map(parse_date).transpose()?;
        Self::new(start, end, data_dir)
    }

    pub fn with_fred_api_key(mut self, key: Option<String>) -> Self {
        self.fred_api_key = non_empty(key);
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            end_date: today(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            fred_api_key: fred_api_key_from_env(),
            endpoints: Endpoints::default(),
        }
    }
}

// ── Run description (TOML) ──────────────────────────────────────────

/// `[collector]` section: range, output directory and endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorSection {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub endpoints: Endpoints,
}

/// `[stocks]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StocksRequest {
    pub tickers: Vec<String>,
    pub interval: Interval,
    pub include_dividends: bool,
}

impl Default for StocksRequest {
    fn default() -> Self {
        Self {
            tickers: ["SPY", "AGG", "VEA", "VWO", "GLD", "VNQ"]
                .map(String::from)
                .to_vec(),
            interval: Interval::Day,
            include_dividends: true,
        }
    }
}

/// `[economic]` section: FRED series ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EconomicRequest {
    pub indicators: Vec<String>,
}

impl Default for EconomicRequest {
    fn default() -> Self {
        Self {
            indicators: ["GDP", "UNRATE", "CPIAUCSL", "FEDFUNDS", "T10Y2Y"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// `[world_bank]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldBankRequest {
    pub countries: Vec<String>,
    /// Indicator ids with their output column names, in column order.
    pub indicators: Vec<WorldBankIndicator>,
}

impl Default for WorldBankRequest {
    fn default() -> Self {
        Self {
            countries: ["USA", "CHN", "EUU", "JPN", "GBR"]
                .map(String::from)
                .to_vec(),
            indicators: vec![
                WorldBankIndicator::new("NY.GDP.MKTP.KD.ZG", "GDP Growth"),
                WorldBankIndicator::new("FP.CPI.TOTL.ZG", "Inflation"),
                WorldBankIndicator::new("NE.TRD.GNFS.ZS", "Trade % GDP"),
            ],
        }
    }
}

/// `[factors]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactorsRequest {
    pub dataset: String,
}

impl Default for FactorsRequest {
    fn default() -> Self {
        Self {
            dataset: fama_french::DEFAULT_DATASET.to_string(),
        }
    }
}

/// Everything a full collection run needs. Every section is optional and
/// falls back to the default research universe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectRequest {
    pub collector: CollectorSection,
    pub stocks: StocksRequest,
    pub economic: EconomicRequest,
    pub world_bank: WorldBankRequest,
    pub factors: FactorsRequest,
}

impl CollectRequest {
    /// Load a run description from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse a run description from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the collector config described by the `[collector]` section.
    pub fn collector_config(&self) -> Result<CollectorConfig, ConfigError> {
        let section = &self.collector;
        let start = section.start_date.as_deref().unwrap_or(DEFAULT_START_DATE);
        let data_dir = section
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(
            CollectorConfig::from_strs(start, section.end_date.as_deref(), data_dir)?
                .with_endpoints(section.endpoints.clone()),
        )
    }
}
