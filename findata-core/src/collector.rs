//! The data collector: one operation per provider, each running
//! request → reshape → persist → return.
//!
//! Errors are logged where they happen and returned unchanged, so a caller
//! sees exactly what the provider layer produced.

use crate::config::{CollectRequest, CollectorConfig};
use crate::data::fama_french::{FamaFrenchClient, DEFAULT_DATASET};
use crate::data::fred::{indicators_frame, normalize_series_ids, FredClient};
use crate::data::store::{Dataset, ParquetStore};
use crate::data::world_bank::{
    normalize_indicators, panel_frame, WorldBankClient, WorldBankIndicator,
};
use crate::data::yahoo::{normalize_tickers, price_frame, Interval, YahooClient};
use crate::data::CollectError;
use chrono::Datelike;
use polars::prelude::DataFrame;
use tracing::{error, info, warn};

/// Percent-to-decimal divisor for factor returns.
const PERCENT: f64 = 100.0;

/// Every dataset produced by [`DataCollector::all_data`].
#[derive(Debug, Clone)]
pub struct CollectedData {
    pub stocks: DataFrame,
    pub economic: DataFrame,
    pub world_bank: DataFrame,
    pub factors: DataFrame,
}

impl CollectedData {
    /// Datasets by name, in collection order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DataFrame)> {
        [
            ("stocks", &self.stocks),
            ("economic", &self.economic),
            ("world_bank", &self.world_bank),
            ("factors", &self.factors),
        ]
        .into_iter()
    }
}

/// Collects financial and macroeconomic series and stores them as Parquet.
pub struct DataCollector {
    config: CollectorConfig,
    store: ParquetStore,
    yahoo: YahooClient,
    fred: FredClient,
    world_bank: WorldBankClient,
    fama_french: FamaFrenchClient,
}

impl DataCollector {
    /// Create a collector and its output directory.
    pub fn new(config: CollectorConfig) -> Result<Self, CollectError> {
        let store = ParquetStore::new(&config.data_dir);
        store.ensure_dir()?;

        let endpoints = &config.endpoints;
        let collector = Self {
            yahoo: YahooClient::new(&endpoints.yahoo)?,
            fred: FredClient::new(&endpoints.fred, config.fred_api_key.clone())?,
            world_bank: WorldBankClient::new(&endpoints.world_bank)?,
            fama_french: FamaFrenchClient::new(&endpoints.fama_french)?,
            store,
            config,
        };

        info!(
            start = %collector.config.start_date,
            end = %collector.config.end_date,
            data_dir = %collector.config.data_dir.display(),
            "initialized data collector"
        );
        Ok(collector)
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn store(&self) -> &ParquetStore {
        &self.store
    }

    fn persist(&self, dataset: Dataset, df: &DataFrame) -> Result<(), CollectError> {
        let path = self.store.write(dataset, df)?;
        info!(path = %path.display(), rows = df.height(), "saved {}", dataset.file_stem());
        Ok(())
    }

    /// Fetch prices for `tickers` from Yahoo Finance.
    ///
    /// Prices are split/dividend adjusted. With `include_dividends`, the
    /// `dividends` and `stock_splits` action columns are added per ticker.
    pub fn stock_data(
        &self,
        tickers: &[&str],
        interval: Interval,
        include_dividends: bool,
    ) -> Result<DataFrame, CollectError> {
        info!(tickers = tickers.len(), %interval, "fetching stock data");
        self.fetch_stock_data(tickers, interval, include_dividends)
            .inspect_err(|e| error!(error = %e, "error fetching stock data"))
    }

    fn fetch_stock_data(
        &self,
        tickers: &[&str],
        interval: Interval,
        include_dividends: bool,
    ) -> Result<DataFrame, CollectError> {
        let tickers = normalize_tickers(tickers);
        if tickers.is_empty() {
            return Err(CollectError::InvalidRequest("no tickers given".into()));
        }

        let mut histories = Vec::with_capacity(tickers.len());
        let mut last_error = None;
        for ticker in tickers {
            let history = match self.yahoo.fetch_history(
                &ticker,
                self.config.start_date,
                self.config.end_date,
                interval,
                include_dividends,
            ) {
                Ok(history) => Some(history),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "failed to download ticker");
                    last_error = Some(e);
                    None
                }
            };
            histories.push((ticker, history));
        }

        if histories.iter().all(|(_, h)| h.is_none()) {
            return Err(last_error
                .unwrap_or_else(|| CollectError::InvalidRequest("no tickers given".into())));
        }

        let df = price_frame(&histories, include_dividends)?;
        self.persist(Dataset::StockPrices, &df)?;
        Ok(df)
    }

    /// Fetch FRED series, one column per id.
    pub fn economic_indicators(&self, indicator_ids: &[&str]) -> Result<DataFrame, CollectError> {
        if !self.fred.has_api_key() {
            warn!("FRED API key not set. Using limited access.");
        }
        info!(indicators = indicator_ids.len(), "fetching economic indicators from FRED");
        self.fetch_economic_indicators(indicator_ids)
            .inspect_err(|e| error!(error = %e, "error fetching economic indicators"))
    }

    fn fetch_economic_indicators(&self, indicator_ids: &[&str]) -> Result<DataFrame, CollectError> {
        let ids = normalize_series_ids(indicator_ids);
        if ids.is_empty() {
            return Err(CollectError::InvalidRequest("no indicators given".into()));
        }

        let mut series = Vec::with_capacity(ids.len());
        for id in ids {
            info!(indicator = %id, "fetching indicator");
            let points = self
                .fred
                .fetch_series(&id, self.config.start_date, self.config.end_date)?;
            series.push((id, points));
        }

        let df = indicators_frame(series)?;
        self.persist(Dataset::EconomicIndicators, &df)?;
        Ok(df)
    }

    /// Fetch World Bank indicators for `countries` as a country/date panel.
    pub fn world_bank_data(
        &self,
        indicators: &[WorldBankIndicator],
        countries: &[&str],
    ) -> Result<DataFrame, CollectError> {
        info!(countries = countries.len(), "fetching World Bank data");
        self.fetch_world_bank_data(indicators, countries)
            .inspect_err(|e| error!(error = %e, "error fetching World Bank data"))
    }

    fn fetch_world_bank_data(
        &self,
        indicators: &[WorldBankIndicator],
        countries: &[&str],
    ) -> Result<DataFrame, CollectError> {
        let indicators = normalize_indicators(indicators)?;
        if indicators.is_empty() || countries.is_empty() {
            return Err(CollectError::InvalidRequest(
                "World Bank data needs at least one indicator and one country".into(),
            ));
        }

        let start_year = self.config.start_date.year();
        let end_year = self.config.end_date.year();

        let mut columns = Vec::with_capacity(indicators.len());
        for indicator in indicators {
            let observations =
                self.world_bank
                    .fetch_indicator(&indicator.id, countries, start_year, end_year)?;
            columns.push((indicator.name, observations));
        }

        let df = panel_frame(columns)?;
        self.persist(Dataset::WorldBankData, &df)?;
        Ok(df)
    }

    /// Fetch the first table of a Fama-French dataset, rescaled to decimals.
    pub fn fama_french_factors(&self, dataset: &str) -> Result<DataFrame, CollectError> {
        info!(dataset, "fetching Fama-French factors");
        self.fetch_fama_french_factors(dataset)
            .inspect_err(|e| error!(error = %e, "error fetching Fama-French data"))
    }

    fn fetch_fama_french_factors(&self, dataset: &str) -> Result<DataFrame, CollectError> {
        let parsed = self.fama_french.fetch_dataset(dataset)?;
        let table = parsed.tables.first().ok_or_else(|| {
            CollectError::ResponseFormat(format!("dataset {dataset} has no tables"))
        })?;

        let df = table
            .truncate(self.config.start_date, self.config.end_date)
            .to_frame(PERCENT)?;
        self.persist(Dataset::FamaFrenchFactors, &df)?;
        Ok(df)
    }

    /// Fetch every dataset in `request`: stocks, economic indicators,
    /// World Bank data, then factors. Stops at the first failure.
    pub fn all_data(&self, request: &CollectRequest) -> Result<CollectedData, CollectError> {
        info!("fetching all data sources");
        self.fetch_all_data(request)
            .inspect(|_| info!("successfully fetched all data"))
            .inspect_err(|e| error!(error = %e, "error fetching all data"))
    }

    fn fetch_all_data(&self, request: &CollectRequest) -> Result<CollectedData, CollectError> {
        let tickers: Vec<&str> = request.stocks.tickers.iter().map(String::as_str).collect();
        let indicators: Vec<&str> = request
            .economic
            .indicators
            .iter()
            .map(String::as_str)
            .collect();
        let countries: Vec<&str> = request
            .world_bank
            .countries
            .iter()
            .map(String::as_str)
            .collect();
        let dataset = if request.factors.dataset.trim().is_empty() {
            DEFAULT_DATASET
        } else {
            request.factors.dataset.as_str()
        };

        Ok(CollectedData {
            stocks: self.stock_data(
                &tickers,
                request.stocks.interval,
                request.stocks.include_dividends,
            )?,
            economic: self.economic_indicators(&indicators)?,
            world_bank: self.world_bank_data(&request.world_bank.indicators, &countries)?,
            factors: self.fama_french_factors(dataset)?,
        })
    }
}
