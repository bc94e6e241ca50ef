//! Parquet store for collected datasets.
//!
//! Layout: `{data_dir}/{dataset}.parquet` plus a `{dataset}.meta.json` sidecar.
//!
//! Writes are atomic (write to .tmp, rename into place) and always replace
//! the previous file. There is no incremental update or deduplication.

use super::frame::date_bounds;
use super::provider::{CollectError, DataSource};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// The datasets the collector persists, one file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    StockPrices,
    EconomicIndicators,
    WorldBankData,
    FamaFrenchFactors,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::StockPrices,
        Dataset::EconomicIndicators,
        Dataset::WorldBankData,
        Dataset::FamaFrenchFactors,
    ];

    /// File name without extension.
    pub fn file_stem(self) -> &'static str {
        match self {
            Dataset::StockPrices => "stock_prices",
            Dataset::EconomicIndicators => "economic_indicators",
            Dataset::WorldBankData => "world_bank_data",
            Dataset::FamaFrenchFactors => "fama_french_factors",
        }
    }

    /// Provider this dataset is fetched from.
    pub fn source(self) -> DataSource {
        match self {
            Dataset::StockPrices => DataSource::YahooFinance,
            Dataset::EconomicIndicators => DataSource::Fred,
            Dataset::WorldBankData => DataSource::WorldBank,
            Dataset::FamaFrenchFactors => DataSource::FamaFrench,
        }
    }
}

/// Metadata sidecar for a stored dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub dataset: Dataset,
    pub source: DataSource,
    pub rows: usize,
    pub columns: Vec<String>,
    /// Date span of the `date` column, when the table has one.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// BLAKE3 hash of the Parquet file bytes.
    pub file_hash: String,
    pub written_at: chrono::NaiveDateTime,
}

/// Store status for a single dataset.
#[derive(Debug, Clone)]
pub struct DatasetStatus {
    pub dataset: Dataset,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
    pub meta: Option<DatasetMeta>,
}

impl DatasetStatus {
    pub fn exists(&self) -> bool {
        self.size_bytes.is_some()
    }
}

/// The Parquet store.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    data_dir: PathBuf,
}

impl ParquetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of the store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Create the root directory if it is missing.
    pub fn ensure_dir(&self) -> Result<(), CollectError> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Path to a dataset's Parquet file.
    pub fn path(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(format!("{}.parquet", dataset.file_stem()))
    }

    fn meta_path(&self, dataset: Dataset) -> PathBuf {
        self.data_dir
            .join(format!("{}.meta.json", dataset.file_stem()))
    }

    /// Write a dataset, replacing any previous version. Returns the file path.
    pub fn write(&self, dataset: Dataset, df: &DataFrame) -> Result<PathBuf, CollectError> {
        self.ensure_dir()?;

        let path = self.path(dataset);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(df, &tmp_path)?;

        // Atomic rename
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CollectError::Io(e));
        }

        let (start_date, end_date) = match date_bounds(df) {
            Some((lo, hi)) => (Some(lo), Some(hi)),
            None => (None, None),
        };
        let meta = DatasetMeta {
            dataset,
            source: dataset.source(),
            rows: df.height(),
            columns: df
                .get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
            start_date,
            end_date,
            file_hash: blake3::hash(&fs::read(&path)?).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| CollectError::Parquet(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(dataset), meta_json)?;

        Ok(path)
    }

    /// Load a stored dataset.
    pub fn read(&self, dataset: Dataset) -> Result<DataFrame, CollectError> {
        let file = fs::File::open(self.path(dataset))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| CollectError::Parquet(format!("read: {e}")))
    }

    /// Metadata sidecar for a dataset, if present and readable.
    pub fn meta(&self, dataset: Dataset) -> Option<DatasetMeta> {
        let content = fs::read_to_string(self.meta_path(dataset)).ok()?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(dataset = dataset.file_stem(), error = %e, "unreadable metadata sidecar");
                None
            }
        }
    }

    /// Status of every dataset.
    pub fn status(&self) -> Vec<DatasetStatus> {
        Dataset::ALL
            .iter()
            .map(|&dataset| {
                let path = self.path(dataset);
                DatasetStatus {
                    dataset,
                    size_bytes: fs::metadata(&path).ok().map(|m| m.len()),
                    meta: self.meta(dataset),
                    path,
                }
            })
            .collect()
    }
}

/// Write a DataFrame to a Parquet file.
fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), CollectError> {
    let file = fs::File::create(path)?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| CollectError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
