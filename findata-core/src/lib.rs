//! findata core — provider clients, reshaping and Parquet persistence.
//!
//! This crate fetches historical series from four providers and stores each
//! result as a Parquet file:
//! - Yahoo Finance equity prices (`stock_prices.parquet`)
//! - FRED economic indicators (`economic_indicators.parquet`)
//! - World Bank development indicators (`world_bank_data.parquet`)
//! - Fama-French factor returns (`fama_french_factors.parquet`)
//!
//! [`DataCollector`] is the entry point: each of its operations requests one
//! dataset, reshapes it into a table, writes it out and returns it.

pub mod collector;
pub mod config;
pub mod data;

pub use collector::{CollectedData, DataCollector};
pub use config::{CollectRequest, CollectorConfig, ConfigError, Endpoints};
pub use data::{
    CollectError, DataSource, Dataset, DatasetMeta, Interval, ParquetStore, WorldBankIndicator,
};
